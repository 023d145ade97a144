//! Messaging engine adapters.

mod in_memory;

pub use in_memory::{Fixture, FixtureError, FixtureFile, InMemoryEngine};
