//! Infrastructure layer with adapters for configuration, the engine and timers.

/// Application configuration.
pub mod config;
/// Messaging engine adapters.
pub mod engine;
pub mod visibility_driver;

pub use config::{AppConfig, CliArgs, ConfigError, LogLevel, StorageManager, Walk};
pub use engine::{Fixture, FixtureError, InMemoryEngine};
pub use visibility_driver::{DriverHandle, DriverInput, VisibilityDriver};
