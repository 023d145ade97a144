//! Application layer: the media pipeline services and the session that owns them.

/// Stateful services.
pub mod services;
/// Session-scoped wiring.
pub mod session;

pub use session::{SessionConfig, SessionContext};
