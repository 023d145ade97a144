//! Domain layer with core entities, errors and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;
/// Typed change notifications.
pub mod signal;

pub use entities::{ChatId, FileId, Message, MessageId, MessageKey};
pub use errors::EngineError;
pub use ports::{BoundsProvider, EngineEvent, EnginePort, MediaElement};
