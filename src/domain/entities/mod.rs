//! Domain entity definitions.

mod chat;
mod file;
mod message;
mod viewport;

pub use chat::{Chat, ChatId};
pub use file::{Blob, FileDescriptor, FileId, LocalFileState, RemoteFileState, SavedAnimation};
pub use message::{
    Message, MessageCapabilities, MessageContent, MessageId, MessageKey, SearchFilter,
};
pub use viewport::{Span, Viewport, ViewportKey, VisibilitySet};
