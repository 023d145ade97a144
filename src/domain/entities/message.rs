use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ChatId, FileId};

/// Unique identifier for a message within its chat.
///
/// Ids grow monotonically, so ordering by id is ordering by send time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub i64);

impl MessageId {
    /// Returns the underlying i64 value.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MessageId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Composite key addressing a message across chats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageKey {
    /// Owning chat.
    pub chat_id: ChatId,
    /// Message within the chat.
    pub message_id: MessageId,
}

impl MessageKey {
    /// Creates a key from its parts.
    #[must_use]
    pub fn new(chat_id: impl Into<ChatId>, message_id: impl Into<MessageId>) -> Self {
        Self {
            chat_id: chat_id.into(),
            message_id: message_id.into(),
        }
    }
}

impl std::fmt::Display for MessageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.chat_id, self.message_id)
    }
}

bitflags! {
    /// Per-message capability flags reported by the engine.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct MessageCapabilities: u8 {
        /// Message may be forwarded.
        const CAN_BE_FORWARDED = 1;
        /// Message may be deleted for the current user only.
        const CAN_BE_DELETED_ONLY_FOR_SELF = 1 << 1;
        /// Message may be deleted for every participant.
        const CAN_BE_DELETED_FOR_ALL_USERS = 1 << 2;
        /// Message text or caption may be edited.
        const CAN_BE_EDITED = 1 << 3;
    }
}

impl MessageCapabilities {
    /// Returns true if either delete flavour is allowed.
    #[must_use]
    pub const fn can_be_deleted(self) -> bool {
        self.intersects(
            Self::CAN_BE_DELETED_ONLY_FOR_SELF.union(Self::CAN_BE_DELETED_FOR_ALL_USERS),
        )
    }
}

/// Server-side search filter over message content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchFilter {
    /// Matches every message.
    #[default]
    Empty,
    /// Photos and videos, the media viewer's history.
    PhotoAndVideo,
    /// Animations (GIFs).
    Animation,
    /// Music files.
    Audio,
    /// Generic documents.
    Document,
}

/// Content of a message, closed over the kinds the client understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum MessageContent {
    Text { text: String },
    Photo { file_id: FileId, caption: String },
    Video { file_id: FileId, thumbnail: Option<FileId>, caption: String },
    Animation { file_id: FileId, thumbnail: Option<FileId>, caption: String },
    Audio { file_id: FileId, title: String },
    VoiceNote { file_id: FileId },
    VideoNote { file_id: FileId, thumbnail: Option<FileId> },
    Sticker { file_id: FileId, animated: bool },
    Document { file_id: FileId, file_name: String },
    Unsupported,
}

impl MessageContent {
    /// Returns true if a message with this content belongs to `filter`.
    #[must_use]
    pub const fn matches(&self, filter: SearchFilter) -> bool {
        match filter {
            SearchFilter::Empty => true,
            SearchFilter::PhotoAndVideo => matches!(self, Self::Photo { .. } | Self::Video { .. }),
            SearchFilter::Animation => matches!(self, Self::Animation { .. }),
            SearchFilter::Audio => matches!(self, Self::Audio { .. }),
            SearchFilter::Document => matches!(self, Self::Document { .. }),
        }
    }

    /// Returns true if the content is something the media viewer opens.
    #[must_use]
    pub const fn is_viewer_media(&self) -> bool {
        self.matches(SearchFilter::PhotoAndVideo)
    }

    /// Returns true if the content is rendered by a play/pause capable element.
    #[must_use]
    pub const fn is_playable(&self) -> bool {
        match self {
            Self::Video { .. }
            | Self::Animation { .. }
            | Self::Audio { .. }
            | Self::VoiceNote { .. }
            | Self::VideoNote { .. } => true,
            Self::Sticker { animated, .. } => *animated,
            Self::Text { .. } | Self::Photo { .. } | Self::Document { .. } | Self::Unsupported => {
                false
            }
        }
    }

    /// Searchable text of the content: message text, caption, title or file name.
    #[must_use]
    pub fn searchable_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Photo { caption, .. }
            | Self::Video { caption, .. }
            | Self::Animation { caption, .. } => Some(caption),
            Self::Audio { title, .. } => Some(title),
            Self::Document { file_name, .. } => Some(file_name),
            Self::VoiceNote { .. }
            | Self::VideoNote { .. }
            | Self::Sticker { .. }
            | Self::Unsupported => None,
        }
    }

    /// Primary file first, then thumbnails.
    #[must_use]
    pub fn file_ids(&self) -> Vec<FileId> {
        match self {
            Self::Photo { file_id, .. }
            | Self::Audio { file_id, .. }
            | Self::VoiceNote { file_id }
            | Self::Sticker { file_id, .. }
            | Self::Document { file_id, .. } => vec![*file_id],
            Self::Video {
                file_id, thumbnail, ..
            }
            | Self::Animation {
                file_id, thumbnail, ..
            }
            | Self::VideoNote { file_id, thumbnail } => {
                std::iter::once(*file_id).chain(*thumbnail).collect()
            }
            Self::Text { .. } | Self::Unsupported => Vec::new(),
        }
    }
}

/// Message entity as held by the client stores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct Message {
    id: MessageId,
    chat_id: ChatId,
    date: DateTime<Utc>,
    content: MessageContent,
    #[serde(default)]
    capabilities: MessageCapabilities,
}

#[allow(missing_docs)]
impl Message {
    #[must_use]
    pub fn new(
        id: impl Into<MessageId>,
        chat_id: impl Into<ChatId>,
        date: DateTime<Utc>,
        content: MessageContent,
    ) -> Self {
        Self {
            id: id.into(),
            chat_id: chat_id.into(),
            date,
            content,
            capabilities: MessageCapabilities::empty(),
        }
    }

    #[must_use]
    pub const fn with_capabilities(mut self, capabilities: MessageCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    #[must_use]
    pub const fn id(&self) -> MessageId {
        self.id
    }

    #[must_use]
    pub const fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    #[must_use]
    pub const fn key(&self) -> MessageKey {
        MessageKey {
            chat_id: self.chat_id,
            message_id: self.id,
        }
    }

    #[must_use]
    pub const fn date(&self) -> DateTime<Utc> {
        self.date
    }

    #[must_use]
    pub const fn content(&self) -> &MessageContent {
        &self.content
    }

    pub fn set_content(&mut self, content: MessageContent) {
        self.content = content;
    }

    #[must_use]
    pub const fn capabilities(&self) -> MessageCapabilities {
        self.capabilities
    }

    #[must_use]
    pub const fn can_be_forwarded(&self) -> bool {
        self.capabilities.contains(MessageCapabilities::CAN_BE_FORWARDED)
    }

    #[must_use]
    pub const fn can_be_deleted(&self) -> bool {
        self.capabilities.can_be_deleted()
    }
}
