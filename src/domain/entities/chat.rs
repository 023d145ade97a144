use serde::{Deserialize, Serialize};

/// Unique identifier for a chat, as assigned by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChatId(pub i64);

impl ChatId {
    /// Returns the underlying i64 value.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ChatId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Chat metadata needed by the media core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct Chat {
    id: ChatId,
    title: String,
    #[serde(default)]
    can_be_reported: bool,
}

#[allow(missing_docs)]
impl Chat {
    #[must_use]
    pub fn new(id: impl Into<ChatId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            can_be_reported: false,
        }
    }

    #[must_use]
    pub const fn with_can_be_reported(mut self, can_be_reported: bool) -> Self {
        self.can_be_reported = can_be_reported;
        self
    }

    #[must_use]
    pub const fn id(&self) -> ChatId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub const fn can_be_reported(&self) -> bool {
        self.can_be_reported
    }
}
