//! Messaging engine port: request/response calls and pushed update events.

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::entities::{
    Chat, ChatId, FileDescriptor, FileId, Message, MessageContent, MessageId, SavedAnimation,
    SearchFilter,
};
use crate::domain::errors::EngineError;

/// Request for one page of a chat's messages.
///
/// Results come back newest first. With `from_message_id == 0` the page
/// starts at the newest match; otherwise it starts at the first match
/// strictly older than `from_message_id`, shifted by `offset`. A negative
/// offset reaches into newer messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchChatMessages {
    pub chat_id: ChatId,
    pub query: String,
    pub from_message_id: MessageId,
    pub offset: i32,
    pub limit: u32,
    pub filter: SearchFilter,
}

impl SearchChatMessages {
    /// Creates a request for the newest page of `chat_id` under `filter`.
    #[must_use]
    pub fn new(chat_id: ChatId, filter: SearchFilter, limit: u32) -> Self {
        Self {
            chat_id,
            query: String::new(),
            from_message_id: MessageId(0),
            offset: 0,
            limit,
            filter,
        }
    }

    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    #[must_use]
    pub const fn from_message(mut self, message_id: MessageId, offset: i32) -> Self {
        self.from_message_id = message_id;
        self.offset = offset;
        self
    }

    /// Returns true if `message` satisfies the chat, filter and query.
    #[must_use]
    pub fn accepts(&self, message: &Message) -> bool {
        if message.chat_id() != self.chat_id || !message.content().matches(self.filter) {
            return false;
        }
        if self.query.is_empty() {
            return true;
        }
        let needle = self.query.to_lowercase();
        message
            .content()
            .searchable_text()
            .is_some_and(|text| text.to_lowercase().contains(&needle))
    }

    /// Applies the paging rules to an in-memory message list.
    #[must_use]
    pub fn select<'a, I>(&self, messages: I) -> FoundMessages
    where
        I: IntoIterator<Item = &'a Message>,
    {
        let mut matching: Vec<&Message> = messages.into_iter().filter(|m| self.accepts(m)).collect();
        matching.sort_by(|a, b| b.id().cmp(&a.id()));

        let base = if self.from_message_id.as_i64() == 0 {
            0
        } else {
            matching
                .iter()
                .position(|m| m.id() < self.from_message_id)
                .unwrap_or(matching.len())
        };

        let start = usize::try_from((base as i64 + i64::from(self.offset)).max(0))
            .unwrap_or(0)
            .min(matching.len());

        FoundMessages {
            total_count: u32::try_from(matching.len()).unwrap_or(u32::MAX),
            messages: matching
                .into_iter()
                .skip(start)
                .take(self.limit as usize)
                .cloned()
                .collect(),
        }
    }
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FoundMessages {
    /// Total number of matches in the chat, not just this page.
    pub total_count: u32,
    /// Page contents, newest first.
    pub messages: Vec<Message>,
}

/// Update pushed by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    NewMessage {
        message: Message,
    },
    MessageContentChanged {
        chat_id: ChatId,
        message_id: MessageId,
        new_content: MessageContent,
    },
    DeleteMessages {
        chat_id: ChatId,
        message_ids: Vec<MessageId>,
        is_permanent: bool,
    },
    FileUpdated {
        file: FileDescriptor,
    },
    ChatUpdated {
        chat: Chat,
    },
}

impl EngineEvent {
    #[must_use]
    pub const fn is_message_event(&self) -> bool {
        matches!(
            self,
            Self::NewMessage { .. } | Self::MessageContentChanged { .. } | Self::DeleteMessages { .. }
        )
    }

    #[must_use]
    pub const fn chat_id(&self) -> Option<ChatId> {
        match self {
            Self::NewMessage { message } => Some(message.chat_id()),
            Self::MessageContentChanged { chat_id, .. } | Self::DeleteMessages { chat_id, .. } => {
                Some(*chat_id)
            }
            Self::ChatUpdated { chat } => Some(chat.id()),
            Self::FileUpdated { .. } => None,
        }
    }
}

/// Asynchronous command interface of the messaging engine.
///
/// Calls never complete synchronously; rejections arrive as `EngineError`.
#[async_trait]
pub trait EnginePort: Send + Sync {
    /// Fetches one page of a chat's messages.
    async fn search_chat_messages(
        &self,
        request: SearchChatMessages,
    ) -> Result<FoundMessages, EngineError>;

    /// Counts messages of a chat matching `filter`.
    async fn get_chat_message_count(
        &self,
        chat_id: ChatId,
        filter: SearchFilter,
    ) -> Result<u32, EngineError>;

    /// Lists the user's saved animations.
    async fn get_saved_animations(&self) -> Result<Vec<SavedAnimation>, EngineError>;

    /// Starts (or joins) a download and resolves with the final file state.
    async fn download_file(&self, file_id: FileId) -> Result<FileDescriptor, EngineError>;

    /// Reads the content of a downloaded file.
    async fn read_file(&self, file_id: FileId) -> Result<Bytes, EngineError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use parking_lot::Mutex;
    use tokio::sync::Semaphore;

    /// Scriptable engine for tests.
    ///
    /// Searches whose query has a gate installed wait until the gate is
    /// opened, which keeps a request in flight for as long as a test needs.
    #[derive(Default)]
    pub struct MockEngine {
        messages: Mutex<Vec<Message>>,
        files: Mutex<HashMap<FileId, Bytes>>,
        animations: Mutex<Vec<SavedAnimation>>,
        gates: Mutex<HashMap<String, Arc<Semaphore>>>,
        page_cap: Mutex<Option<usize>>,
        search_calls: AtomicUsize,
        download_calls: AtomicUsize,
        fail_searches: AtomicBool,
        fail_downloads: AtomicBool,
    }

    impl MockEngine {
        /// Creates an engine holding `messages`.
        pub fn with_messages(messages: Vec<Message>) -> Self {
            let engine = Self::default();
            *engine.messages.lock() = messages;
            engine
        }

        pub fn push_message(&self, message: Message) {
            self.messages.lock().push(message);
        }

        pub fn remove_messages(&self, ids: &[MessageId]) {
            self.messages.lock().retain(|m| !ids.contains(&m.id()));
        }

        pub fn put_file(&self, file_id: FileId, bytes: &'static [u8]) {
            self.files.lock().insert(file_id, Bytes::from_static(bytes));
        }

        pub fn set_animations(&self, animations: Vec<SavedAnimation>) {
            *self.animations.lock() = animations;
        }

        /// Holds searches for `query` until `open` is called.
        pub fn gate(&self, query: &str) {
            self.gates
                .lock()
                .insert(query.to_string(), Arc::new(Semaphore::new(0)));
        }

        /// Lets one held search for `query` proceed.
        pub fn open(&self, query: &str) {
            if let Some(gate) = self.gates.lock().get(query) {
                gate.add_permits(1);
            }
        }

        /// Removes the gate for `query`, releasing everything it holds.
        pub fn ungate(&self, query: &str) {
            if let Some(gate) = self.gates.lock().remove(query) {
                gate.add_permits(Semaphore::MAX_PERMITS / 2);
            }
        }

        /// Returns at most `cap` messages per search, whatever the limit.
        pub fn cap_pages(&self, cap: usize) {
            *self.page_cap.lock() = Some(cap);
        }

        pub fn fail_searches(&self, fail: bool) {
            self.fail_searches.store(fail, Ordering::SeqCst);
        }

        pub fn fail_downloads(&self, fail: bool) {
            self.fail_downloads.store(fail, Ordering::SeqCst);
        }

        pub fn search_calls(&self) -> usize {
            self.search_calls.load(Ordering::SeqCst)
        }

        pub fn download_calls(&self) -> usize {
            self.download_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EnginePort for MockEngine {
        async fn search_chat_messages(
            &self,
            request: SearchChatMessages,
        ) -> Result<FoundMessages, EngineError> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);

            let gate = self.gates.lock().get(&request.query).cloned();
            if let Some(gate) = gate {
                gate.acquire()
                    .await
                    .map_err(|_| EngineError::unavailable("gate closed"))?
                    .forget();
            }

            if self.fail_searches.load(Ordering::SeqCst) {
                return Err(EngineError::unavailable("scripted failure"));
            }

            let messages = self.messages.lock().clone();
            let mut found = request.select(&messages);
            if let Some(cap) = *self.page_cap.lock() {
                found.messages.truncate(cap);
            }
            Ok(found)
        }

        async fn get_chat_message_count(
            &self,
            chat_id: ChatId,
            filter: SearchFilter,
        ) -> Result<u32, EngineError> {
            let messages = self.messages.lock();
            let count = messages
                .iter()
                .filter(|m| m.chat_id() == chat_id && m.content().matches(filter))
                .count();
            Ok(u32::try_from(count).unwrap_or(u32::MAX))
        }

        async fn get_saved_animations(&self) -> Result<Vec<SavedAnimation>, EngineError> {
            Ok(self.animations.lock().clone())
        }

        async fn download_file(&self, file_id: FileId) -> Result<FileDescriptor, EngineError> {
            self.download_calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;

            if self.fail_downloads.load(Ordering::SeqCst) {
                return Err(EngineError::unavailable("scripted failure"));
            }

            let files = self.files.lock();
            let bytes = files
                .get(&file_id)
                .ok_or_else(|| EngineError::not_found(format!("file {file_id}")))?;
            let mut file = FileDescriptor::new(file_id, bytes.len() as u64);
            file.local.completed = true;
            file.local.downloaded_size = bytes.len() as u64;
            Ok(file)
        }

        async fn read_file(&self, file_id: FileId) -> Result<Bytes, EngineError> {
            self.files
                .lock()
                .get(&file_id)
                .cloned()
                .ok_or_else(|| EngineError::not_found(format!("file {file_id}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn photo_message(id: i64) -> Message {
        Message::new(
            id,
            1_i64,
            Utc::now(),
            MessageContent::Photo {
                file_id: FileId(i32::try_from(id).unwrap()),
                caption: format!("photo {id}"),
            },
        )
    }

    fn ids(found: &FoundMessages) -> Vec<i64> {
        found.messages.iter().map(|m| m.id().as_i64()).collect()
    }

    fn history() -> Vec<Message> {
        [2, 4, 6, 8, 10, 12].into_iter().map(photo_message).collect()
    }

    #[test]
    fn test_select_newest_page() {
        let request = SearchChatMessages::new(ChatId(1), SearchFilter::PhotoAndVideo, 3);
        let found = request.select(&history());
        assert_eq!(ids(&found), vec![12, 10, 8]);
        assert_eq!(found.total_count, 6);
    }

    #[test]
    fn test_select_older_than_anchor_is_exclusive() {
        let request = SearchChatMessages::new(ChatId(1), SearchFilter::PhotoAndVideo, 2)
            .from_message(MessageId(8), 0);
        assert_eq!(ids(&request.select(&history())), vec![6, 4]);
    }

    #[test]
    fn test_select_negative_offset_reaches_newer() {
        let request = SearchChatMessages::new(ChatId(1), SearchFilter::PhotoAndVideo, 3)
            .from_message(MessageId(8), -2);
        assert_eq!(ids(&request.select(&history())), vec![10, 8, 6]);
    }

    #[test]
    fn test_select_clamps_offset_past_newest() {
        let request = SearchChatMessages::new(ChatId(1), SearchFilter::PhotoAndVideo, 2)
            .from_message(MessageId(10), -10);
        assert_eq!(ids(&request.select(&history())), vec![12, 10]);
    }

    #[test]
    fn test_select_filters_query_and_chat() {
        let mut messages = history();
        messages.push(Message::new(
            20_i64,
            2_i64,
            Utc::now(),
            MessageContent::Text {
                text: "photo elsewhere".to_string(),
            },
        ));

        let request =
            SearchChatMessages::new(ChatId(1), SearchFilter::Empty, 10).with_query("PHOTO 1");
        assert_eq!(ids(&request.select(&messages)), vec![12, 10]);
    }

    #[test]
    fn test_event_chat_id() {
        let event = EngineEvent::DeleteMessages {
            chat_id: ChatId(5),
            message_ids: vec![MessageId(1)],
            is_permanent: true,
        };
        assert_eq!(event.chat_id(), Some(ChatId(5)));
        assert!(event.is_message_event());

        let file_event = EngineEvent::FileUpdated {
            file: FileDescriptor::new(1, 10),
        };
        assert_eq!(file_event.chat_id(), None);
        assert!(!file_event.is_message_event());
    }
}
