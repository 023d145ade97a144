use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::entities::{
    Chat, ChatId, FileDescriptor, FileId, Message, MessageContent, MessageId, SavedAnimation,
    SearchFilter,
};
use crate::domain::errors::EngineError;
use crate::domain::ports::{EngineEvent, EnginePort, FoundMessages, SearchChatMessages};
use crate::domain::signal::{Signal, Subscription};

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("failed to read fixture: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid fixture: {0}")]
    Json(#[from] serde_json::Error),
}

/// File entry of a fixture. The content is stored as given.
#[derive(Debug, Clone, Deserialize)]
pub struct FixtureFile {
    pub id: FileId,
    pub content: String,
}

/// Serialized engine state used to seed an [`InMemoryEngine`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub chats: Vec<Chat>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub files: Vec<FixtureFile>,
    #[serde(default)]
    pub saved_animations: Vec<SavedAnimation>,
}

impl Fixture {
    /// Parses a fixture from JSON text.
    ///
    /// # Errors
    ///
    /// Returns `FixtureError::Json` if the text is not a valid fixture.
    pub fn from_json(json: &str) -> Result<Self, FixtureError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a fixture file.
    ///
    /// # Errors
    ///
    /// Returns `FixtureError` if the file cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self, FixtureError> {
        let content = tokio::fs::read_to_string(path).await?;
        let fixture = Self::from_json(&content)?;
        info!(
            path = ?path,
            chats = fixture.chats.len(),
            messages = fixture.messages.len(),
            files = fixture.files.len(),
            "Loaded fixture"
        );
        Ok(fixture)
    }
}

#[derive(Default)]
struct EngineState {
    chats: Vec<Chat>,
    messages: Vec<Message>,
    files: HashMap<FileId, Bytes>,
    downloaded: HashMap<FileId, FileDescriptor>,
    animations: Vec<SavedAnimation>,
}

/// Engine adapter that serves requests from memory.
///
/// Mutations go through the methods below so that every change is pushed
/// to subscribers the way a live engine would push updates.
pub struct InMemoryEngine {
    state: RwLock<EngineState>,
    events: Signal<EngineEvent>,
}

impl std::fmt::Debug for InMemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("InMemoryEngine")
            .field("chats", &state.chats.len())
            .field("messages", &state.messages.len())
            .field("files", &state.files.len())
            .finish_non_exhaustive()
    }
}

impl InMemoryEngine {
    #[must_use]
    pub fn new(fixture: Fixture) -> Self {
        let files = fixture
            .files
            .into_iter()
            .map(|file| (file.id, Bytes::from(file.content)))
            .collect();

        Self {
            state: RwLock::new(EngineState {
                chats: fixture.chats,
                messages: fixture.messages,
                files,
                downloaded: HashMap::new(),
                animations: fixture.saved_animations,
            }),
            events: Signal::new(),
        }
    }

    pub fn subscribe(&self) -> Subscription<EngineEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn chats(&self) -> Vec<Chat> {
        self.state.read().chats.clone()
    }

    /// Newest message of `chat_id` that the media viewer can open.
    #[must_use]
    pub fn newest_media(&self, chat_id: ChatId) -> Option<MessageId> {
        self.state
            .read()
            .messages
            .iter()
            .filter(|m| m.chat_id() == chat_id && m.content().is_viewer_media())
            .map(Message::id)
            .max()
    }

    /// Announces every chat, as an engine does right after login.
    pub fn announce_chats(&self) {
        let chats = self.chats();
        for chat in chats {
            self.events.emit(EngineEvent::ChatUpdated { chat });
        }
    }

    pub fn add_file(&self, file_id: FileId, content: impl Into<Bytes>) {
        self.state.write().files.insert(file_id, content.into());
    }

    /// Stores a new message and announces it.
    pub fn push_new_message(&self, message: Message) {
        {
            let mut state = self.state.write();
            state.messages.retain(|m| m.key() != message.key());
            state.messages.push(message.clone());
        }
        debug!(chat_id = %message.chat_id(), message_id = %message.id(), "New message");
        self.events.emit(EngineEvent::NewMessage { message });
    }

    /// Replaces a message's content and announces the change.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` if the message does not exist.
    pub fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        content: MessageContent,
    ) -> Result<(), EngineError> {
        {
            let mut state = self.state.write();
            let message = state
                .messages
                .iter_mut()
                .find(|m| m.chat_id() == chat_id && m.id() == message_id)
                .ok_or_else(|| EngineError::not_found(format!("message {message_id}")))?;
            message.set_content(content.clone());
        }

        self.events.emit(EngineEvent::MessageContentChanged {
            chat_id,
            message_id,
            new_content: content,
        });
        Ok(())
    }

    /// Deletes messages and announces the deletion, returning how many existed.
    ///
    /// Non-permanent deletions only evict the messages from client caches,
    /// so the engine keeps them.
    pub fn delete_messages(
        &self,
        chat_id: ChatId,
        message_ids: &[MessageId],
        is_permanent: bool,
    ) -> usize {
        let removed = {
            let mut state = self.state.write();
            let before = state.messages.len();
            if is_permanent {
                state
                    .messages
                    .retain(|m| m.chat_id() != chat_id || !message_ids.contains(&m.id()));
            }
            before - state.messages.len()
        };

        self.events.emit(EngineEvent::DeleteMessages {
            chat_id,
            message_ids: message_ids.to_vec(),
            is_permanent,
        });
        removed
    }
}

#[async_trait]
impl EnginePort for InMemoryEngine {
    async fn search_chat_messages(
        &self,
        request: SearchChatMessages,
    ) -> Result<FoundMessages, EngineError> {
        let state = self.state.read();
        if !state.chats.iter().any(|c| c.id() == request.chat_id) {
            return Err(EngineError::not_found(format!("chat {}", request.chat_id)));
        }
        if request.limit == 0 {
            return Err(EngineError::rejected(400, "limit must be positive"));
        }

        let found = request.select(&state.messages);
        debug!(
            chat_id = %request.chat_id,
            from = %request.from_message_id,
            offset = request.offset,
            returned = found.messages.len(),
            total = found.total_count,
            "Served message page"
        );
        Ok(found)
    }

    async fn get_chat_message_count(
        &self,
        chat_id: ChatId,
        filter: SearchFilter,
    ) -> Result<u32, EngineError> {
        let state = self.state.read();
        let count = state
            .messages
            .iter()
            .filter(|m| m.chat_id() == chat_id && m.content().matches(filter))
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn get_saved_animations(&self) -> Result<Vec<SavedAnimation>, EngineError> {
        Ok(self.state.read().animations.clone())
    }

    async fn download_file(&self, file_id: FileId) -> Result<FileDescriptor, EngineError> {
        let file = {
            let mut state = self.state.write();
            if let Some(done) = state.downloaded.get(&file_id) {
                return Ok(done.clone());
            }

            let Some(size) = state.files.get(&file_id).map(|b| b.len() as u64) else {
                warn!(file_id = %file_id, "Download of unknown file");
                return Err(EngineError::not_found(format!("file {file_id}")));
            };

            let mut file = FileDescriptor::new(file_id, size);
            file.local.completed = true;
            file.local.downloaded_size = size;
            file.remote.completed = true;
            file.remote.uploaded_size = size;
            state.downloaded.insert(file_id, file.clone());
            file
        };

        self.events.emit(EngineEvent::FileUpdated { file: file.clone() });
        Ok(file)
    }

    async fn read_file(&self, file_id: FileId) -> Result<Bytes, EngineError> {
        let state = self.state.read();
        if !state.downloaded.contains_key(&file_id) {
            return Err(EngineError::rejected(400, format!("file {file_id} is not downloaded")));
        }
        state
            .files
            .get(&file_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("file {file_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "chats": [{ "id": 1, "title": "Photos", "can_be_reported": true }],
        "messages": [
            { "id": 2, "chat_id": 1, "date": "2024-05-01T10:00:00Z",
              "content": { "type": "photo", "file_id": 20, "caption": "beach" } },
            { "id": 4, "chat_id": 1, "date": "2024-05-01T10:05:00Z",
              "content": { "type": "text", "text": "nice" } },
            { "id": 6, "chat_id": 1, "date": "2024-05-01T10:10:00Z",
              "content": { "type": "video", "file_id": 60, "thumbnail": 61, "caption": "waves" } }
        ],
        "files": [
            { "id": 20, "content": "jpeg" },
            { "id": 60, "content": "mp4 bytes" }
        ]
    }"#;

    fn engine() -> InMemoryEngine {
        InMemoryEngine::new(Fixture::from_json(FIXTURE).unwrap())
    }

    #[test]
    fn test_fixture_rejects_malformed_json() {
        assert!(matches!(
            Fixture::from_json("{ \"chats\": 3 }"),
            Err(FixtureError::Json(_))
        ));
    }

    #[tokio::test]
    async fn test_media_page_and_count() {
        let engine = engine();
        let request = SearchChatMessages::new(ChatId(1), SearchFilter::PhotoAndVideo, 10);
        let found = engine.search_chat_messages(request).await.unwrap();

        let ids: Vec<i64> = found.messages.iter().map(|m| m.id().as_i64()).collect();
        assert_eq!(ids, vec![6, 2]);
        assert_eq!(found.total_count, 2);
        assert_eq!(
            engine
                .get_chat_message_count(ChatId(1), SearchFilter::Empty)
                .await
                .unwrap(),
            3
        );
        assert_eq!(engine.newest_media(ChatId(1)), Some(MessageId(6)));
    }

    #[tokio::test]
    async fn test_unknown_chat_is_rejected() {
        let engine = engine();
        let request = SearchChatMessages::new(ChatId(9), SearchFilter::Empty, 10);
        assert_eq!(
            engine.search_chat_messages(request).await,
            Err(EngineError::not_found("chat 9"))
        );
    }

    #[tokio::test]
    async fn test_read_requires_download() {
        let engine = engine();
        let mut events = engine.subscribe();

        assert!(engine.read_file(FileId(20)).await.is_err());

        let file = engine.download_file(FileId(20)).await.unwrap();
        assert!(file.is_downloaded());
        assert_eq!(file.size, 4);
        assert_eq!(engine.read_file(FileId(20)).await.unwrap(), Bytes::from("jpeg"));

        engine.download_file(FileId(20)).await.unwrap();
        assert_eq!(events.drain().len(), 1);

        assert_eq!(
            engine.download_file(FileId(99)).await,
            Err(EngineError::not_found("file 99"))
        );
    }

    #[tokio::test]
    async fn test_mutations_are_announced() {
        let engine = engine();
        let mut events = engine.subscribe();

        engine
            .edit_message(
                ChatId(1),
                MessageId(4),
                MessageContent::Photo {
                    file_id: FileId(40),
                    caption: String::new(),
                },
            )
            .unwrap();
        assert_eq!(engine.newest_media(ChatId(1)), Some(MessageId(6)));
        assert_eq!(engine.delete_messages(ChatId(1), &[MessageId(6)], true), 1);
        assert_eq!(engine.newest_media(ChatId(1)), Some(MessageId(4)));
        assert_eq!(engine.delete_messages(ChatId(1), &[MessageId(4)], false), 0);

        let events = events.drain();
        assert_eq!(events.len(), 3);
        assert!(matches!(
            events[0],
            EngineEvent::MessageContentChanged { message_id: MessageId(4), .. }
        ));
        assert!(matches!(
            events[2],
            EngineEvent::DeleteMessages { is_permanent: false, .. }
        ));
    }

    #[tokio::test]
    async fn test_edit_of_missing_message_fails() {
        let engine = engine();
        let mut events = engine.subscribe();
        assert!(
            engine
                .edit_message(ChatId(1), MessageId(100), MessageContent::Unsupported)
                .is_err()
        );
        assert!(events.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_push_new_message_replaces_same_key() {
        let engine = engine();
        let mut events = engine.subscribe();
        let message = Message::new(
            8_i64,
            1_i64,
            chrono::Utc::now(),
            MessageContent::Photo {
                file_id: FileId(80),
                caption: "sunset".into(),
            },
        );

        engine.push_new_message(message.clone());
        engine.push_new_message(message);

        assert_eq!(engine.newest_media(ChatId(1)), Some(MessageId(8)));
        assert_eq!(
            engine
                .get_chat_message_count(ChatId(1), SearchFilter::PhotoAndVideo)
                .await
                .unwrap(),
            3
        );
        assert_eq!(events.drain().len(), 2);
    }
}
