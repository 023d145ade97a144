//! Session-owned message and chat stores fed by engine events.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::domain::entities::{Chat, ChatId, Message, MessageContent, MessageId, MessageKey};

/// Every message the session has seen, by key.
#[derive(Debug, Default)]
pub struct MessageStore {
    messages: RwLock<HashMap<MessageKey, Message>>,
}

impl MessageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, message: Message) {
        self.messages.write().insert(message.key(), message);
    }

    pub fn insert_many(&self, messages: impl IntoIterator<Item = Message>) {
        let mut store = self.messages.write();
        for message in messages {
            store.insert(message.key(), message);
        }
    }

    #[must_use]
    pub fn get(&self, key: &MessageKey) -> Option<Message> {
        self.messages.read().get(key).cloned()
    }

    #[must_use]
    pub fn contains(&self, key: &MessageKey) -> bool {
        self.messages.read().contains_key(key)
    }

    /// Replaces a stored message's content, returning the updated message.
    pub fn update_content(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        content: MessageContent,
    ) -> Option<Message> {
        let mut store = self.messages.write();
        let message = store.get_mut(&MessageKey::new(chat_id, message_id))?;
        message.set_content(content);
        Some(message.clone())
    }

    /// Removes messages, returning how many were stored.
    pub fn remove(&self, chat_id: ChatId, message_ids: &[MessageId]) -> usize {
        let mut store = self.messages.write();
        message_ids
            .iter()
            .filter_map(|id| store.remove(&MessageKey::new(chat_id, *id)))
            .count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.messages.write().clear();
    }
}

/// Known chats, by id.
#[derive(Debug, Default)]
pub struct ChatStore {
    chats: RwLock<HashMap<ChatId, Chat>>,
}

impl ChatStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, chat: Chat) {
        self.chats.write().insert(chat.id(), chat);
    }

    #[must_use]
    pub fn get(&self, chat_id: ChatId) -> Option<Chat> {
        self.chats.read().get(&chat_id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chats.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.chats.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn text(chat: i64, id: i64) -> Message {
        Message::new(
            id,
            chat,
            Utc::now(),
            MessageContent::Text {
                text: format!("message {id}"),
            },
        )
    }

    #[test]
    fn test_messages_are_keyed_per_chat() {
        let store = MessageStore::new();
        store.insert_many([text(1, 5), text(2, 5)]);

        assert_eq!(store.len(), 2);
        assert!(store.contains(&MessageKey::new(2_i64, 5_i64)));
        assert_eq!(store.remove(ChatId(1), &[MessageId(5), MessageId(6)]), 1);
        assert!(store.get(&MessageKey::new(1_i64, 5_i64)).is_none());
    }

    #[test]
    fn test_update_content_returns_updated_message() {
        let store = MessageStore::new();
        store.insert(text(1, 3));

        let updated = store.update_content(ChatId(1), MessageId(3), MessageContent::Unsupported);
        assert_eq!(
            updated.map(|m| m.content().clone()),
            Some(MessageContent::Unsupported)
        );
        assert!(store
            .update_content(ChatId(1), MessageId(4), MessageContent::Unsupported)
            .is_none());
    }

    #[test]
    fn test_chat_store_replaces_on_update() {
        let store = ChatStore::new();
        store.insert(Chat::new(1_i64, "old"));
        store.insert(Chat::new(1_i64, "new").with_can_be_reported(true));

        let chat = store.get(ChatId(1));
        assert!(chat.as_ref().is_some_and(|c| c.title() == "new" && c.can_be_reported()));
        store.clear();
        assert!(store.is_empty());
    }
}
