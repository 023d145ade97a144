//! Multi-select of messages and the batch actions it allows.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::domain::entities::{ChatId, Message, MessageId, MessageKey};
use crate::domain::signal::{Signal, Subscription};

use super::stores::{ChatStore, MessageStore};

/// Selected messages, in the order they were picked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet(Vec<MessageKey>);

impl SelectionSet {
    #[must_use]
    pub fn contains(&self, key: &MessageKey) -> bool {
        self.0.contains(key)
    }

    #[must_use]
    pub fn first(&self) -> Option<&MessageKey> {
        self.0.first()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MessageKey> {
        self.0.iter()
    }
}

/// Emitted after every mutation with freshly derived action flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionChanged {
    pub count: usize,
    pub can_forward_all: bool,
    pub can_delete_all: bool,
    pub can_report_any: bool,
}

/// Message multi-select backed by the session stores.
pub struct MessageSelection {
    selected: Mutex<SelectionSet>,
    messages: Arc<MessageStore>,
    chats: Arc<ChatStore>,
    events: Signal<SelectionChanged>,
}

impl std::fmt::Debug for MessageSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSelection")
            .field("selected", &self.selected.lock().len())
            .finish_non_exhaustive()
    }
}

impl MessageSelection {
    #[must_use]
    pub fn new(messages: Arc<MessageStore>, chats: Arc<ChatStore>) -> Self {
        Self {
            selected: Mutex::new(SelectionSet::default()),
            messages,
            chats,
            events: Signal::new(),
        }
    }

    pub fn subscribe(&self) -> Subscription<SelectionChanged> {
        self.events.subscribe()
    }

    /// Selects the message if unselected, otherwise deselects it. Returns
    /// whether it is selected afterwards.
    pub fn toggle(&self, chat_id: ChatId, message_id: MessageId) -> bool {
        let key = MessageKey::new(chat_id, message_id);
        let selected = {
            let mut selection = self.selected.lock();
            if let Some(pos) = selection.0.iter().position(|k| *k == key) {
                selection.0.remove(pos);
                false
            } else {
                selection.0.push(key);
                true
            }
        };
        trace!(key = %key, selected, "Selection toggled");
        self.notify();
        selected
    }

    pub fn clear(&self) {
        let had_any = {
            let mut selection = self.selected.lock();
            let had_any = !selection.is_empty();
            selection.0.clear();
            had_any
        };
        if had_any {
            self.notify();
        }
    }

    /// Drops deleted messages from the selection.
    pub fn prune(&self, chat_id: ChatId, message_ids: &[MessageId]) -> usize {
        let deleted: HashSet<MessageId> = message_ids.iter().copied().collect();
        let removed = {
            let mut selection = self.selected.lock();
            let before = selection.len();
            selection
                .0
                .retain(|k| k.chat_id != chat_id || !deleted.contains(&k.message_id));
            before - selection.len()
        };
        if removed > 0 {
            self.notify();
        }
        removed
    }

    #[must_use]
    pub fn snapshot(&self) -> SelectionSet {
        self.selected.lock().clone()
    }

    #[must_use]
    pub fn is_selected(&self, key: &MessageKey) -> bool {
        self.selected.lock().contains(key)
    }

    /// True if every selected message is loaded and can be forwarded.
    #[must_use]
    pub fn can_forward_all(&self) -> bool {
        self.all_loaded(|m| m.can_be_forwarded())
    }

    /// True if every selected message is loaded and deletable by us.
    #[must_use]
    pub fn can_delete_all(&self) -> bool {
        self.all_loaded(|m| m.can_be_deleted())
    }

    /// Reporting is chat-scoped: decided by the first selected item's chat.
    #[must_use]
    pub fn can_report_any(&self) -> bool {
        let first = self.selected.lock().first().copied();
        first
            .and_then(|key| self.chats.get(key.chat_id))
            .is_some_and(|chat| chat.can_be_reported())
    }

    fn all_loaded(&self, allowed: impl Fn(&Message) -> bool) -> bool {
        let selection = self.snapshot();
        !selection.is_empty()
            && selection
                .iter()
                .all(|key| self.messages.get(key).is_some_and(|m| allowed(&m)))
    }

    fn notify(&self) {
        let event = SelectionChanged {
            count: self.selected.lock().len(),
            can_forward_all: self.can_forward_all(),
            can_delete_all: self.can_delete_all(),
            can_report_any: self.can_report_any(),
        };
        self.events.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Chat, MessageCapabilities, MessageContent};
    use chrono::Utc;

    fn message(id: i64, capabilities: MessageCapabilities) -> Message {
        Message::new(
            id,
            1_i64,
            Utc::now(),
            MessageContent::Text { text: "x".into() },
        )
        .with_capabilities(capabilities)
    }

    fn setup() -> (Arc<MessageStore>, Arc<ChatStore>, MessageSelection) {
        let messages = Arc::new(MessageStore::new());
        let chats = Arc::new(ChatStore::new());
        let selection = MessageSelection::new(messages.clone(), chats.clone());
        (messages, chats, selection)
    }

    #[test]
    fn test_forward_flag_requires_every_item() {
        let (messages, _, selection) = setup();
        messages.insert(message(1, MessageCapabilities::CAN_BE_FORWARDED));
        messages.insert(message(2, MessageCapabilities::empty()));

        selection.toggle(ChatId(1), MessageId(1));
        selection.toggle(ChatId(1), MessageId(2));
        assert!(!selection.can_forward_all());

        assert!(!selection.toggle(ChatId(1), MessageId(2)));
        assert!(selection.can_forward_all());
    }

    #[test]
    fn test_missing_message_disqualifies_batch() {
        let (messages, _, selection) = setup();
        messages.insert(message(
            1,
            MessageCapabilities::CAN_BE_FORWARDED | MessageCapabilities::CAN_BE_DELETED_FOR_ALL_USERS,
        ));

        selection.toggle(ChatId(1), MessageId(1));
        selection.toggle(ChatId(1), MessageId(99));
        assert!(!selection.can_forward_all());
        assert!(!selection.can_delete_all());
    }

    #[test]
    fn test_delete_accepts_either_scope() {
        let (messages, _, selection) = setup();
        messages.insert(message(1, MessageCapabilities::CAN_BE_DELETED_ONLY_FOR_SELF));
        messages.insert(message(2, MessageCapabilities::CAN_BE_DELETED_FOR_ALL_USERS));

        selection.toggle(ChatId(1), MessageId(1));
        selection.toggle(ChatId(1), MessageId(2));
        assert!(selection.can_delete_all());
    }

    #[test]
    fn test_empty_selection_allows_nothing() {
        let (_, _, selection) = setup();
        assert!(!selection.can_forward_all());
        assert!(!selection.can_delete_all());
        assert!(!selection.can_report_any());
    }

    #[test]
    fn test_report_follows_first_selected_chat() {
        let (_, chats, selection) = setup();
        chats.insert(Chat::new(1_i64, "reportable").with_can_be_reported(true));
        chats.insert(Chat::new(2_i64, "private"));

        selection.toggle(ChatId(2), MessageId(1));
        selection.toggle(ChatId(1), MessageId(1));
        assert!(!selection.can_report_any());

        selection.toggle(ChatId(2), MessageId(1));
        assert!(selection.can_report_any());
    }

    #[test]
    fn test_mutations_notify_with_flags() {
        let (messages, _, selection) = setup();
        messages.insert(message(1, MessageCapabilities::CAN_BE_FORWARDED));
        let mut events = selection.subscribe();

        selection.toggle(ChatId(1), MessageId(1));
        selection.prune(ChatId(1), &[MessageId(1)]);
        selection.clear();

        let events = events.drain();
        assert_eq!(events.len(), 2);
        assert!(events[0].can_forward_all);
        assert_eq!(events[0].count, 1);
        assert_eq!(events[1].count, 0);
        assert!(!events[1].can_forward_all);
    }

    #[test]
    fn test_prune_large_delete_keeps_other_chats() {
        let (_, _, selection) = setup();
        for id in 0..500 {
            selection.toggle(ChatId(1), MessageId(id));
        }
        selection.toggle(ChatId(2), MessageId(7));

        let deleted: Vec<MessageId> = (0..1000).map(MessageId).collect();
        assert_eq!(selection.prune(ChatId(1), &deleted), 500);
        assert_eq!(
            selection.snapshot().iter().cloned().collect::<Vec<_>>(),
            vec![MessageKey::new(2_i64, 7_i64)]
        );
        assert_eq!(selection.prune(ChatId(1), &deleted), 0);
    }
}
