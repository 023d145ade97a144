//! In-chat message search where only the latest query's results land.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::domain::entities::{ChatId, Message, SearchFilter};
use crate::domain::ports::{EnginePort, SearchChatMessages};
use crate::domain::signal::{Signal, Subscription};

use super::operation_token::OperationToken;

pub const DEFAULT_SEARCH_LIMIT: u32 = 50;

/// Results of the most recent search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResults {
    pub chat_id: Option<ChatId>,
    pub query: String,
    pub total_count: u32,
    pub messages: Vec<Message>,
}

pub struct MessageSearch {
    engine: Arc<dyn EnginePort>,
    limit: u32,
    token: OperationToken,
    results: Mutex<SearchResults>,
    events: Signal<SearchResults>,
}

impl std::fmt::Debug for MessageSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSearch")
            .field("limit", &self.limit)
            .field("results", &self.results.lock().messages.len())
            .finish_non_exhaustive()
    }
}

impl MessageSearch {
    #[must_use]
    pub fn new(engine: Arc<dyn EnginePort>, limit: u32) -> Self {
        Self {
            engine,
            limit,
            token: OperationToken::new(),
            results: Mutex::new(SearchResults::default()),
            events: Signal::new(),
        }
    }

    pub fn subscribe(&self) -> Subscription<SearchResults> {
        self.events.subscribe()
    }

    /// Searches `chat_id` for `query`, replacing the current results.
    ///
    /// Returns false if a newer search started before this one finished;
    /// its results are then dropped. A failed request counts as no matches.
    pub async fn search(&self, chat_id: ChatId, query: &str, filter: SearchFilter) -> bool {
        let request = SearchChatMessages::new(chat_id, filter, self.limit).with_query(query);
        let outcome = self
            .token
            .run(self.engine.search_chat_messages(request))
            .await;

        let Some(result) = outcome else {
            debug!(chat_id = %chat_id, query, "Discarding stale search results");
            return false;
        };

        let found = result.unwrap_or_else(|e| {
            warn!(chat_id = %chat_id, query, error = %e, "Search failed");
            Default::default()
        });

        let results = SearchResults {
            chat_id: Some(chat_id),
            query: query.to_string(),
            total_count: found.total_count,
            messages: found.messages,
        };
        *self.results.lock() = results.clone();
        self.events.emit(results);
        true
    }

    #[must_use]
    pub fn results(&self) -> SearchResults {
        self.results.lock().clone()
    }

    /// Clears results and discards any search still in flight.
    pub fn clear(&self) {
        self.token.invalidate();
        *self.results.lock() = SearchResults::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::MessageContent;
    use crate::domain::ports::mocks::MockEngine;
    use chrono::Utc;

    fn text(id: i64, body: &str) -> Message {
        Message::new(
            id,
            1_i64,
            Utc::now(),
            MessageContent::Text { text: body.into() },
        )
    }

    fn engine() -> Arc<MockEngine> {
        Arc::new(MockEngine::with_messages(vec![
            text(1, "t1 first"),
            text(2, "t2 second"),
            text(3, "t1 third"),
        ]))
    }

    #[tokio::test]
    async fn test_search_replaces_results() {
        let engine = engine();
        let search = MessageSearch::new(engine, DEFAULT_SEARCH_LIMIT);

        assert!(search.search(ChatId(1), "t1", SearchFilter::Empty).await);
        let results = search.results();
        assert_eq!(results.total_count, 2);
        assert_eq!(results.messages.len(), 2);

        search.search(ChatId(1), "t2", SearchFilter::Empty).await;
        assert_eq!(search.results().query, "t2");
        assert_eq!(search.results().messages.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_response_does_not_overwrite() {
        let engine = engine();
        engine.gate("t1");
        engine.gate("t2");
        let search = MessageSearch::new(engine.clone(), DEFAULT_SEARCH_LIMIT);
        let mut events = search.subscribe();

        let mut first = tokio_test::task::spawn(search.search(ChatId(1), "t1", SearchFilter::Empty));
        tokio_test::assert_pending!(first.poll());
        let mut second =
            tokio_test::task::spawn(search.search(ChatId(1), "t2", SearchFilter::Empty));
        tokio_test::assert_pending!(second.poll());

        engine.open("t2");
        tokio_test::assert_ready_eq!(second.poll(), true);

        engine.open("t1");
        tokio_test::assert_ready_eq!(first.poll(), false);

        assert_eq!(search.results().query, "t2");
        let events = events.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].query, "t2");
    }

    #[tokio::test]
    async fn test_failure_yields_empty_results() {
        let engine = engine();
        let search = MessageSearch::new(engine.clone(), DEFAULT_SEARCH_LIMIT);
        search.search(ChatId(1), "t1", SearchFilter::Empty).await;

        engine.fail_searches(true);
        assert!(search.search(ChatId(1), "t1", SearchFilter::Empty).await);
        assert!(search.results().messages.is_empty());
    }

    #[tokio::test]
    async fn test_clear_discards_in_flight_search() {
        let engine = engine();
        engine.gate("t1");
        let search = MessageSearch::new(engine.clone(), DEFAULT_SEARCH_LIMIT);

        let mut pending = tokio_test::task::spawn(search.search(ChatId(1), "t1", SearchFilter::Empty));
        tokio_test::assert_pending!(pending.poll());
        search.clear();

        engine.ungate("t1");
        tokio_test::assert_ready_eq!(pending.poll(), false);
        assert_eq!(search.results(), SearchResults::default());
    }
}
