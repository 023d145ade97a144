//! Bidirectional, mutation-tolerant history window for the media viewer.
//!
//! Items are kept newest first (strictly descending ids). "Next" moves
//! toward newer messages (lower index), "previous" toward older ones.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::entities::{ChatId, Message, MessageId, SearchFilter};
use crate::domain::ports::{EnginePort, SearchChatMessages};
use crate::domain::signal::{Signal, Subscription};

use super::operation_token::OperationToken;

/// Which neighbour becomes current when the current item is deleted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum ReplacementPolicy {
    /// Nearest surviving newer item first, then older.
    #[default]
    NewerFirst,
    /// Nearest surviving older item first, then newer.
    OlderFirst,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryConfig {
    /// Messages requested per page.
    pub page_size: u32,
    pub filter: SearchFilter,
    pub replacement_policy: ReplacementPolicy,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            filter: SearchFilter::PhotoAndVideo,
            replacement_policy: ReplacementPolicy::default(),
        }
    }
}

/// Lifecycle of a paginator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryPhase {
    #[default]
    Uninitialized,
    InitialLoad,
    Ready,
    LoadingMore,
    /// Nothing left to show; terminal until re-initialised.
    Closed,
}

/// Paging direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Newer,
    Older,
}

/// The loaded slice of a chat's media history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryWindow {
    items: Vec<Message>,
    current: Option<MessageId>,
    newer_exhausted: bool,
    older_exhausted: bool,
    total_count: u32,
}

impl HistoryWindow {
    #[must_use]
    pub fn items(&self) -> &[Message] {
        &self.items
    }

    #[must_use]
    pub fn ids(&self) -> Vec<MessageId> {
        self.items.iter().map(Message::id).collect()
    }

    #[must_use]
    pub const fn current_id(&self) -> Option<MessageId> {
        self.current
    }

    #[must_use]
    pub fn current(&self) -> Option<&Message> {
        self.current_index().map(|i| &self.items[i])
    }

    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        self.current.and_then(|id| self.index_of(id))
    }

    #[must_use]
    pub fn index_of(&self, id: MessageId) -> Option<usize> {
        self.items.binary_search_by(|m| id.cmp(&m.id())).ok()
    }

    /// Matches reported by the engine, adjusted for live updates.
    #[must_use]
    pub const fn total_count(&self) -> u32 {
        self.total_count
    }

    /// True once the newest matching message is loaded.
    #[must_use]
    pub const fn newer_exhausted(&self) -> bool {
        self.newer_exhausted
    }

    /// True once the oldest matching message is loaded.
    #[must_use]
    pub const fn older_exhausted(&self) -> bool {
        self.older_exhausted
    }

    /// Whether a newer item is loaded or may still be fetched.
    #[must_use]
    pub fn has_newer(&self) -> bool {
        self.current_index()
            .is_some_and(|i| i > 0 || !self.newer_exhausted)
    }

    /// Whether an older item is loaded or may still be fetched.
    #[must_use]
    pub fn has_older(&self) -> bool {
        self.current_index()
            .is_some_and(|i| i + 1 < self.items.len() || !self.older_exhausted)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Adds messages not yet present, keeping descending order. Returns how
    /// many were added.
    fn merge(&mut self, messages: Vec<Message>) -> usize {
        let known: HashSet<MessageId> = self.items.iter().map(Message::id).collect();
        let before = self.items.len();
        self.items
            .extend(messages.into_iter().filter(|m| !known.contains(&m.id())));
        let added = self.items.len() - before;
        if added > 0 {
            self.items.sort_by(|a, b| b.id().cmp(&a.id()));
            self.items.dedup_by_key(|m| m.id());
        }
        added
    }

    /// Splices `message` in if it falls inside the loaded range, or beyond
    /// a boundary that has been reached.
    fn insert(&mut self, message: Message) -> bool {
        let id = message.id();
        let (Some(newest), Some(oldest)) = (self.items.first(), self.items.last()) else {
            return false;
        };
        let (newest, oldest) = (newest.id(), oldest.id());

        let fits = (id < newest && id > oldest)
            || (id > newest && self.newer_exhausted)
            || (id < oldest && self.older_exhausted);
        if !fits || self.index_of(id).is_some() {
            return false;
        }

        let at = self.items.partition_point(|m| m.id() > id);
        self.items.insert(at, message);
        self.total_count = self.total_count.saturating_add(1);
        true
    }

    /// Removes every id in `removed`, moving `current` per `policy` if it
    /// was among them. Returns the number of items removed.
    fn remove(&mut self, removed: &HashSet<MessageId>, policy: ReplacementPolicy) -> usize {
        let replacement = match self.current_index() {
            Some(index) if removed.contains(&self.items[index].id()) => {
                let survives = |i: &usize| !removed.contains(&self.items[*i].id());
                let newer = (0..index).rev().find(survives);
                let older = (index + 1..self.items.len()).find(survives);
                let pick = match policy {
                    ReplacementPolicy::NewerFirst => newer.or(older),
                    ReplacementPolicy::OlderFirst => older.or(newer),
                };
                Some(pick.map(|i| self.items[i].id()))
            }
            _ => None,
        };

        let before = self.items.len();
        self.items.retain(|m| !removed.contains(&m.id()));
        let count = before - self.items.len();
        self.total_count = self
            .total_count
            .saturating_sub(u32::try_from(count).unwrap_or(u32::MAX));

        if let Some(next) = replacement {
            self.current = next;
        }
        count
    }
}

/// Change notifications from a paginator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryEvent {
    /// The window or the current item changed.
    Changed {
        current: Option<MessageId>,
        total_count: u32,
        has_newer: bool,
        has_older: bool,
    },
    /// The history became empty; the viewer should close.
    Closed,
}

impl HistoryEvent {
    fn changed(window: &HistoryWindow) -> Self {
        Self::Changed {
            current: window.current,
            total_count: window.total_count,
            has_newer: window.has_newer(),
            has_older: window.has_older(),
        }
    }
}

#[derive(Debug, Default)]
struct HistoryState {
    phase: HistoryPhase,
    window: HistoryWindow,
    loading: bool,
    /// Deletions seen while the first page was in flight.
    pending_removals: HashSet<MessageId>,
}

enum Step {
    Moved(MessageId),
    AtBoundary,
    Blocked,
}

/// Paginates one chat's media history around a current message.
pub struct MediaHistoryPaginator {
    engine: Arc<dyn EnginePort>,
    chat_id: ChatId,
    config: HistoryConfig,
    state: Mutex<HistoryState>,
    token: OperationToken,
    events: Signal<HistoryEvent>,
}

impl std::fmt::Debug for MediaHistoryPaginator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MediaHistoryPaginator")
            .field("chat_id", &self.chat_id)
            .field("phase", &state.phase)
            .field("items", &state.window.len())
            .finish_non_exhaustive()
    }
}

impl MediaHistoryPaginator {
    #[must_use]
    pub fn new(engine: Arc<dyn EnginePort>, chat_id: ChatId, config: HistoryConfig) -> Self {
        Self {
            engine,
            chat_id,
            config,
            state: Mutex::new(HistoryState::default()),
            token: OperationToken::new(),
            events: Signal::new(),
        }
    }

    pub fn subscribe(&self) -> Subscription<HistoryEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub const fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    #[must_use]
    pub fn phase(&self) -> HistoryPhase {
        self.state.lock().phase
    }

    /// Snapshot of the loaded window.
    #[must_use]
    pub fn window(&self) -> HistoryWindow {
        self.state.lock().window.clone()
    }

    #[must_use]
    pub fn current_id(&self) -> Option<MessageId> {
        self.state.lock().window.current
    }

    #[must_use]
    pub fn current(&self) -> Option<Message> {
        self.state.lock().window.current().cloned()
    }

    /// Loads a page centred on `anchor` and makes it current.
    ///
    /// A later call supersedes an earlier one still in flight. Returns true
    /// if this call's results were applied.
    pub async fn initialize(&self, anchor: MessageId) -> bool {
        let ticket = self.token.begin();
        {
            let mut state = self.state.lock();
            *state = HistoryState {
                phase: HistoryPhase::InitialLoad,
                ..HistoryState::default()
            };
        }

        let page_size = self.config.page_size.max(1);
        let newer_wanted = page_size / 2;
        let request = SearchChatMessages::new(self.chat_id, self.config.filter, page_size)
            .from_message(anchor, -i32::try_from(newer_wanted + 1).unwrap_or(i32::MAX));

        debug!(chat_id = %self.chat_id, anchor = %anchor, "Loading media history");
        let result = self.engine.search_chat_messages(request).await;

        if !ticket.is_current() {
            debug!(anchor = %anchor, "Discarding superseded history load");
            return false;
        }

        let found = match result {
            Ok(found) => found,
            Err(e) => {
                warn!(chat_id = %self.chat_id, error = %e, "Media history load failed");
                self.state.lock().phase = HistoryPhase::Uninitialized;
                return false;
            }
        };

        let event = {
            let mut state = self.state.lock();
            // Engines may cap a page below the requested limit, so a short
            // side is not proof of exhaustion. The page is requested from
            // above the anchor, so no newer item in it means none exists.
            let newer = found.messages.iter().filter(|m| m.id() > anchor).count();
            let reaches_anchor = found.messages.iter().any(|m| m.id() <= anchor);

            let pending = std::mem::take(&mut state.pending_removals);
            let fetched = found.messages.len();
            let messages: Vec<Message> = found
                .messages
                .into_iter()
                .filter(|m| !pending.contains(&m.id()))
                .collect();
            let dropped = u32::try_from(fetched - messages.len()).unwrap_or(u32::MAX);

            let window = &mut state.window;
            window.merge(messages);
            window.total_count = found.total_count.saturating_sub(dropped);

            let complete = window.len() >= window.total_count as usize;
            window.newer_exhausted = complete || (newer == 0 && reaches_anchor);
            window.older_exhausted = complete;
            window.current = window
                .items
                .iter()
                .find(|m| m.id() <= anchor)
                .or_else(|| window.items.last())
                .map(Message::id);

            if window.is_empty() {
                state.phase = HistoryPhase::Closed;
                HistoryEvent::Closed
            } else {
                state.phase = HistoryPhase::Ready;
                HistoryEvent::changed(&state.window)
            }
        };

        self.events.emit(event);
        true
    }

    /// Moves to the next newer item. Returns the new current id, or `None`
    /// when there is nothing newer (or a page load is already running).
    pub async fn next(&self) -> Option<MessageId> {
        self.navigate(Direction::Newer).await
    }

    /// Moves to the next older item.
    pub async fn previous(&self) -> Option<MessageId> {
        self.navigate(Direction::Older).await
    }

    /// Steps within the loaded window; only waits for the engine when the
    /// current item is already the last one loaded in `direction`.
    async fn navigate(&self, direction: Direction) -> Option<MessageId> {
        match self.step(direction) {
            Step::Moved(id) => Some(id),
            Step::AtBoundary => {
                if self.load_more(direction).await == 0 {
                    return None;
                }
                match self.step(direction) {
                    Step::Moved(id) => Some(id),
                    Step::AtBoundary | Step::Blocked => None,
                }
            }
            Step::Blocked => None,
        }
    }

    fn step(&self, direction: Direction) -> Step {
        let event = {
            let mut state = self.state.lock();
            if !matches!(state.phase, HistoryPhase::Ready | HistoryPhase::LoadingMore) {
                return Step::Blocked;
            }
            let window = &mut state.window;
            let Some(index) = window.current_index() else {
                return Step::Blocked;
            };

            let target = match direction {
                Direction::Newer => index.checked_sub(1),
                Direction::Older => Some(index + 1).filter(|i| *i < window.items.len()),
            };
            let Some(target) = target else {
                let exhausted = match direction {
                    Direction::Newer => window.newer_exhausted,
                    Direction::Older => window.older_exhausted,
                };
                return if exhausted {
                    Step::Blocked
                } else {
                    Step::AtBoundary
                };
            };

            let id = window.items[target].id();
            window.current = Some(id);
            (HistoryEvent::changed(window), Step::Moved(id))
        };

        let (event, step) = event;
        self.events.emit(event);
        step
    }

    /// Loads the next page in `direction` if the current item sits on the
    /// loaded edge there. Meant to run in the background after a move.
    pub async fn prefetch(&self, direction: Direction) -> usize {
        let at_edge = {
            let state = self.state.lock();
            let window = &state.window;
            window.current_index().is_some_and(|index| match direction {
                Direction::Newer => index == 0 && !window.newer_exhausted,
                Direction::Older => index + 1 == window.len() && !window.older_exhausted,
            })
        };
        if !at_edge {
            return 0;
        }
        debug!(chat_id = %self.chat_id, ?direction, "Prefetching history page");
        self.load_more(direction).await
    }

    /// Fetches one more page in `direction`. Returns the number of new
    /// items; zero also when a load is already in flight or it failed.
    pub async fn load_more(&self, direction: Direction) -> usize {
        let page_size = self.config.page_size.max(1);
        let request = {
            let mut state = self.state.lock();
            if state.loading || state.phase != HistoryPhase::Ready {
                debug!(?direction, "Page load skipped");
                return 0;
            }
            let window = &state.window;
            let request = SearchChatMessages::new(self.chat_id, self.config.filter, page_size);
            let request = match direction {
                Direction::Newer if !window.newer_exhausted => window.items.first().map(|m| {
                    request.from_message(m.id(), -i32::try_from(page_size).unwrap_or(i32::MAX))
                }),
                Direction::Older if !window.older_exhausted => {
                    window.items.last().map(|m| request.from_message(m.id(), 0))
                }
                _ => None,
            };
            let Some(request) = request else {
                return 0;
            };
            state.loading = true;
            state.phase = HistoryPhase::LoadingMore;
            request
        };

        let ticket = self.token.ticket();
        debug!(chat_id = %self.chat_id, ?direction, "Loading more history");
        let result = self.engine.search_chat_messages(request).await;

        if !ticket.is_current() {
            debug!(?direction, "Discarding page for a superseded window");
            return 0;
        }

        let (added, event) = {
            let mut state = self.state.lock();
            state.loading = false;
            if state.phase == HistoryPhase::LoadingMore {
                state.phase = HistoryPhase::Ready;
            }

            let found = match result {
                Ok(found) => found,
                Err(e) => {
                    warn!(chat_id = %self.chat_id, ?direction, error = %e, "History page load failed");
                    return 0;
                }
            };

            let window = &mut state.window;
            let added = window.merge(found.messages);
            window.total_count = found.total_count;
            if added == 0 {
                match direction {
                    Direction::Newer => window.newer_exhausted = true,
                    Direction::Older => window.older_exhausted = true,
                }
            }
            (added, HistoryEvent::changed(window))
        };

        self.events.emit(event);
        added
    }

    /// Splices in a newly arrived message. Returns true if it was added.
    pub fn handle_new_message(&self, message: &Message) -> bool {
        if !self.accepts(message) {
            return false;
        }
        self.update(|window| window.insert(message.clone()))
    }

    /// Reconciles an edited message: it joins, stays in, or leaves the
    /// window depending on whether its new content is still viewer media.
    pub fn handle_message_changed(&self, message: &Message) -> bool {
        if message.chat_id() != self.chat_id {
            return false;
        }
        let id = message.id();
        if !message.content().matches(self.config.filter) {
            return self.remove(&HashSet::from([id]));
        }

        self.update(|window| match window.index_of(id) {
            Some(index) => {
                window.items[index].set_content(message.content().clone());
                true
            }
            None => window.insert(message.clone()),
        })
    }

    /// Removes permanently deleted messages. Returns true if any were loaded.
    pub fn handle_deleted(
        &self,
        chat_id: ChatId,
        message_ids: &[MessageId],
        is_permanent: bool,
    ) -> bool {
        if chat_id != self.chat_id || !is_permanent {
            return false;
        }
        let removed: HashSet<MessageId> = message_ids.iter().copied().collect();
        self.remove(&removed)
    }

    /// Closes the history; pending loads are discarded.
    pub fn close(&self) {
        self.token.invalidate();
        {
            let mut state = self.state.lock();
            state.phase = HistoryPhase::Closed;
            state.loading = false;
        }
        self.events.emit(HistoryEvent::Closed);
    }

    fn accepts(&self, message: &Message) -> bool {
        message.chat_id() == self.chat_id && message.content().matches(self.config.filter)
    }

    fn remove(&self, removed: &HashSet<MessageId>) -> bool {
        let policy = self.config.replacement_policy;
        let event = {
            let mut state = self.state.lock();
            if state.phase == HistoryPhase::InitialLoad {
                state.pending_removals.extend(removed.iter().copied());
                return false;
            }
            if !matches!(state.phase, HistoryPhase::Ready | HistoryPhase::LoadingMore) {
                return false;
            }
            if state.window.remove(removed, policy) == 0 {
                return false;
            }
            if state.window.is_empty() || state.window.current_index().is_none() {
                info!(chat_id = %self.chat_id, "Media history emptied, closing viewer");
                self.token.invalidate();
                state.phase = HistoryPhase::Closed;
                state.loading = false;
                HistoryEvent::Closed
            } else {
                HistoryEvent::changed(&state.window)
            }
        };
        self.events.emit(event);
        true
    }

    fn update(&self, f: impl FnOnce(&mut HistoryWindow) -> bool) -> bool {
        let event = {
            let mut state = self.state.lock();
            if !matches!(state.phase, HistoryPhase::Ready | HistoryPhase::LoadingMore) {
                return false;
            }
            if !f(&mut state.window) {
                return false;
            }
            HistoryEvent::changed(&state.window)
        };
        self.events.emit(event);
        true
    }
}
