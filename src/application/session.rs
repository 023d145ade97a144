//! Per-session wiring of stores and services.
//!
//! A [`SessionContext`] is built when a session starts and owns every store
//! and service for it. Engine events enter through
//! [`SessionContext::handle_event`]; [`SessionContext::reset`] tears the
//! session state down without rebuilding the context.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::domain::entities::{
    ChatId, FileId, MessageId, SavedAnimation, SearchFilter, ViewportKey, VisibilitySet,
};
use crate::domain::ports::{BoundsProvider, EngineEvent, EnginePort};
use crate::domain::signal::Subscription;

use super::services::file_cache::{DEFAULT_PARKED_CAPACITY, FileCache};
use super::services::file_loader::FileLoader;
use super::services::media_history::{
    Direction, HistoryConfig, HistoryEvent, HistoryPhase, MediaHistoryPaginator,
};
use super::services::message_search::{DEFAULT_SEARCH_LIMIT, MessageSearch};
use super::services::playback_coordinator::{Overlay, PlaybackConfig, PlaybackCoordinator};
use super::services::selection::MessageSelection;
use super::services::stores::{ChatStore, MessageStore};
use super::services::visibility_tracker::{
    RegionId, RegionRegistration, VisibilityChanged, VisibilityConfig, VisibilityTracker,
};

/// Tunables for every service a session owns.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub visibility: VisibilityConfig,
    pub playback: PlaybackConfig,
    pub history: HistoryConfig,
    /// Unreferenced blobs kept before the oldest is revoked.
    pub parked_blobs: usize,
    pub search_limit: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            visibility: VisibilityConfig::default(),
            playback: PlaybackConfig::default(),
            history: HistoryConfig::default(),
            parked_blobs: DEFAULT_PARKED_CAPACITY,
            search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

/// Everything one client session holds.
pub struct SessionContext {
    engine: Arc<dyn EnginePort>,
    config: SessionConfig,
    messages: Arc<MessageStore>,
    chats: Arc<ChatStore>,
    files: Arc<FileCache>,
    loader: FileLoader,
    visibility: VisibilityTracker,
    playback: PlaybackCoordinator,
    selection: MessageSelection,
    search: MessageSearch,
    viewer: Mutex<Option<Arc<MediaHistoryPaginator>>>,
    viewer_files: Mutex<Vec<FileId>>,
    region_files: Mutex<HashMap<RegionId, HashSet<FileId>>>,
    animations: RwLock<Vec<SavedAnimation>>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("messages", &self.messages.len())
            .field("chats", &self.chats.len())
            .field("files", &self.files.stats())
            .field("viewer_open", &self.viewer.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl SessionContext {
    #[must_use]
    pub fn new(engine: Arc<dyn EnginePort>, config: SessionConfig) -> Self {
        let messages = Arc::new(MessageStore::new());
        let chats = Arc::new(ChatStore::new());
        let files = Arc::new(FileCache::new(config.parked_blobs));
        Self {
            loader: FileLoader::new(engine.clone(), files.clone()),
            visibility: VisibilityTracker::new(config.visibility.clone()),
            playback: PlaybackCoordinator::new(config.playback.clone()),
            selection: MessageSelection::new(messages.clone(), chats.clone()),
            search: MessageSearch::new(engine.clone(), config.search_limit),
            engine,
            config,
            messages,
            chats,
            files,
            viewer: Mutex::new(None),
            viewer_files: Mutex::new(Vec::new()),
            region_files: Mutex::new(HashMap::new()),
            animations: RwLock::new(Vec::new()),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn messages(&self) -> &MessageStore {
        &self.messages
    }

    #[must_use]
    pub fn chats(&self) -> &ChatStore {
        &self.chats
    }

    #[must_use]
    pub fn files(&self) -> &FileCache {
        &self.files
    }

    #[must_use]
    pub const fn loader(&self) -> &FileLoader {
        &self.loader
    }

    #[must_use]
    pub const fn visibility(&self) -> &VisibilityTracker {
        &self.visibility
    }

    #[must_use]
    pub const fn playback(&self) -> &PlaybackCoordinator {
        &self.playback
    }

    #[must_use]
    pub const fn selection(&self) -> &MessageSelection {
        &self.selection
    }

    #[must_use]
    pub const fn search(&self) -> &MessageSearch {
        &self.search
    }

    /// The open media viewer's history, if any.
    #[must_use]
    pub fn viewer(&self) -> Option<Arc<MediaHistoryPaginator>> {
        self.viewer.lock().clone()
    }

    /// Starts tracking a scroll region.
    #[must_use = "dropping the registration unregisters the region"]
    pub fn register_region(&self, provider: Arc<dyn BoundsProvider>) -> RegionRegistration {
        self.visibility.register_region(provider)
    }

    /// Applies one engine push event to every interested store.
    ///
    /// When the event moves or empties the viewer's window, the viewer's
    /// retained files follow its new current item, or the viewer closes.
    pub async fn handle_event(&self, event: &EngineEvent) {
        let viewer = self.viewer();
        match event {
            EngineEvent::NewMessage { message } => {
                self.messages.insert(message.clone());
                if let Some(viewer) = viewer {
                    viewer.handle_new_message(message);
                }
            }
            EngineEvent::MessageContentChanged {
                chat_id,
                message_id,
                new_content,
            } => {
                let Some(updated) =
                    self.messages
                        .update_content(*chat_id, *message_id, new_content.clone())
                else {
                    debug!(chat_id = %chat_id, message_id = %message_id, "Edit for unknown message");
                    return;
                };
                if let Some(viewer) = viewer
                    && viewer.handle_message_changed(&updated)
                {
                    self.reconcile_viewer(&viewer).await;
                }
            }
            EngineEvent::DeleteMessages {
                chat_id,
                message_ids,
                is_permanent,
            } => {
                if !*is_permanent {
                    return;
                }
                self.messages.remove(*chat_id, message_ids);
                self.selection.prune(*chat_id, message_ids);
                if let Some(viewer) = viewer
                    && viewer.handle_deleted(*chat_id, message_ids, true)
                {
                    self.reconcile_viewer(&viewer).await;
                }
            }
            EngineEvent::FileUpdated { file } => {
                self.files.upsert(file.clone());
            }
            EngineEvent::ChatUpdated { chat } => {
                self.chats.insert(chat.clone());
            }
        }
    }

    /// Feeds engine events into [`Self::handle_event`] until the stream ends.
    pub async fn pump_events(&self, mut events: Subscription<EngineEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(&event).await;
        }
        debug!("Engine event stream ended");
    }

    /// Opens the media viewer on `message_id` and loads its content.
    ///
    /// Returns false if the history could not be loaded or turned out empty.
    pub async fn open_viewer(&self, chat_id: ChatId, message_id: MessageId) -> bool {
        self.close_viewer();

        let history = Arc::new(MediaHistoryPaginator::new(
            self.engine.clone(),
            chat_id,
            self.config.history.clone(),
        ));
        *self.viewer.lock() = Some(history.clone());
        self.playback.set_overlay(Overlay::MediaViewer, true);

        if !history.initialize(message_id).await || history.phase() != HistoryPhase::Ready {
            warn!(chat_id = %chat_id, message_id = %message_id, "Media viewer could not open");
            self.close_viewer();
            return false;
        }

        info!(chat_id = %chat_id, message_id = %message_id, "Media viewer opened");
        self.messages.insert_many(history.window().items().iter().cloned());
        self.focus_viewer_item().await;
        true
    }

    /// Moves the viewer to the next newer item.
    pub async fn viewer_next(&self) -> Option<MessageId> {
        let viewer = self.viewer()?;
        let id = viewer.next().await?;
        self.after_navigation(&viewer, Direction::Newer).await;
        Some(id)
    }

    /// Moves the viewer to the next older item.
    pub async fn viewer_previous(&self) -> Option<MessageId> {
        let viewer = self.viewer()?;
        let id = viewer.previous().await?;
        self.after_navigation(&viewer, Direction::Older).await;
        Some(id)
    }

    pub fn close_viewer(&self) {
        let Some(viewer) = self.viewer.lock().take() else {
            return;
        };
        if viewer.phase() != HistoryPhase::Closed {
            viewer.close();
        }
        for file_id in std::mem::take(&mut *self.viewer_files.lock()) {
            self.files.release(file_id);
        }
        self.playback.set_overlay(Overlay::MediaViewer, false);
        debug!(chat_id = %viewer.chat_id(), "Media viewer closed");
    }

    /// Subscribes to the open viewer's history events.
    #[must_use]
    pub fn subscribe_viewer(&self) -> Option<Subscription<HistoryEvent>> {
        self.viewer().map(|viewer| viewer.subscribe())
    }

    /// Routes a region's visibility change to playback and blob retention,
    /// then loads content for newly visible items.
    pub async fn on_visibility_changed(&self, change: &VisibilityChanged) {
        self.playback.apply_visibility(change);

        let wanted = self.files_for(&change.visible);
        let (added, removed) = {
            let mut regions = self.region_files.lock();
            let previous = regions.remove(&change.region).unwrap_or_default();
            let added: Vec<FileId> = wanted.difference(&previous).copied().collect();
            let removed: Vec<FileId> = previous.difference(&wanted).copied().collect();
            regions.insert(change.region, wanted);
            (added, removed)
        };

        for file_id in &added {
            self.files.retain(*file_id);
        }
        for file_id in removed {
            self.files.release(file_id);
        }
        self.loader.load_many(added).await;
    }

    /// Releases everything a region retained, e.g. when it unmounts.
    pub fn forget_region(&self, region: RegionId) {
        let retained = self.region_files.lock().remove(&region).unwrap_or_default();
        for file_id in retained {
            self.files.release(file_id);
        }
    }

    /// Fetches the saved animations and records their files.
    ///
    /// A failed request leaves the previous list in place and yields it.
    pub async fn load_saved_animations(&self) -> Vec<SavedAnimation> {
        match self.engine.get_saved_animations().await {
            Ok(animations) => {
                for animation in &animations {
                    self.files.upsert(animation.file.clone());
                }
                debug!(count = animations.len(), "Saved animations loaded");
                *self.animations.write() = animations.clone();
                animations
            }
            Err(e) => {
                warn!(error = %e, "Loading saved animations failed");
                self.animations.read().clone()
            }
        }
    }

    #[must_use]
    pub fn saved_animations(&self) -> Vec<SavedAnimation> {
        self.animations.read().clone()
    }

    /// Number of photos and videos in a chat; zero if the engine fails.
    pub async fn media_count(&self, chat_id: ChatId) -> u32 {
        self.engine
            .get_chat_message_count(chat_id, SearchFilter::PhotoAndVideo)
            .await
            .unwrap_or_else(|e| {
                warn!(chat_id = %chat_id, error = %e, "Media count failed");
                0
            })
    }

    /// Drops all session state, releasing every blob.
    pub fn reset(&self) {
        self.close_viewer();
        self.region_files.lock().clear();
        self.animations.write().clear();
        self.selection.clear();
        self.search.clear();
        self.playback.reset();
        self.messages.clear();
        self.chats.clear();
        self.files.reset();
        info!("Session state reset");
    }

    /// Revokes parked blobs that neither a region nor the viewer's loaded
    /// window still shows. Returns how many were freed.
    pub fn trim_blobs(&self) -> usize {
        let mut keep: HashSet<FileId> = self
            .region_files
            .lock()
            .values()
            .flat_map(|files| files.iter().copied())
            .collect();
        if let Some(viewer) = self.viewer() {
            keep.extend(
                viewer
                    .window()
                    .items()
                    .iter()
                    .flat_map(|m| m.content().file_ids()),
            );
        }
        let freed = self.files.release_outside(&keep);
        if freed > 0 {
            debug!(freed, "Trimmed parked blobs");
        }
        freed
    }

    /// Focuses the new current item, then extends the window in the
    /// direction of travel without holding up the caller.
    async fn after_navigation(&self, viewer: &Arc<MediaHistoryPaginator>, direction: Direction) {
        self.messages.insert_many(viewer.window().items().iter().cloned());
        self.focus_viewer_item().await;
        self.trim_blobs();

        let viewer = viewer.clone();
        let messages = self.messages.clone();
        tokio::spawn(async move {
            if viewer.prefetch(direction).await > 0 {
                messages.insert_many(viewer.window().items().iter().cloned());
            }
        });
    }

    /// Follows the viewer after a live update changed its window.
    async fn reconcile_viewer(&self, viewer: &MediaHistoryPaginator) {
        if viewer.phase() == HistoryPhase::Closed {
            self.close_viewer();
            return;
        }
        self.focus_viewer_item().await;
    }

    /// Retains and loads the current viewer item's files, releasing the
    /// previous item's.
    async fn focus_viewer_item(&self) {
        let Some(current) = self.viewer().and_then(|viewer| viewer.current()) else {
            return;
        };
        let wanted = current.content().file_ids();
        let previous = std::mem::replace(&mut *self.viewer_files.lock(), wanted.clone());
        for file_id in &wanted {
            self.files.retain(*file_id);
        }
        for file_id in previous {
            self.files.release(file_id);
        }
        self.loader.load_many(wanted).await;
    }

    fn files_for(&self, visible: &VisibilitySet) -> HashSet<FileId> {
        visible
            .iter()
            .flat_map(|key| match key {
                ViewportKey::Message(key) => self
                    .messages
                    .get(key)
                    .map(|m| m.content().file_ids())
                    .unwrap_or_default(),
                ViewportKey::Animation(file_id) => vec![*file_id],
                ViewportKey::PageBlock(_) => Vec::new(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::file_cache::FileEvent;
    use crate::domain::entities::{
        Chat, FileDescriptor, Message, MessageCapabilities, MessageContent, MessageKey,
    };
    use crate::domain::ports::mocks::MockEngine;
    use chrono::Utc;
    use std::time::Duration;

    fn photo(id: i64) -> Message {
        Message::new(
            id,
            1_i64,
            Utc::now(),
            MessageContent::Photo {
                file_id: FileId(i32::try_from(id).unwrap()),
                caption: String::new(),
            },
        )
        .with_capabilities(MessageCapabilities::CAN_BE_FORWARDED)
    }

    fn session_with(ids: &[i64]) -> (Arc<MockEngine>, SessionContext) {
        let engine = Arc::new(MockEngine::with_messages(ids.iter().copied().map(photo).collect()));
        engine.put_file(FileId(10), b"ten");
        engine.put_file(FileId(11), b"eleven");
        engine.put_file(FileId(12), b"twelve");
        let config = SessionConfig {
            history: HistoryConfig {
                page_size: 4,
                ..HistoryConfig::default()
            },
            ..SessionConfig::default()
        };
        let session = SessionContext::new(engine.clone(), config);
        (engine, session)
    }

    #[tokio::test]
    async fn test_open_viewer_loads_and_retains_current_file() {
        let (_, session) = session_with(&[8, 9, 10, 11, 12, 13]);

        assert!(session.open_viewer(ChatId(1), MessageId(10)).await);
        assert_eq!(session.files().ref_count(FileId(10)), 1);
        assert!(session.files().blob(FileId(10)).is_some());
        assert!(session.messages().contains(&MessageKey::new(1_i64, 10_i64)));

        assert_eq!(session.viewer_next().await, Some(MessageId(11)));
        assert_eq!(session.files().ref_count(FileId(10)), 0);
        assert_eq!(session.files().ref_count(FileId(11)), 1);

        session.close_viewer();
        assert_eq!(session.files().ref_count(FileId(11)), 0);
        assert!(session.viewer().is_none());
    }

    #[tokio::test]
    async fn test_viewer_toggles_media_viewer_overlay() {
        let (_, session) = session_with(&[10]);
        assert!(session.open_viewer(ChatId(1), MessageId(10)).await);
        assert!(session.playback().is_overlay_open(Overlay::MediaViewer));

        session.close_viewer();
        assert!(!session.playback().is_overlay_open(Overlay::MediaViewer));
    }

    #[tokio::test]
    async fn test_deleting_whole_history_closes_viewer() {
        let (_, session) = session_with(&[10, 11]);
        session.open_viewer(ChatId(1), MessageId(10)).await;

        session
            .handle_event(&EngineEvent::DeleteMessages {
                chat_id: ChatId(1),
                message_ids: vec![MessageId(10), MessageId(11)],
                is_permanent: true,
            })
            .await;
        assert!(session.viewer().is_none());
        assert!(session.messages().is_empty());
    }

    #[tokio::test]
    async fn test_editing_last_item_to_text_closes_viewer() {
        let (_, session) = session_with(&[10]);
        assert!(session.open_viewer(ChatId(1), MessageId(10)).await);
        assert_eq!(session.files().ref_count(FileId(10)), 1);

        session
            .handle_event(&EngineEvent::MessageContentChanged {
                chat_id: ChatId(1),
                message_id: MessageId(10),
                new_content: MessageContent::Text { text: "no photo".into() },
            })
            .await;
        assert!(session.viewer().is_none());
        assert!(!session.playback().is_overlay_open(Overlay::MediaViewer));
        assert_eq!(session.files().ref_count(FileId(10)), 0);
    }

    #[tokio::test]
    async fn test_deleting_current_item_hands_retention_to_replacement() {
        let (_, session) = session_with(&[10, 11]);
        assert!(session.open_viewer(ChatId(1), MessageId(10)).await);

        session
            .handle_event(&EngineEvent::DeleteMessages {
                chat_id: ChatId(1),
                message_ids: vec![MessageId(10)],
                is_permanent: true,
            })
            .await;
        let viewer = session.viewer().unwrap();
        assert_eq!(viewer.current_id(), Some(MessageId(11)));
        assert_eq!(session.files().ref_count(FileId(10)), 0);
        assert_eq!(session.files().ref_count(FileId(11)), 1);
        assert!(session.files().blob(FileId(11)).is_some());
    }

    #[tokio::test]
    async fn test_new_message_at_newest_boundary_extends_viewer() {
        let (_, session) = session_with(&[10, 11]);
        assert!(session.open_viewer(ChatId(1), MessageId(11)).await);
        let mut events = session.subscribe_viewer().unwrap();

        session
            .handle_event(&EngineEvent::NewMessage { message: photo(12) })
            .await;
        assert_eq!(
            events.drain(),
            vec![HistoryEvent::Changed {
                current: Some(MessageId(11)),
                total_count: 3,
                has_newer: true,
                has_older: true,
            }]
        );
        assert_eq!(session.viewer_next().await, Some(MessageId(12)));
        assert!(session.files().blob(FileId(12)).is_some());
    }

    #[tokio::test]
    async fn test_navigation_returns_before_background_prefetch() {
        let (engine, session) = session_with(&[8, 9, 10, 11, 12, 13]);
        assert!(session.open_viewer(ChatId(1), MessageId(10)).await);
        assert_eq!(session.viewer_next().await, Some(MessageId(11)));

        engine.gate("");
        let moved = tokio::time::timeout(Duration::from_secs(5), session.viewer_next()).await;
        assert_eq!(moved.ok().flatten(), Some(MessageId(12)));

        engine.ungate("");
        let viewer = session.viewer().unwrap();
        for _ in 0..20 {
            if viewer.window().len() > 4 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(viewer.window().items().first().map(Message::id), Some(MessageId(13)));
        assert!(session.messages().contains(&MessageKey::new(1_i64, 13_i64)));
        assert_eq!(viewer.current_id(), Some(MessageId(12)));
    }

    #[tokio::test]
    async fn test_events_update_stores_and_selection() {
        let (_, session) = session_with(&[]);
        session
            .handle_event(&EngineEvent::ChatUpdated {
                chat: Chat::new(1_i64, "chat").with_can_be_reported(true),
            })
            .await;
        session
            .handle_event(&EngineEvent::NewMessage { message: photo(5) })
            .await;
        session.selection().toggle(ChatId(1), MessageId(5));
        assert!(session.selection().can_forward_all());
        assert!(session.selection().can_report_any());

        session
            .handle_event(&EngineEvent::MessageContentChanged {
                chat_id: ChatId(1),
                message_id: MessageId(5),
                new_content: MessageContent::Text { text: "now text".into() },
            })
            .await;
        let stored = session.messages().get(&MessageKey::new(1_i64, 5_i64));
        assert!(stored.is_some_and(|m| !m.content().is_viewer_media()));

        session
            .handle_event(&EngineEvent::DeleteMessages {
                chat_id: ChatId(1),
                message_ids: vec![MessageId(5)],
                is_permanent: true,
            })
            .await;
        assert!(session.selection().snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_visibility_change_retains_and_releases_files() {
        let (_, session) = session_with(&[10, 11, 12]);
        for id in [10, 11, 12] {
            session
                .handle_event(&EngineEvent::NewMessage { message: photo(id) })
                .await;
        }
        let bounds = Arc::new(crate::domain::ports::mocks::FixedBounds::new(
            crate::domain::entities::Viewport::new(0.0, 100.0, 300.0),
            vec![],
        ));
        let region = session.register_region(bounds);
        let key = |id: i64| ViewportKey::Message(MessageKey::new(1_i64, id));
        let mut file_events = session.files().subscribe();

        session
            .on_visibility_changed(&VisibilityChanged {
                region: region.id(),
                visible: [key(10), key(11)].into_iter().collect(),
            })
            .await;
        assert_eq!(session.files().ref_count(FileId(10)), 1);
        assert_eq!(session.files().stats().live_blobs, 2);

        session
            .on_visibility_changed(&VisibilityChanged {
                region: region.id(),
                visible: [key(11), key(12)].into_iter().collect(),
            })
            .await;
        assert_eq!(session.files().ref_count(FileId(10)), 0);
        assert_eq!(session.files().stats().parked_blobs, 1);

        session.forget_region(region.id());
        assert_eq!(session.files().stats().live_blobs, 0);
        assert!(
            file_events
                .drain()
                .iter()
                .any(|e| matches!(e, FileEvent::BlobReady { file_id, .. } if *file_id == FileId(12)))
        );
    }

    #[tokio::test]
    async fn test_saved_animations_register_files() {
        let (engine, session) = session_with(&[]);
        engine.set_animations(vec![SavedAnimation {
            file: FileDescriptor::new(FileId(77), 1024),
            thumbnail: None,
            duration: 3,
        }]);

        assert_eq!(session.load_saved_animations().await.len(), 1);
        assert!(session.files().get(FileId(77)).is_some());
        assert_eq!(session.saved_animations().len(), 1);
    }

    #[tokio::test]
    async fn test_trim_keeps_viewer_window_blobs() {
        let (_, session) = session_with(&[8, 9, 10, 11, 12, 13]);
        assert!(session.open_viewer(ChatId(1), MessageId(10)).await);
        assert_eq!(session.viewer_next().await, Some(MessageId(11)));

        assert_eq!(session.files().stats().parked_blobs, 1);
        assert_eq!(session.trim_blobs(), 0);

        session.close_viewer();
        assert_eq!(session.trim_blobs(), 2);
        assert_eq!(session.files().stats().parked_blobs, 0);
        assert!(session.files().blob(FileId(10)).is_none());
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let (_, session) = session_with(&[10, 11]);
        session.open_viewer(ChatId(1), MessageId(10)).await;
        session.selection().toggle(ChatId(1), MessageId(10));

        session.reset();
        assert!(session.viewer().is_none());
        assert!(session.messages().is_empty());
        assert!(session.selection().snapshot().is_empty());
        assert_eq!(session.files().stats().files, 0);
        assert_eq!(session.media_count(ChatId(1)).await, 2);
    }
}
