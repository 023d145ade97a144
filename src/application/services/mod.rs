//! Stateful services behind the media pipeline.

pub mod file_cache;
pub mod file_loader;
pub mod media_history;
pub mod message_search;
pub mod operation_token;
pub mod playback_coordinator;
pub mod selection;
pub mod stores;
pub mod visibility_tracker;

pub use file_cache::{FileCache, FileCacheStats, FileEvent};
pub use file_loader::FileLoader;
pub use media_history::{
    Direction, HistoryConfig, HistoryEvent, HistoryPhase, HistoryWindow, MediaHistoryPaginator,
    ReplacementPolicy,
};
pub use message_search::{MessageSearch, SearchResults};
pub use operation_token::{OperationToken, Ticket};
pub use playback_coordinator::{
    Blocker, Overlay, PlaybackConfig, PlaybackContext, PlaybackCoordinator, PlaybackHandle,
    PlaybackInputs, SubjectId, SubjectOptions,
};
pub use selection::{MessageSelection, SelectionChanged, SelectionSet};
pub use stores::{ChatStore, MessageStore};
pub use visibility_tracker::{
    RegionId, RegionRegistration, ScrollOutcome, VisibilityChanged, VisibilityConfig,
    VisibilityTracker, compute_visible_keys,
};
