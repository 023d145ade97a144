//! Downloads file content through the engine into the [`FileCache`].

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::domain::entities::{Blob, FileId};
use crate::domain::errors::EngineError;
use crate::domain::ports::EnginePort;

use super::file_cache::FileCache;

/// Fetches blobs on demand, deduplicating concurrent requests per file.
pub struct FileLoader {
    engine: Arc<dyn EnginePort>,
    cache: Arc<FileCache>,
    pending: Mutex<HashSet<FileId>>,
}

impl std::fmt::Debug for FileLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLoader")
            .field("pending", &self.pending.lock().len())
            .finish_non_exhaustive()
    }
}

impl FileLoader {
    /// Creates a loader writing into `cache`.
    #[must_use]
    pub fn new(engine: Arc<dyn EnginePort>, cache: Arc<FileCache>) -> Self {
        Self {
            engine,
            cache,
            pending: Mutex::new(HashSet::new()),
        }
    }

    /// Returns the blob for `file_id`, downloading it if needed.
    ///
    /// Yields `None` when another call is already fetching the file (its
    /// result arrives as a `BlobReady` event) or when the download fails;
    /// failures are recorded on the descriptor, never raised.
    pub async fn load(&self, file_id: FileId) -> Option<Blob> {
        if let Some(blob) = self.cache.blob(file_id) {
            return Some(blob);
        }

        if !self.pending.lock().insert(file_id) {
            debug!(file_id = %file_id, "Download already in flight");
            return None;
        }

        self.cache.mark_downloading(file_id);
        let result = self.fetch(file_id).await;
        self.pending.lock().remove(&file_id);

        match result {
            Ok(bytes) => Some(self.cache.attach_blob(file_id, bytes)),
            Err(e) => {
                warn!(file_id = %file_id, error = %e, "File download failed");
                self.cache.mark_failed(file_id);
                None
            }
        }
    }

    /// Loads several files concurrently, returning those that became ready.
    pub async fn load_many(&self, file_ids: impl IntoIterator<Item = FileId>) -> Vec<Blob> {
        join_all(file_ids.into_iter().map(|id| self.load(id)))
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Returns true while `file_id` is being fetched.
    #[must_use]
    pub fn is_loading(&self, file_id: FileId) -> bool {
        self.pending.lock().contains(&file_id)
    }

    /// Number of downloads in flight.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    async fn fetch(&self, file_id: FileId) -> Result<Bytes, EngineError> {
        let descriptor = self.engine.download_file(file_id).await?;
        self.cache.upsert(descriptor);
        self.engine.read_file(file_id).await
    }
}
