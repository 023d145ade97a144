//! In-memory file metadata and blob cache.
//!
//! Descriptors are kept for the whole session. Blob content is reference
//! counted: while any consumer retains a file its blob stays live; once the
//! count drops to zero the blob is parked in a bounded LRU pool and revoked
//! when it falls out of the pool or is explicitly released.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;

use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::domain::entities::{Blob, FileDescriptor, FileId};
use crate::domain::signal::{Signal, Subscription};

/// Default number of unreferenced blobs kept around for quick reuse.
pub const DEFAULT_PARKED_CAPACITY: usize = 32;

/// Change notifications emitted by the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    /// Descriptor metadata or progress changed.
    Updated(FileId),
    /// Content is available under `url`.
    BlobReady { file_id: FileId, url: String },
    /// The handle `url` was freed and must no longer be referenced.
    BlobRevoked { file_id: FileId, url: String },
}

struct CacheState {
    files: HashMap<FileId, FileDescriptor>,
    refs: HashMap<FileId, usize>,
    live: HashMap<FileId, Blob>,
    parked: LruCache<FileId, Blob>,
}

impl CacheState {
    fn park(&mut self, file_id: FileId, blob: Blob, revoked: &mut Vec<(FileId, Blob)>) {
        if let Some((evicted_id, evicted)) = self.parked.push(file_id, blob) {
            revoked.push((evicted_id, evicted));
        }
    }
}

/// Session-scoped cache of file descriptors and downloaded content.
pub struct FileCache {
    state: Mutex<CacheState>,
    events: Signal<FileEvent>,
}

impl FileCache {
    /// Creates a cache parking at most `parked_capacity` unreferenced blobs.
    #[must_use]
    pub fn new(parked_capacity: usize) -> Self {
        let cap = NonZeroUsize::new(parked_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CacheState {
                files: HashMap::new(),
                refs: HashMap::new(),
                live: HashMap::new(),
                parked: LruCache::new(cap),
            }),
            events: Signal::new(),
        }
    }

    /// Subscribes to cache change notifications.
    pub fn subscribe(&self) -> Subscription<FileEvent> {
        self.events.subscribe()
    }

    /// Returns the descriptor for `file_id`, if the file has been seen.
    #[must_use]
    pub fn get(&self, file_id: FileId) -> Option<FileDescriptor> {
        self.state.lock().files.get(&file_id).cloned()
    }

    /// Merges an engine-reported descriptor into the cache.
    ///
    /// Returns true and notifies subscribers only if the stored value
    /// actually changed. A failure flag survives updates that do not show a
    /// new download attempt or completion.
    pub fn upsert(&self, descriptor: FileDescriptor) -> bool {
        let file_id = descriptor.id;
        let changed = {
            let mut state = self.state.lock();
            let mut merged = descriptor;
            if let Some(old) = state.files.get(&file_id) {
                merged.local.failed = merged.local.failed
                    || (old.local.failed && !merged.local.downloading && !merged.local.completed);
                if *old == merged {
                    false
                } else {
                    state.files.insert(file_id, merged);
                    true
                }
            } else {
                state.files.insert(file_id, merged);
                true
            }
        };

        if changed {
            trace!(file_id = %file_id, "File descriptor updated");
            self.events.emit(FileEvent::Updated(file_id));
        } else {
            trace!(file_id = %file_id, "Ignoring identical file update");
        }
        changed
    }

    /// Records that a download of `file_id` has started.
    pub fn mark_downloading(&self, file_id: FileId) {
        let mut descriptor = self
            .get(file_id)
            .unwrap_or_else(|| FileDescriptor::new(file_id, 0));
        descriptor.local.downloading = true;
        descriptor.local.failed = false;
        self.upsert(descriptor);
    }

    /// Records a failed download as descriptor state.
    pub fn mark_failed(&self, file_id: FileId) {
        let mut descriptor = self
            .get(file_id)
            .unwrap_or_else(|| FileDescriptor::new(file_id, 0));
        descriptor.local.downloading = false;
        descriptor.local.completed = false;
        descriptor.local.failed = true;
        self.upsert(descriptor);
    }

    /// Attaches downloaded content and announces it as ready.
    ///
    /// Replaces (and revokes) any blob previously held for the file.
    pub fn attach_blob(&self, file_id: FileId, bytes: Bytes) -> Blob {
        let blob = Blob::new(bytes);
        let mut revoked = Vec::new();
        {
            let mut state = self.state.lock();
            if let Some(old) = state.live.remove(&file_id) {
                revoked.push((file_id, old));
            }
            if let Some(old) = state.parked.pop(&file_id) {
                revoked.push((file_id, old));
            }

            if state.refs.get(&file_id).copied().unwrap_or(0) > 0 {
                state.live.insert(file_id, blob.clone());
            } else {
                state.park(file_id, blob.clone(), &mut revoked);
            }
        }

        debug!(file_id = %file_id, url = blob.url(), bytes = blob.len(), "Blob attached");
        self.emit_revoked(revoked);
        self.events.emit(FileEvent::BlobReady {
            file_id,
            url: blob.url().to_string(),
        });
        blob
    }

    /// Returns the blob for `file_id`, if content is held.
    #[must_use]
    pub fn blob(&self, file_id: FileId) -> Option<Blob> {
        let mut state = self.state.lock();
        if let Some(blob) = state.live.get(&file_id) {
            return Some(blob.clone());
        }
        state.parked.get(&file_id).cloned()
    }

    /// Registers one more consumer of `file_id`'s content.
    pub fn retain(&self, file_id: FileId) {
        let mut state = self.state.lock();
        let first = {
            let count = state.refs.entry(file_id).or_insert(0);
            *count += 1;
            *count == 1
        };
        if first && let Some(blob) = state.parked.pop(&file_id) {
            state.live.insert(file_id, blob);
        }
    }

    /// Drops one consumer of `file_id`; the last one parks the blob.
    pub fn release(&self, file_id: FileId) {
        let mut revoked = Vec::new();
        {
            let mut state = self.state.lock();
            let Some(count) = state.refs.get_mut(&file_id) else {
                return;
            };
            *count = count.saturating_sub(1);
            if *count > 0 {
                return;
            }
            state.refs.remove(&file_id);
            if let Some(blob) = state.live.remove(&file_id) {
                state.park(file_id, blob, &mut revoked);
            }
        }
        self.emit_revoked(revoked);
    }

    /// Frees the blob for `file_id` immediately, whatever its references.
    pub fn release_blob(&self, file_id: FileId) {
        let mut revoked = Vec::new();
        {
            let mut state = self.state.lock();
            state.refs.remove(&file_id);
            if let Some(blob) = state.live.remove(&file_id) {
                revoked.push((file_id, blob));
            }
            if let Some(blob) = state.parked.pop(&file_id) {
                revoked.push((file_id, blob));
            }
        }
        self.emit_revoked(revoked);
    }

    /// Revokes every parked blob not named in `keep`.
    ///
    /// Returns how many blobs were freed.
    pub fn release_outside(&self, keep: &HashSet<FileId>) -> usize {
        let revoked: Vec<(FileId, Blob)> = {
            let mut state = self.state.lock();
            let stale: Vec<FileId> = state
                .parked
                .iter()
                .map(|(id, _)| *id)
                .filter(|id| !keep.contains(id))
                .collect();
            stale
                .into_iter()
                .filter_map(|id| state.parked.pop(&id).map(|blob| (id, blob)))
                .collect()
        };
        let count = revoked.len();
        self.emit_revoked(revoked);
        count
    }

    /// Number of consumers currently holding `file_id`.
    #[must_use]
    pub fn ref_count(&self, file_id: FileId) -> usize {
        self.state.lock().refs.get(&file_id).copied().unwrap_or(0)
    }

    /// Returns cache statistics.
    #[must_use]
    pub fn stats(&self) -> FileCacheStats {
        let state = self.state.lock();
        let blob_bytes = state
            .live
            .values()
            .chain(state.parked.iter().map(|(_, blob)| blob))
            .map(Blob::len)
            .sum();
        FileCacheStats {
            files: state.files.len(),
            live_blobs: state.live.len(),
            parked_blobs: state.parked.len(),
            blob_bytes,
        }
    }

    /// Drops everything, revoking every blob. Used on session teardown.
    pub fn reset(&self) {
        let revoked: Vec<(FileId, Blob)> = {
            let mut state = self.state.lock();
            state.files.clear();
            state.refs.clear();
            let mut revoked: Vec<_> = state.live.drain().collect();
            while let Some(entry) = state.parked.pop_lru() {
                revoked.push(entry);
            }
            revoked
        };
        debug!(revoked = revoked.len(), "File cache reset");
        self.emit_revoked(revoked);
    }

    fn emit_revoked(&self, revoked: Vec<(FileId, Blob)>) {
        for (file_id, blob) in revoked {
            debug!(file_id = %file_id, url = blob.url(), "Blob revoked");
            self.events.emit(FileEvent::BlobRevoked {
                file_id,
                url: blob.url().to_string(),
            });
        }
    }
}

impl Default for FileCache {
    fn default() -> Self {
        Self::new(DEFAULT_PARKED_CAPACITY)
    }
}

/// Snapshot of cache occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileCacheStats {
    /// Known descriptors.
    pub files: usize,
    /// Blobs with at least one consumer.
    pub live_blobs: usize,
    /// Unreferenced blobs awaiting reuse or eviction.
    pub parked_blobs: usize,
    /// Total content size held.
    pub blob_bytes: usize,
}

impl std::fmt::Display for FileCacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Files: {} descriptors, {} live blobs, {} parked blobs, {} bytes",
            self.files, self.live_blobs, self.parked_blobs, self.blob_bytes
        )
    }
}
