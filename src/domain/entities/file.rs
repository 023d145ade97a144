use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Engine-assigned file identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(pub i32);

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for FileId {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

/// Download progress of a file on this device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct LocalFileState {
    pub downloading: bool,
    pub downloaded_size: u64,
    pub completed: bool,
    /// Set when the last download attempt failed.
    #[serde(default)]
    pub failed: bool,
}

/// Upload progress of a file to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct RemoteFileState {
    pub uploading: bool,
    pub uploaded_size: u64,
    pub completed: bool,
}

/// File metadata as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct FileDescriptor {
    pub id: FileId,
    pub size: u64,
    #[serde(default)]
    pub local: LocalFileState,
    #[serde(default)]
    pub remote: RemoteFileState,
}

impl FileDescriptor {
    /// Creates a descriptor for a file nothing is known about yet.
    #[must_use]
    pub fn new(id: impl Into<FileId>, size: u64) -> Self {
        Self {
            id: id.into(),
            size,
            local: LocalFileState::default(),
            remote: RemoteFileState::default(),
        }
    }

    /// Returns true once the content is fully on this device.
    #[must_use]
    pub const fn is_downloaded(&self) -> bool {
        self.local.completed
    }

    /// Returns true while a transfer in either direction is running.
    #[must_use]
    pub const fn is_transferring(&self) -> bool {
        self.local.downloading || self.remote.uploading
    }

    /// Download progress in `0.0..=1.0`, zero for files of unknown size.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn download_progress(&self) -> f64 {
        if self.local.completed {
            return 1.0;
        }
        if self.size == 0 {
            return 0.0;
        }
        (self.local.downloaded_size as f64 / self.size as f64).min(1.0)
    }
}

/// Entry of the user's saved animations list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedAnimation {
    /// The animation file.
    pub file: FileDescriptor,
    /// Static preview, if the engine has one.
    #[serde(default)]
    pub thumbnail: Option<FileId>,
    /// Duration in seconds.
    #[serde(default)]
    pub duration: u32,
}

/// Revocable in-memory handle to downloaded content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    url: String,
    bytes: Bytes,
}

impl Blob {
    /// Wraps content under a freshly minted `blob:` handle.
    #[must_use]
    pub fn new(bytes: Bytes) -> Self {
        Self {
            url: format!("blob:{}", uuid::Uuid::new_v4()),
            bytes,
        }
    }

    /// Opaque handle renderers reference the content by.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The content itself.
    #[must_use]
    pub const fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Content size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true for zero-length content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
