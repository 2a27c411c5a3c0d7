//! Change notifications emitted after successful storage mutations.

/// Maximum number of events buffered for slow subscribers.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A committed change to the storage accounting state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageEvent {
    /// A new file reference was registered.
    Uploaded {
        /// ID of the new reference.
        reference_id: String,
        /// Content hash of the upload.
        hash: String,
        /// Content size in bytes.
        size: i64,
        /// Whether the content was already stored.
        deduplicated: bool,
    },
    /// A file reference was removed.
    Deleted {
        /// ID of the removed reference.
        reference_id: String,
        /// Content hash the reference pointed at.
        hash: String,
        /// Whether the stored file went away with it.
        stored_file_removed: bool,
    },
}

impl StorageEvent {
    /// Get string representation of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            StorageEvent::Uploaded { .. } => "uploaded",
            StorageEvent::Deleted { .. } => "deleted",
        }
    }

    /// ID of the reference the event concerns.
    pub fn reference_id(&self) -> &str {
        match self {
            StorageEvent::Uploaded { reference_id, .. } => reference_id,
            StorageEvent::Deleted { reference_id, .. } => reference_id,
        }
    }
}

impl std::fmt::Display for StorageEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind(), self.reference_id())
    }
}
