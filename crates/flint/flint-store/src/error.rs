//! Error taxonomy for the parameter store.
//!
//! Every operation surfaces its failure synchronously to the caller;
//! nothing is retried internally. A test harness calling `get` before
//! `create` ever ran gets `NotFound`, a harness holding a handle to a
//! destroyed segment gets `SegmentUnavailable`.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The handle directory has no row: `create` was never run.
    #[error("no segment handle registered (params create has not run)")]
    NotFound,

    /// The registered handle no longer names a live parameter segment
    /// (destroyed, or the file is not a parameter segment at all).
    #[error("segment {handle:#018x} is unavailable (destroyed or stale handle)")]
    SegmentUnavailable { handle: u64 },

    /// The platform could not map a segment that does exist.
    #[error("failed to attach segment {handle:#018x}")]
    AttachFailure {
        handle: u64,
        #[source]
        source: io::Error,
    },

    /// Allocating or initializing a new segment failed.
    #[error("failed to create segment {handle:#018x}")]
    CreateFailure {
        handle: u64,
        #[source]
        source: io::Error,
    },

    /// The durable handle row could not be read or written.
    #[error("handle directory I/O failed at '{path}'")]
    Directory {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The durable handle row exists but does not parse, or holds the
    /// reserved zero handle. The store was used outside its intended
    /// lifecycle.
    #[error("handle directory row is corrupt: {reason}")]
    DirectoryCorrupt { reason: &'static str },
}
