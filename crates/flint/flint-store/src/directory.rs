//! Durable handle directory.
//!
//! A segment handle is worthless if nobody can find it: worker
//! processes start at arbitrary times, share no ancestry with the test
//! driver, and cannot be signaled directly. The directory is the one
//! piece of state that outlives every process — a single durable row
//! mapping a well-known name to the current segment handle. It is
//! written once per `create` (overwritten on re-create, never a second
//! row) and read once per process, after which the handle is cached
//! for the process lifetime.

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::num::NonZeroU64;
use std::path::{Path, PathBuf};

/// Identifier naming one live parameter segment.
///
/// Zero is reserved: the original per-process cache used handle 0 as
/// "not resolved yet", so a registered handle is non-zero by
/// construction.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SegmentHandle(NonZeroU64);

impl SegmentHandle {
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

/// The durable single-row store behind segment discovery.
///
/// `register` must be atomic from a reader's point of view: a reader
/// either sees the previous handle or the new one, never a torn row.
/// Unit-of-work concerns stay entirely inside implementations.
pub trait HandleDirectory {
    /// Persist `handle` as the current value, overwriting any existing
    /// row. Durable and visible to other processes once this returns.
    fn register(&self, handle: SegmentHandle) -> Result<(), StoreError>;

    /// Read the currently persisted handle. `NotFound` if no row was
    /// ever registered. A process that just called `register` must see
    /// its own write.
    fn load(&self) -> Result<SegmentHandle, StoreError>;
}

/// On-disk shape of the row.
#[derive(Debug, Serialize, Deserialize)]
struct HandleRow {
    handle: u64,
}

/// File-backed directory: one tiny TOML file holding the row.
///
/// The commit protocol is write-temp, fsync, rename. Rename is atomic
/// on POSIX filesystems, which gives readers the row-level atomicity
/// the trait demands and makes a crash mid-register leave either the
/// old row or the new one, never garbage.
pub struct FileDirectory {
    path: PathBuf,
}

impl FileDirectory {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: io::Error) -> StoreError {
        StoreError::Directory {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl HandleDirectory for FileDirectory {
    fn register(&self, handle: SegmentHandle) -> Result<(), StoreError> {
        let row = HandleRow {
            handle: handle.get(),
        };
        // A u64 row always serializes; no error path worth surfacing.
        let body = toml::to_string(&row).unwrap_or_default();

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, body).map_err(|e| self.io_err(e))?;

        // Make the temp file durable before it can be renamed over the
        // live row; otherwise a crash could commit an empty row.
        let f = fs::File::open(&tmp).map_err(|e| self.io_err(e))?;
        f.sync_all().map_err(|e| self.io_err(e))?;
        drop(f);

        fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))?;
        Ok(())
    }

    fn load(&self) -> Result<SegmentHandle, StoreError> {
        let body = match fs::read_to_string(&self.path) {
            Ok(body) => body,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(StoreError::NotFound),
            Err(e) => return Err(self.io_err(e)),
        };

        let row: HandleRow = toml::from_str(&body)
            .map_err(|_| StoreError::DirectoryCorrupt {
                reason: "row does not parse as TOML",
            })?;

        SegmentHandle::new(row.handle).ok_or(StoreError::DirectoryCorrupt {
            reason: "row holds the reserved zero handle",
        })
    }
}
