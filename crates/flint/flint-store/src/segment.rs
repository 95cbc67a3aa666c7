//! Segment lifecycle and per-process attach discipline.
//!
//! A parameter segment is a file of exactly one `SharedRecord` in the
//! runtime directory, named by its handle. Attaching is an open + map
//! of that file; the file outlives its creator, so the segment is
//! "pinned" by construction, and unlinking it is the unpin: processes
//! that already hold a mapping keep working, while any later attach
//! fails with `SegmentUnavailable`.
//!
//! Every logical operation performs its own attach/detach pair. The
//! mapping is never held across calls (except the creator's own pin),
//! so a process that crashes mid-operation leaves nothing behind that
//! the kernel does not reclaim on exit.

use crate::directory::{HandleDirectory, SegmentHandle};
use crate::error::StoreError;
use crate::layout::{ParamSet, RECORD_MAGIC, RECORD_VERSION, SharedRecord, bytes_for_record};
use crate::spinlock::{ShmLock, SpinLock};
use flint_mmap::ShmFile;
use std::cell::UnsafeCell;
use std::io;
use std::path::{Path, PathBuf};
use std::ptr;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Whether this backend can unpin (reclaim) a segment on destroy.
///
/// The file backend always can: destroy unlinks the segment file. Kept
/// as an explicit capability so callers and tests assert the behavior
/// they actually get instead of assuming it per platform.
pub const UNPIN_SUPPORTED: bool = true;

/// File naming a segment inside the runtime directory.
pub(crate) fn segment_path(runtime_dir: &Path, handle: SegmentHandle) -> PathBuf {
    runtime_dir.join(format!("params-{:016x}.seg", handle.get()))
}

/// Picks a fresh non-zero handle for a new segment.
///
/// Clock nanos mixed with the pid: two creators racing in the same
/// nanosecond are not a case this test-only store guards against.
pub(crate) fn allocate_handle() -> SegmentHandle {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(1);
    let pid = u64::from(std::process::id());
    let raw = (nanos ^ pid.rotate_left(40)) | 1;
    SegmentHandle::new(raw).expect("raw | 1 is non-zero")
}

/// Allocates and initializes a new segment, returning the creator's
/// own mapping so the caller can keep it pinned.
///
/// The record is fully written and flushed before this returns; only
/// then may the handle be registered, so no reader can ever resolve a
/// handle to an uninitialized segment.
pub(crate) fn create_segment(
    runtime_dir: &Path,
    handle: SegmentHandle,
) -> Result<ShmFile, StoreError> {
    let path = segment_path(runtime_dir, handle);
    let create_err = |source: io::Error| StoreError::CreateFailure {
        handle: handle.get(),
        source,
    };

    let mut mm = ShmFile::create_rw(&path, bytes_for_record() as u64).map_err(create_err)?;

    // SAFETY: the mapping was just created sized for one SharedRecord
    // and no other process can resolve the handle before it is
    // registered, so this process has sole access.
    unsafe {
        let record = mm.as_mut_ptr() as *mut SharedRecord;
        ptr::write(
            record,
            SharedRecord {
                magic: RECORD_MAGIC,
                version: RECORD_VERSION,
                lock: SpinLock::unlocked(),
                params: UnsafeCell::new(ParamSet::default()),
            },
        );
        (*record).lock.init();
    }

    mm.flush().map_err(create_err)?;

    debug!(handle = format_args!("{:#018x}", handle.get()), path = %path.display(), "segment created");
    Ok(mm)
}

/// A segment currently mapped into this process.
///
/// Dropping it is the detach. One attach/detach pair per logical
/// operation; nothing here is held across calls.
pub struct AttachedSegment {
    /// Owns the mapping lifetime; the record pointer below is valid
    /// exactly as long as this field lives.
    _mm: ShmFile,
    record: *const SharedRecord,
}

impl AttachedSegment {
    /// Maps the segment named by `handle` and validates the record.
    ///
    /// A missing file means the handle is stale (destroyed or never
    /// created) and surfaces as `SegmentUnavailable`; any other mapping
    /// failure is an `AttachFailure`.
    pub(crate) fn attach(
        runtime_dir: &Path,
        handle: SegmentHandle,
    ) -> Result<Self, StoreError> {
        let path = segment_path(runtime_dir, handle);

        let mut mm = match ShmFile::open_rw(&path) {
            Ok(mm) => mm,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::SegmentUnavailable {
                    handle: handle.get(),
                });
            }
            Err(e) => {
                return Err(StoreError::AttachFailure {
                    handle: handle.get(),
                    source: e,
                });
            }
        };

        if mm.len() < bytes_for_record() {
            return Err(StoreError::SegmentUnavailable {
                handle: handle.get(),
            });
        }

        let record = mm.as_mut_ptr() as *const SharedRecord;

        // SAFETY: the region is at least one record long; validate()
        // only reads the plain header words.
        if let Err(reason) = unsafe { (*record).validate() } {
            debug!(
                handle = format_args!("{:#018x}", handle.get()),
                reason, "attach rejected"
            );
            return Err(StoreError::SegmentUnavailable {
                handle: handle.get(),
            });
        }

        Ok(Self { _mm: mm, record })
    }

    /// The shared record. Mutation of `params` goes through the
    /// embedded lock and the record's `UnsafeCell`.
    #[inline]
    pub fn record(&self) -> &SharedRecord {
        // SAFETY: record points into _mm, which is alive as long as
        // self; validate() accepted it at attach time.
        unsafe { &*self.record }
    }
}

/// Per-process segment resolution state.
///
/// Lives inside the process-scoped store context (never a global).
/// The handle is resolved from the directory once and cached for the
/// remainder of the process; under normal operation it does not change
/// within a process lifetime.
pub struct SegmentAccessor<D: HandleDirectory> {
    directory: D,
    runtime_dir: PathBuf,
    cached: Option<SegmentHandle>,
}

impl<D: HandleDirectory> SegmentAccessor<D> {
    pub fn new<P: Into<PathBuf>>(runtime_dir: P, directory: D) -> Self {
        Self {
            directory,
            runtime_dir: runtime_dir.into(),
            cached: None,
        }
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub(crate) fn runtime_dir(&self) -> &Path {
        &self.runtime_dir
    }

    /// Installs a handle this process just created and registered,
    /// so its own subsequent operations skip the directory read.
    pub(crate) fn cache(&mut self, handle: SegmentHandle) {
        self.cached = Some(handle);
    }

    /// The cached handle, loading it from the directory on first use.
    pub fn resolve(&mut self) -> Result<SegmentHandle, StoreError> {
        if let Some(handle) = self.cached {
            return Ok(handle);
        }
        let handle = self.directory.load()?;
        debug!(
            handle = format_args!("{:#018x}", handle.get()),
            "handle resolved"
        );
        self.cached = Some(handle);
        Ok(handle)
    }

    /// Resolve + attach. The returned guard detaches on drop.
    pub fn open(&mut self) -> Result<AttachedSegment, StoreError> {
        let handle = self.resolve()?;
        AttachedSegment::attach(&self.runtime_dir, handle)
    }
}
