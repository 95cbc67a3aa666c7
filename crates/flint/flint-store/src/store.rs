//! The parameter operations.
//!
//! `ParamStore` is the explicit process-scoped context: each process
//! constructs one and calls operations on it. Every read or write is
//! self-contained — resolve the handle (cached after the first call),
//! attach, take the lock for a copy or a single field store, release,
//! detach — so the very first call in a freshly started worker process
//! needs no prior handshake with the creator.

use crate::directory::{FileDirectory, HandleDirectory};
use crate::error::StoreError;
use crate::layout::ParamSet;
use crate::segment::{self, SegmentAccessor, UNPIN_SUPPORTED};
use crate::spinlock::ShmLock;
use flint_mmap::ShmFile;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

pub struct ParamStore<D: HandleDirectory = FileDirectory> {
    accessor: SegmentAccessor<D>,
    /// The creator's own mapping, held for the life of this context so
    /// the segment stays mapped in the creating process.
    pinned: Option<ShmFile>,
}

impl ParamStore<FileDirectory> {
    /// Store backed by the file directory: segments live under
    /// `runtime_dir`, the handle row at `directory_file`.
    pub fn open<P, Q>(runtime_dir: P, directory_file: Q) -> Self
    where
        P: Into<PathBuf>,
        Q: Into<PathBuf>,
    {
        Self::with_directory(runtime_dir, FileDirectory::new(directory_file.into()))
    }
}

impl<D: HandleDirectory> ParamStore<D> {
    /// Store over any directory implementation; the injection seam for
    /// swapping the durable backend.
    pub fn with_directory<P: Into<PathBuf>>(runtime_dir: P, directory: D) -> Self {
        Self {
            accessor: SegmentAccessor::new(runtime_dir, directory),
            pinned: None,
        }
    }

    /// Allocate a fresh zero-initialized segment and publish its
    /// handle.
    ///
    /// The segment is fully initialized before the handle is
    /// registered, so no concurrent reader can observe a handle to an
    /// uninitialized record. Calling this on a store that already
    /// created a segment simply creates and registers a new one,
    /// orphaning the old segment — tolerated, this is test-only
    /// lifecycle code.
    pub fn create(&mut self) -> Result<(), StoreError> {
        let handle = segment::allocate_handle();
        let mapping = segment::create_segment(self.accessor.runtime_dir(), handle)?;

        self.accessor.directory().register(handle)?;
        self.accessor.cache(handle);
        self.pinned = Some(mapping);

        debug!(
            handle = format_args!("{:#018x}", handle.get()),
            "parameter segment registered"
        );
        Ok(())
    }

    /// Release the segment so it is reclaimed once nobody maps it.
    ///
    /// The directory row is left in place on purpose: a stale handle
    /// surfaces as `SegmentUnavailable` on the next attach, which is
    /// the signal that `create` must run again. Unlink failures are
    /// logged and swallowed; destruction is test teardown, not a
    /// production path.
    pub fn destroy(&mut self) -> Result<(), StoreError> {
        let handle = self.accessor.resolve()?;
        self.pinned = None;

        if UNPIN_SUPPORTED {
            let path = segment::segment_path(self.accessor.runtime_dir(), handle);
            if let Err(e) = fs::remove_file(&path) {
                warn!(
                    handle = format_args!("{:#018x}", handle.get()),
                    error = %e,
                    "could not unpin segment"
                );
            }
        }
        Ok(())
    }

    /// Point-in-time snapshot of the parameters. The whole record is
    /// copied out under the lock, so the two fields are always from
    /// the same write history — never a torn read.
    pub fn get(&mut self) -> Result<ParamSet, StoreError> {
        let seg = self.accessor.open()?;
        let record = seg.record();

        record.lock.acquire();
        // SAFETY: the lock is held; no other process writes params.
        let snapshot = unsafe { *record.params.get() };
        record.lock.release();

        Ok(snapshot)
    }

    /// Set the mock clock. 0 restores "not mocked".
    pub fn set_current_time(&mut self, value: i64) -> Result<(), StoreError> {
        let seg = self.accessor.open()?;
        let record = seg.record();

        record.lock.acquire();
        // SAFETY: the lock is held; single field store.
        unsafe { (*record.params.get()).current_time = value };
        record.lock.release();

        Ok(())
    }

    /// Convenience: back to real time.
    pub fn reset_time(&mut self) -> Result<(), StoreError> {
        self.set_current_time(0)
    }

    /// Instruct wait-like operations to skip their real delay.
    pub fn set_mock_wait_immediately(&mut self, value: bool) -> Result<(), StoreError> {
        let seg = self.accessor.open()?;
        let record = seg.record();

        record.lock.acquire();
        // SAFETY: the lock is held; single field store.
        unsafe { (*record.params.get()).mock_wait_returns_immediately = value };
        record.lock.release();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    /// Fresh runtime dir per test; pid keeps parallel `cargo test`
    /// invocations apart, the tag keeps tests in one run apart.
    fn test_dir(tag: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("flint_store_{}_{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn store_at(dir: &Path) -> ParamStore {
        ParamStore::open(dir, dir.join("handle.toml"))
    }

    #[test]
    fn get_before_create_is_not_found() {
        let dir = test_dir("no_create");
        let mut store = store_at(&dir);

        assert!(matches!(store.get(), Err(StoreError::NotFound)));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn create_then_get_returns_defaults() {
        let dir = test_dir("defaults");
        let mut store = store_at(&dir);

        store.create().unwrap();
        let params = store.get().unwrap();
        assert_eq!(params.current_time, 0);
        assert!(!params.mock_wait_returns_immediately);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn set_then_get_round_trips() {
        let dir = test_dir("roundtrip");
        let mut store = store_at(&dir);

        store.create().unwrap();
        store.set_current_time(1234).unwrap();
        store.set_mock_wait_immediately(true).unwrap();

        let params = store.get().unwrap();
        assert_eq!(params.current_time, 1234);
        assert!(params.mock_wait_returns_immediately);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn reset_time_restores_zero() {
        let dir = test_dir("reset");
        let mut store = store_at(&dir);

        store.create().unwrap();
        store.set_current_time(42).unwrap();
        store.reset_time().unwrap();
        assert_eq!(store.get().unwrap().current_time, 0);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn repeated_gets_are_idempotent() {
        let dir = test_dir("idempotent");
        let mut store = store_at(&dir);

        store.create().unwrap();
        store.set_current_time(-7).unwrap();

        let first = store.get().unwrap();
        for _ in 0..10 {
            assert_eq!(store.get().unwrap(), first);
        }

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn second_process_context_discovers_segment() {
        let dir = test_dir("discover");
        let mut driver = store_at(&dir);

        driver.create().unwrap();
        driver.set_current_time(99).unwrap();

        // A worker that did not create anything resolves the handle
        // from the directory alone.
        let mut worker = store_at(&dir);
        assert_eq!(worker.get().unwrap().current_time, 99);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn destroy_makes_fresh_contexts_fail() {
        let dir = test_dir("destroy");
        let mut driver = store_at(&dir);

        driver.create().unwrap();
        driver.destroy().unwrap();

        // File backend can unpin, so the segment is really gone for a
        // context that never attached.
        assert!(UNPIN_SUPPORTED);
        let mut late_worker = store_at(&dir);
        assert!(matches!(
            late_worker.get(),
            Err(StoreError::SegmentUnavailable { .. })
        ));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn destroy_before_create_is_not_found() {
        let dir = test_dir("destroy_early");
        let mut store = store_at(&dir);

        assert!(matches!(store.destroy(), Err(StoreError::NotFound)));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn double_create_re_registers_newest_segment() {
        let dir = test_dir("double_create");
        let mut driver = store_at(&dir);

        driver.create().unwrap();
        driver.set_current_time(1).unwrap();

        // Second create orphans the first segment and resets values.
        driver.create().unwrap();
        assert_eq!(driver.get().unwrap().current_time, 0);

        // A fresh context follows the newest handle.
        let mut worker = store_at(&dir);
        assert_eq!(worker.get().unwrap().current_time, 0);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn cached_handle_is_never_re_resolved() {
        let dir = test_dir("cached");
        let mut driver = store_at(&dir);

        driver.create().unwrap();
        driver.set_current_time(7).unwrap();

        // Worker resolves once...
        let mut worker = store_at(&dir);
        assert_eq!(worker.get().unwrap().current_time, 7);

        // ...then the driver re-creates. The worker keeps its cached
        // handle for its whole life and still reads the old (orphaned)
        // segment, untouched by writes to the new one.
        driver.create().unwrap();
        driver.set_current_time(8).unwrap();
        assert_eq!(worker.get().unwrap().current_time, 7);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn values_reset_on_re_create() {
        let dir = test_dir("values_reset");
        let mut driver = store_at(&dir);

        driver.create().unwrap();
        driver.set_mock_wait_immediately(true).unwrap();
        driver.destroy().unwrap();

        // Only the handle row is durable; a new segment starts from
        // the documented defaults.
        driver.create().unwrap();
        let params = driver.get().unwrap();
        assert_eq!(params, ParamSet::default());

        let _ = fs::remove_dir_all(&dir);
    }
}
