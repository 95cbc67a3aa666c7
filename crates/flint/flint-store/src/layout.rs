//! Shared memory layout of the parameter record.
//!
//! Exactly one record lives at offset 0 of a parameter segment. The
//! layout must be identical in every process that maps the segment, at
//! whatever virtual address, so everything here is `#[repr(C)]`, fixed
//! size, and free of internal pointers.
//!
//! # Memory Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      SharedRecord                        │
//! │  ┌──────────┬──────────┬──────────┬───────────────────┐  │
//! │  │  magic   │ version  │  lock    │  params           │  │
//! │  │  (8B)    │  (8B)    │  (4B+pad)│  (ParamSet, 16B)  │  │
//! │  └──────────┴──────────┴──────────┴───────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The magic/version header is what makes a stale handle *detectable*:
//! attaching a file that was never a parameter segment, or one written
//! by an incompatible build, fails validation instead of being silently
//! mis-read.

use crate::spinlock::{ShmLock, SpinLock};
use std::cell::UnsafeCell;
use std::mem::size_of;

/// Magic number identifying a parameter segment.
///
/// ASCII encoding of "FLINTPRM":
/// `0x464C_494E_5450_524D` = "FLINTPRM"
pub const RECORD_MAGIC: u64 = 0x464C_494E_5450_524D;

/// Current record format version. Bump on incompatible layout changes;
/// attach rejects mismatched versions.
pub const RECORD_VERSION: u64 = 1;

/// The mock parameters themselves. Plain old data, copied out whole
/// under the lock so readers never see a mixture of two writes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ParamSet {
    /// Logical mock clock value; 0 means "not mocked, use real time".
    pub current_time: i64,
    /// When set, wait-like operations return without any real delay.
    pub mock_wait_returns_immediately: bool,
}

/// The record at offset 0 of every parameter segment.
///
/// `params` sits behind an `UnsafeCell` because every process mutates
/// it through a shared mapping; the embedded lock is the sole access
/// discipline. Generic over the lock so the primitive can be swapped
/// without touching the operations.
#[repr(C)]
pub struct SharedRecord<L: ShmLock = SpinLock> {
    /// Must equal `RECORD_MAGIC`.
    pub magic: u64,
    /// Must equal `RECORD_VERSION`.
    pub version: u64,
    /// Guards `params`. Held only for a copy-out or one field store.
    pub lock: L,
    /// The payload. Access only while holding `lock`.
    pub params: UnsafeCell<ParamSet>,
}

impl<L: ShmLock> SharedRecord<L> {
    /// Checks that a freshly attached region actually holds a record
    /// this build understands.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.magic != RECORD_MAGIC {
            return Err("bad magic");
        }
        if self.version != RECORD_VERSION {
            return Err("wrong version");
        }
        Ok(())
    }
}

/// Bytes a parameter segment must hold: exactly one record.
pub fn bytes_for_record() -> usize {
    size_of::<SharedRecord>()
}
