mod directory;
mod error;
mod layout;
mod segment;
mod spinlock;
mod store;

pub use directory::{FileDirectory, HandleDirectory, SegmentHandle};
pub use error::StoreError;
pub use layout::{ParamSet, RECORD_MAGIC, RECORD_VERSION, SharedRecord, bytes_for_record};
pub use segment::{AttachedSegment, SegmentAccessor, UNPIN_SUPPORTED};
pub use spinlock::{ShmLock, SpinLock};
pub use store::ParamStore;
