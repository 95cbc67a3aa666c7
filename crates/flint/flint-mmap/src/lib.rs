//! File-backed shared memory.
//!
//! A `ShmFile` is a file mapped read-write into the calling process.
//! Any number of processes can map the same file; the kernel gives them
//! all the same physical pages, so stores made by one process are seen
//! by the others. The mapping is released when the `ShmFile` is dropped;
//! the file itself lives until someone unlinks it.

use memmap2::MmapMut;
use std::{
    fs::{File, OpenOptions},
    io,
    path::Path,
};

#[derive(Debug)]
pub struct ShmFile {
    _file: File,
    mmap: MmapMut,
}

impl ShmFile {
    /// Create (or truncate) the file at `path`, size it to `size_bytes`
    /// and map it read-write. The kernel zero-fills the new pages.
    pub fn create_rw<P: AsRef<Path>>(path: P, size_bytes: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.set_len(size_bytes)?;

        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self { _file: file, mmap })
    }

    /// Map an existing file read-write. Fails with `NotFound` if the
    /// file was never created or has been unlinked.
    pub fn open_rw<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(Self { _file: file, mmap })
    }

    /// Raw pointer to the start of the mapped region.
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.mmap.as_mut_ptr()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mmap.len() == 0
    }

    /// Synchronously write the mapped pages back to the file (msync).
    pub fn flush(&self) -> io::Result<()> {
        self.mmap.flush()
    }
}
