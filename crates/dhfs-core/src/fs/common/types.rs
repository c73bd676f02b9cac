/// Read-only byte sources backing an open image
use memmap2::MmapOptions;
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::Path;

use crate::error::{DhfsError, Result};

/// Random-access, read-only view of a disk device or disk image.
///
/// All reads are by absolute byte offset. A read that does not fit entirely
/// inside the medium fails with [`DhfsError::TruncatedRead`].
pub trait ByteSource {
    /// Size of the medium in bytes
    fn size(&self) -> u64;

    /// Borrow `length` bytes starting at `offset`
    fn read_bytes(&self, offset: u64, length: usize) -> Result<&[u8]>;
}

/// Resolve `offset..offset + length` against a medium of `size` bytes
pub(crate) fn checked_range(offset: u64, length: usize, size: u64) -> Result<(usize, usize)> {
    let truncated = || DhfsError::TruncatedRead {
        offset,
        length: length as u64,
        size,
    };

    let end = offset.checked_add(length as u64).ok_or_else(truncated)?;
    if end > size {
        return Err(truncated());
    }

    let start = usize::try_from(offset).map_err(|_| truncated())?;
    let end = usize::try_from(end).map_err(|_| truncated())?;
    Ok((start, end))
}

/// A memory-mapped file for efficient large file access
pub struct BlockDevice {
    _file: File,
    mmap: memmap2::Mmap,
    size: u64,
}

impl BlockDevice {
    /// Open a block device or image file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path.as_ref())?;

        // Block devices report a zero metadata length; seeking gives the real size
        let size = file.seek(SeekFrom::End(0))?;
        let length = usize::try_from(size).map_err(|_| DhfsError::TruncatedRead {
            offset: 0,
            length: size,
            size,
        })?;

        // SAFETY: the mapping is read-only and the engine never writes to the source
        let mmap = unsafe { MmapOptions::new().len(length).map(&file)? };

        tracing::debug!("Mapped {} ({} bytes)", path.as_ref().display(), size);

        Ok(BlockDevice {
            _file: file,
            mmap,
            size,
        })
    }
}

impl ByteSource for BlockDevice {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_bytes(&self, offset: u64, length: usize) -> Result<&[u8]> {
        let (start, end) = checked_range(offset, length, self.size)?;
        Ok(&self.mmap[start..end])
    }
}

/// In-memory medium, mostly useful for synthetic images
impl ByteSource for Vec<u8> {
    fn size(&self) -> u64 {
        self.len() as u64
    }

    fn read_bytes(&self, offset: u64, length: usize) -> Result<&[u8]> {
        let (start, end) = checked_range(offset, length, self.len() as u64)?;
        Ok(&self[start..end])
    }
}
