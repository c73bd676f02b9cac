//! DHFS partition directory
//!
//! The directory starts at `0x3C00 + 0x34` and is a run of 64-byte entries
//! terminated by an entry whose first four bytes are `AA 55 AA 55`. There is
//! no stored partition count.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use super::{is_dhfs_image, DHFS_MAGIC};
use crate::error::{DhfsError, Result};
use crate::fs::common::ByteSource;

pub const PARTITION_TABLE_OFFSET: u64 = 0x3C00 + 0x34;
pub const PARTITION_ENTRY_SIZE: usize = 64;
pub const PARTITION_SENTINEL: [u8; 4] = [0xAA, 0x55, 0xAA, 0x55];

/// Directory block counts are always in 512-byte units
pub const DIRECTORY_BLOCK_SIZE: u64 = 512;

const SUPERBLOCK_FIELD: usize = 20;
const BASE_FIELD: usize = 48;

/// One partition, both offsets in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    /// Absolute offset of the partition on the medium
    pub base_offset: u64,
    /// Superblock offset relative to `base_offset`
    pub superblock_offset: u64,
}

impl Partition {
    fn parse(entry: &[u8]) -> Result<Self> {
        let superblock_blocks = LittleEndian::read_u32(&entry[SUPERBLOCK_FIELD..SUPERBLOCK_FIELD + 4]);
        let base_blocks = LittleEndian::read_u64(&entry[BASE_FIELD..BASE_FIELD + 8]);

        Ok(Partition {
            base_offset: blocks_to_bytes(base_blocks)?,
            superblock_offset: superblock_blocks as u64 * DIRECTORY_BLOCK_SIZE,
        })
    }

    /// Absolute offset of this partition's superblock
    pub fn superblock_position(&self) -> Result<u64> {
        self.base_offset
            .checked_add(self.superblock_offset)
            .ok_or(DhfsError::TruncatedRead {
                offset: self.base_offset,
                length: self.superblock_offset,
                size: u64::MAX,
            })
    }
}

fn blocks_to_bytes(blocks: u64) -> Result<u64> {
    blocks
        .checked_mul(DIRECTORY_BLOCK_SIZE)
        .ok_or(DhfsError::TruncatedRead {
            offset: blocks,
            length: DIRECTORY_BLOCK_SIZE,
            size: u64::MAX,
        })
}

/// Parse the partition directory.
///
/// A directory that runs off the end of the medium before the sentinel is
/// found surfaces as [`DhfsError::TruncatedRead`].
pub fn load_partitions<S: ByteSource + ?Sized>(source: &S) -> Result<Vec<Partition>> {
    if !is_dhfs_image(source) {
        let found = source
            .read_bytes(0, DHFS_MAGIC.len().min(source.size() as usize))
            .map(<[u8]>::to_vec)
            .unwrap_or_default();
        return Err(DhfsError::NotThisFilesystem { found });
    }

    let mut partitions = Vec::new();
    let mut offset = PARTITION_TABLE_OFFSET;

    loop {
        let entry = source.read_bytes(offset, PARTITION_ENTRY_SIZE)?;
        if entry[..4] == PARTITION_SENTINEL {
            break;
        }

        let partition = Partition::parse(entry)?;
        tracing::debug!(
            "Partition {}: base=0x{:x}, superblock=+0x{:x}",
            partitions.len(),
            partition.base_offset,
            partition.superblock_offset
        );
        partitions.push(partition);

        offset += PARTITION_ENTRY_SIZE as u64;
    }

    if partitions.is_empty() {
        tracing::warn!("Partition directory is empty");
    }

    Ok(partitions)
}
