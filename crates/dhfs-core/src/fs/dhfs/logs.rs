/// DVR event log region
///
/// The region starts with a two-block header whose first four bytes hold the
/// total region size in bytes, header included.
use byteorder::{ByteOrder, LittleEndian};

use super::superblock::Superblock;
use crate::error::{DhfsError, Result};
use crate::fs::common::ByteSource;

/// Borrow the log payload (the region minus its header)
pub fn read_log_payload<'a, S: ByteSource + ?Sized>(
    source: &'a S,
    superblock: &Superblock,
) -> Result<&'a [u8]> {
    let header_size = 2 * superblock.block_size as u64;
    let header_len = usize::try_from(header_size).map_err(|_| DhfsError::TruncatedRead {
        offset: superblock.log_region_offset,
        length: header_size,
        size: source.size(),
    })?;

    let header = source.read_bytes(superblock.log_region_offset, header_len.max(4))?;
    let total = LittleEndian::read_u32(&header[..4]) as u64;

    let payload_size = total
        .checked_sub(header_size)
        .ok_or(DhfsError::TruncatedRead {
            offset: superblock.log_region_offset,
            length: header_size,
            size: total,
        })?;

    tracing::debug!(
        "Log region at 0x{:x}: {} bytes total, {} bytes payload",
        superblock.log_region_offset,
        total,
        payload_size
    );

    let payload_offset = superblock
        .log_region_offset
        .checked_add(header_size)
        .ok_or(DhfsError::TruncatedRead {
            offset: superblock.log_region_offset,
            length: header_size,
            size: source.size(),
        })?;
    source.read_bytes(payload_offset, payload_size as usize)
}
