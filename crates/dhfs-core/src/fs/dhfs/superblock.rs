/// DHFS per-partition superblock (geometry constants)
use byteorder::{LittleEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

use super::partition::Partition;
use super::timestamp::DhfsTimestamp;
use crate::error::{DhfsError, Result};
use crate::fs::common::ByteSource;

/// Bytes of the superblock the parser looks at
pub const SUPERBLOCK_SPAN: usize = 0xFC;

const DATES_OFFSET: u64 = 0x10;
const GEOMETRY_OFFSET: u64 = 0x2C;
const RESERVED_OFFSET: u64 = 0x38;
const TABLES_OFFSET: u64 = 0x44;
const LOG_OFFSET: u64 = 0xF8;

/// Geometry of one partition. Every offset is already scaled to bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Superblock {
    pub block_size: u32,
    /// `block_size` times the on-disk fragment size in blocks
    pub fragment_size: u64,
    pub reserved_fragments: u32,
    /// Relative to the partition base
    pub descriptor_table_offset: u64,
    /// Relative to the partition base
    pub video_data_offset: u64,
    pub fragment_count: u32,
    /// Absolute offset of the log region on the medium
    pub log_region_offset: u64,
    pub first_date: u32,
    pub last_date: u32,
}

impl Superblock {
    /// Parse the superblock of `partition`. Values are not validated; a bad
    /// geometry surfaces later as a read error.
    pub fn load<S: ByteSource + ?Sized>(source: &S, partition: &Partition) -> Result<Self> {
        let position = partition.superblock_position()?;
        let data = source.read_bytes(position, SUPERBLOCK_SPAN)?;
        Self::parse(data)
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let short = |_| DhfsError::TruncatedRead {
            offset: 0,
            length: SUPERBLOCK_SPAN as u64,
            size: data.len() as u64,
        };

        cursor.set_position(DATES_OFFSET);
        let first_date = cursor.read_u32::<LittleEndian>().map_err(short)?;
        let last_date = cursor.read_u32::<LittleEndian>().map_err(short)?;

        cursor.set_position(GEOMETRY_OFFSET);
        let block_size = cursor.read_u32::<LittleEndian>().map_err(short)?;
        let fragment_blocks = cursor.read_u32::<LittleEndian>().map_err(short)?;

        cursor.set_position(RESERVED_OFFSET);
        let reserved_fragments = cursor.read_u32::<LittleEndian>().map_err(short)?;

        cursor.set_position(TABLES_OFFSET);
        let descriptor_blocks = cursor.read_u32::<LittleEndian>().map_err(short)?;
        let video_blocks = cursor.read_u32::<LittleEndian>().map_err(short)?;
        let fragment_count = cursor.read_u32::<LittleEndian>().map_err(short)?;

        cursor.set_position(LOG_OFFSET);
        let log_blocks = cursor.read_u32::<LittleEndian>().map_err(short)?;

        // u32 * u32 always fits in u64
        let scale = |blocks: u32| blocks as u64 * block_size as u64;

        Ok(Superblock {
            block_size,
            fragment_size: scale(fragment_blocks),
            reserved_fragments,
            descriptor_table_offset: scale(descriptor_blocks),
            video_data_offset: scale(video_blocks),
            fragment_count,
            log_region_offset: scale(log_blocks),
            first_date,
            last_date,
        })
    }

    pub fn first_date(&self) -> DhfsTimestamp {
        DhfsTimestamp::decode(self.first_date)
    }

    pub fn last_date(&self) -> DhfsTimestamp {
        DhfsTimestamp::decode(self.last_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::ByteOrder;

    fn raw_superblock() -> Vec<u8> {
        let mut data = vec![0u8; SUPERBLOCK_SPAN];
        LittleEndian::write_u32(&mut data[0x10..], 0x4C00_0000);
        LittleEndian::write_u32(&mut data[0x14..], 0x4C40_0000);
        LittleEndian::write_u32(&mut data[0x2C..], 512);
        LittleEndian::write_u32(&mut data[0x30..], 4096);
        LittleEndian::write_u32(&mut data[0x38..], 3);
        LittleEndian::write_u32(&mut data[0x44..], 8);
        LittleEndian::write_u32(&mut data[0x48..], 64);
        LittleEndian::write_u32(&mut data[0x4C..], 1200);
        LittleEndian::write_u32(&mut data[0xF8..], 40);
        data
    }

    #[test]
    fn test_parse_scales_block_counts() {
        let sb = Superblock::parse(&raw_superblock()).unwrap();

        assert_eq!(sb.block_size, 512);
        assert_eq!(sb.fragment_size, 4096 * 512);
        assert_eq!(sb.reserved_fragments, 3);
        assert_eq!(sb.descriptor_table_offset, 8 * 512);
        assert_eq!(sb.video_data_offset, 64 * 512);
        assert_eq!(sb.fragment_count, 1200);
        assert_eq!(sb.log_region_offset, 40 * 512);
        assert_eq!(sb.first_date().full_year(), 2019);
    }

    #[test]
    fn test_load_at_partition_offset() {
        let mut image = vec![0u8; 0x1000];
        image[0x800..0x800 + SUPERBLOCK_SPAN].copy_from_slice(&raw_superblock());

        let partition = Partition {
            base_offset: 0x400,
            superblock_offset: 0x400,
        };
        let sb = Superblock::load(&image, &partition).unwrap();
        assert_eq!(sb.fragment_count, 1200);
    }

    #[test]
    fn test_short_superblock() {
        assert!(matches!(
            Superblock::parse(&[0u8; 0x40]),
            Err(DhfsError::TruncatedRead { .. })
        ));
    }
}
