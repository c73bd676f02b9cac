//! DHFS fragment descriptor table
//!
//! Each partition holds `fragment_count` descriptors of 32 bytes, one per
//! video fragment. Descriptor layout (little-endian):
//!
//! | offset | width | field                                              |
//! |--------|-------|----------------------------------------------------|
//! | 0      | 1     | type: 0 free, 1 main, 2 continuation               |
//! | 1      | 1     | camera (ASCII digit, `'0'` is camera 1)             |
//! | 2      | 2     | frag number (continuation) / frag count - 1 (main) |
//! | 4      | 4     | begin timestamp                                    |
//! | 8      | 4     | end timestamp                                      |
//! | 12     | 4     | next descriptor                                    |
//! | 16     | 4     | last fragment size in blocks (main)                |
//! | 20     | 4     | previous descriptor                                |
//! | 24     | 4     | begin (main) descriptor                            |
//!
//! Chains run from a main descriptor through `next` until one of the
//! sentinels `0` or `0xFFFFFFFF`.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::partition::Partition;
use super::superblock::Superblock;
use super::timestamp::DhfsTimestamp;
use crate::error::{DhfsError, Result};
use crate::fs::common::ByteSource;

pub const DESCRIPTOR_SIZE: usize = 32;

/// `next_index` values meaning "no further fragment"
pub const CHAIN_END: u32 = 0;
pub const CHAIN_END_ALT: u32 = 0xFFFF_FFFF;

/// Bound on `begin_index` hops when resolving whole-video fields. A
/// well-formed continuation needs exactly one.
pub const MAX_BEGIN_HOPS: usize = 8;

pub fn is_chain_end(index: u32) -> bool {
    index == CHAIN_END || index == CHAIN_END_ALT
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DescriptorType {
    Free,
    Main,
    Continuation,
    Unknown(u8),
}

impl From<u8> for DescriptorType {
    fn from(raw: u8) -> Self {
        match raw {
            0 => DescriptorType::Free,
            1 => DescriptorType::Main,
            2 => DescriptorType::Continuation,
            other => DescriptorType::Unknown(other),
        }
    }
}

impl DescriptorType {
    pub fn raw(&self) -> u8 {
        match self {
            DescriptorType::Free => 0,
            DescriptorType::Main => 1,
            DescriptorType::Continuation => 2,
            DescriptorType::Unknown(raw) => *raw,
        }
    }
}

/// One decoded 32-byte descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub desc_type: DescriptorType,
    pub camera_raw: u8,
    /// Frag number on continuations, total fragments minus one on mains
    pub frag_field: u16,
    pub begin_timestamp: u32,
    pub end_timestamp: u32,
    pub next_index: u32,
    pub last_fragment_blocks: u32,
    pub prev_index: u32,
    pub begin_index: u32,
    pub raw: [u8; DESCRIPTOR_SIZE],
}

impl Descriptor {
    pub fn parse(bytes: &[u8]) -> Self {
        let mut raw = [0u8; DESCRIPTOR_SIZE];
        raw.copy_from_slice(&bytes[..DESCRIPTOR_SIZE]);

        Descriptor {
            desc_type: DescriptorType::from(raw[0]),
            camera_raw: raw[1],
            frag_field: LittleEndian::read_u16(&raw[2..4]),
            begin_timestamp: LittleEndian::read_u32(&raw[4..8]),
            end_timestamp: LittleEndian::read_u32(&raw[8..12]),
            next_index: LittleEndian::read_u32(&raw[12..16]),
            last_fragment_blocks: LittleEndian::read_u32(&raw[16..20]),
            prev_index: LittleEndian::read_u32(&raw[20..24]),
            begin_index: LittleEndian::read_u32(&raw[24..28]),
            raw,
        }
    }

    pub fn is_main(&self) -> bool {
        self.desc_type == DescriptorType::Main
    }

    /// Camera number as shown to users
    pub fn camera(&self) -> i32 {
        self.camera_raw as i32 - 48 + 1
    }

    /// Ordinal within the chain; always 0 for a main descriptor
    pub fn frag_number(&self) -> u16 {
        match self.desc_type {
            DescriptorType::Main => 0,
            _ => self.frag_field,
        }
    }

    /// Empty main slots carry identical begin and end timestamps
    pub fn has_recording(&self) -> bool {
        self.begin_timestamp != self.end_timestamp
    }

    pub fn begin_time(&self) -> DhfsTimestamp {
        DhfsTimestamp::decode(self.begin_timestamp)
    }

    pub fn end_time(&self) -> DhfsTimestamp {
        DhfsTimestamp::decode(self.end_timestamp)
    }

    pub fn hex_dump(&self) -> String {
        self.raw
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Whole-video values, authoritative only on the main descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoGeometry {
    pub main_index: u32,
    pub total_fragments: u32,
    pub last_fragment_size: u64,
    pub slack_size: u64,
    pub video_size: u64,
}

/// The descriptor array of one partition
#[derive(Debug, Clone)]
pub struct DescriptorTable {
    partition: usize,
    superblock: Superblock,
    descriptors: Vec<Descriptor>,
}

impl DescriptorTable {
    /// Read `fragment_count * 32` bytes at the partition's descriptor table
    pub fn load<S: ByteSource + ?Sized>(
        source: &S,
        partition_index: usize,
        partition: &Partition,
        superblock: &Superblock,
    ) -> Result<Self> {
        let offset = partition
            .base_offset
            .checked_add(superblock.descriptor_table_offset);
        let length = (superblock.fragment_count as u64).checked_mul(DESCRIPTOR_SIZE as u64);

        let (offset, length) = match (offset, length.and_then(|l| usize::try_from(l).ok())) {
            (Some(offset), Some(length)) => (offset, length),
            _ => {
                return Err(DhfsError::TruncatedRead {
                    offset: partition.base_offset,
                    length: superblock.fragment_count as u64 * DESCRIPTOR_SIZE as u64,
                    size: source.size(),
                })
            }
        };

        tracing::debug!(
            "Reading descriptor table of partition {}: offset=0x{:x}, {} descriptors",
            partition_index,
            offset,
            superblock.fragment_count
        );

        let data = source.read_bytes(offset, length)?;
        Ok(Self::from_bytes(partition_index, *superblock, data))
    }

    /// Build a table from raw descriptor bytes; a trailing partial record is ignored
    pub fn from_bytes(partition: usize, superblock: Superblock, data: &[u8]) -> Self {
        let descriptors = data
            .chunks_exact(DESCRIPTOR_SIZE)
            .map(Descriptor::parse)
            .collect();

        DescriptorTable {
            partition,
            superblock,
            descriptors,
        }
    }

    pub fn partition(&self) -> usize {
        self.partition
    }

    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    pub fn len(&self) -> u32 {
        self.descriptors.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &Descriptor)> {
        self.descriptors
            .iter()
            .enumerate()
            .map(|(index, desc)| (index as u32, desc))
    }

    pub fn get(&self, index: u32) -> Result<&Descriptor> {
        self.descriptors
            .get(index as usize)
            .ok_or(DhfsError::DescriptorOutOfRange {
                partition: self.partition,
                index,
                count: self.len(),
            })
    }

    /// Follow `begin_index` back to the main descriptor owning `index`
    pub fn resolve_main(&self, index: u32) -> Result<u32> {
        let mut current = index;

        for _ in 0..=MAX_BEGIN_HOPS {
            let desc = self.get(current)?;
            if desc.is_main() {
                return Ok(current);
            }
            current = desc.begin_index;
        }

        Err(DhfsError::MalformedChain {
            partition: self.partition,
            descriptor: index,
            steps: MAX_BEGIN_HOPS,
        })
    }

    /// Declared fragment count of the video `index` belongs to
    pub fn total_fragments(&self, index: u32) -> Result<u32> {
        let main = self.get(self.resolve_main(index)?)?;
        Ok(main.frag_field as u32 + 1)
    }

    /// Data bytes held by the final fragment of the video `index` belongs to
    pub fn last_fragment_size(&self, index: u32) -> Result<u64> {
        let main = self.get(self.resolve_main(index)?)?;
        Ok(main.last_fragment_blocks as u64 * self.superblock.block_size as u64)
    }

    /// Unused tail of the final fragment
    pub fn slack_size(&self, index: u32) -> Result<u64> {
        let fragment_size = self.superblock.fragment_size;
        let last_size = self.last_fragment_size(index)?;
        if last_size > fragment_size {
            tracing::warn!(
                "Descriptor {} declares a last fragment of {} bytes, larger than the {}-byte fragment; slack clamped to 0",
                index,
                last_size,
                fragment_size
            );
        }
        Ok(fragment_size.saturating_sub(last_size))
    }

    /// Declared video size: `(total - 1) * fragment_size + last_fragment_size`
    pub fn video_size(&self, index: u32) -> Result<u64> {
        let geometry = self.geometry(index)?;
        Ok(geometry.video_size)
    }

    pub fn geometry(&self, index: u32) -> Result<VideoGeometry> {
        let main_index = self.resolve_main(index)?;
        let total_fragments = self.total_fragments(main_index)?;
        let last_fragment_size = self.last_fragment_size(main_index)?;

        Ok(VideoGeometry {
            main_index,
            total_fragments,
            last_fragment_size,
            slack_size: self.slack_size(main_index)?,
            video_size: (total_fragments as u64 - 1)
                .saturating_mul(self.superblock.fragment_size)
                .saturating_add(last_fragment_size),
        })
    }

    /// Walk the chain starting at `main_index` through `next_index`.
    ///
    /// Revisiting a descriptor is a cycle and fails with
    /// [`DhfsError::MalformedChain`]; a pointer past the table fails with
    /// [`DhfsError::DescriptorOutOfRange`]. A chain longer than the declared
    /// fragment count is returned in full.
    pub fn chain_of(&self, main_index: u32) -> Result<Vec<u32>> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = main_index;

        while !is_chain_end(current) {
            if !visited.insert(current) {
                tracing::warn!(
                    "Descriptor chain loop in partition {} at {} (chain from {})",
                    self.partition,
                    current,
                    main_index
                );
                return Err(DhfsError::MalformedChain {
                    partition: self.partition,
                    descriptor: main_index,
                    steps: chain.len(),
                });
            }

            let desc = self.get(current)?;
            chain.push(current);
            current = desc.next_index;
        }

        Ok(chain)
    }

    /// Number of descriptors per raw type byte
    pub fn type_counts(&self) -> Vec<(DescriptorType, u32)> {
        let mut counts: Vec<(DescriptorType, u32)> = Vec::new();
        for desc in &self.descriptors {
            match counts.iter_mut().find(|(t, _)| *t == desc.desc_type) {
                Some((_, n)) => *n += 1,
                None => counts.push((desc.desc_type, 1)),
            }
        }
        counts.sort_by_key(|(t, _)| t.raw());
        counts
    }

    /// Human-oriented decoding of one descriptor
    pub fn details(&self, index: u32) -> Result<DescriptorDetails> {
        let desc = self.get(index)?;

        // Free and unknown descriptors have no owning video
        let geometry = match desc.desc_type {
            DescriptorType::Main | DescriptorType::Continuation => self.geometry(index).ok(),
            _ => None,
        };

        Ok(DescriptorDetails {
            partition: self.partition,
            index,
            desc_type: desc.desc_type,
            camera: desc.camera(),
            begin_time: desc.begin_time().to_string(),
            end_time: desc.end_time().to_string(),
            frag_number: desc.frag_number(),
            total_fragments: geometry.map(|g| g.total_fragments),
            begin_index: desc.begin_index,
            prev_index: desc.prev_index,
            next_index: desc.next_index,
            last_fragment_size: geometry.map(|g| g.last_fragment_size),
            video_size: geometry.map(|g| g.video_size),
            hex: desc.hex_dump(),
        })
    }
}

/// Decoded view of a descriptor for inspection and reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorDetails {
    pub partition: usize,
    pub index: u32,
    pub desc_type: DescriptorType,
    pub camera: i32,
    pub begin_time: String,
    pub end_time: String,
    pub frag_number: u16,
    pub total_fragments: Option<u32>,
    pub begin_index: u32,
    pub prev_index: u32,
    pub next_index: u32,
    pub last_fragment_size: Option<u64>,
    pub video_size: Option<u64>,
    pub hex: String,
}
