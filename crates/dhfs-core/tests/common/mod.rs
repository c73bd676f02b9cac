//! Synthetic DHFS4.1 image builder shared by the integration tests
#![allow(dead_code)]

use byteorder::{ByteOrder, LittleEndian};
use dhfs_core::DhfsTimestamp;
use std::collections::HashMap;
use std::path::PathBuf;
use tempfile::TempDir;

pub const BLOCK: usize = 512;
pub const FRAGMENT_BLOCKS: usize = 4;
pub const FRAGMENT: usize = BLOCK * FRAGMENT_BLOCKS;
pub const DESCRIPTOR: usize = 32;

/// Partitions start after the directory area
const FIRST_PARTITION: usize = 0x4000;
const DIRECTORY: usize = 0x3C00 + 0x34;

/// Pack a date-time the way the DVR stores it
pub fn timestamp(year: u8, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> u32 {
    DhfsTimestamp {
        year,
        month,
        day,
        hour,
        minute,
        second,
    }
    .encode()
}

/// Raw descriptor record; camera is the DVR's ASCII digit (`b'0'` = camera 1)
#[derive(Debug, Clone, Copy)]
pub struct Desc {
    pub desc_type: u8,
    pub camera: u8,
    pub frag: u16,
    pub begin_ts: u32,
    pub end_ts: u32,
    pub next: u32,
    pub last_blocks: u32,
    pub prev: u32,
    pub begin: u32,
}

impl Desc {
    pub fn free() -> Self {
        Desc {
            desc_type: 0,
            camera: 0,
            frag: 0,
            begin_ts: 0,
            end_ts: 0,
            next: 0,
            last_blocks: 0,
            prev: 0,
            begin: 0,
        }
    }

    /// Main descriptor of a `total`-fragment recording
    pub fn main(total: u16, times: (u32, u32), next: u32, last_blocks: u32) -> Self {
        Desc {
            desc_type: 1,
            camera: b'0',
            frag: total - 1,
            begin_ts: times.0,
            end_ts: times.1,
            next,
            last_blocks,
            ..Desc::free()
        }
    }

    pub fn continuation(frag: u16, times: (u32, u32), next: u32, prev: u32, begin: u32) -> Self {
        Desc {
            desc_type: 2,
            camera: b'0',
            frag,
            begin_ts: times.0,
            end_ts: times.1,
            next,
            prev,
            begin,
            ..Desc::free()
        }
    }

    pub fn camera(mut self, camera: u8) -> Self {
        self.camera = camera;
        self
    }

    fn encode(&self) -> [u8; DESCRIPTOR] {
        let mut raw = [0u8; DESCRIPTOR];
        raw[0] = self.desc_type;
        raw[1] = self.camera;
        LittleEndian::write_u16(&mut raw[2..4], self.frag);
        LittleEndian::write_u32(&mut raw[4..8], self.begin_ts);
        LittleEndian::write_u32(&mut raw[8..12], self.end_ts);
        LittleEndian::write_u32(&mut raw[12..16], self.next);
        LittleEndian::write_u32(&mut raw[16..20], self.last_blocks);
        LittleEndian::write_u32(&mut raw[20..24], self.prev);
        LittleEndian::write_u32(&mut raw[24..28], self.begin);
        raw
    }
}

#[derive(Debug, Default)]
struct PartitionLayout {
    descriptors: Vec<Desc>,
    fragments: HashMap<u32, Vec<u8>>,
}

/// Builds an image with 512-byte blocks and 4-block fragments. Unless
/// overridden, fragment `i` is filled with the byte `i`.
#[derive(Debug, Default)]
pub struct ImageBuilder {
    partitions: Vec<PartitionLayout>,
    logs: Option<Vec<u8>>,
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partition(mut self, descriptors: Vec<Desc>) -> Self {
        self.partitions.push(PartitionLayout {
            descriptors,
            fragments: HashMap::new(),
        });
        self
    }

    /// Set the leading bytes of a fragment in the last added partition; the
    /// rest of the fragment is filled with `fill`
    pub fn fragment(mut self, index: u32, prefix: &[u8], fill: u8) -> Self {
        let mut data = vec![fill; FRAGMENT];
        data[..prefix.len()].copy_from_slice(prefix);
        if let Some(part) = self.partitions.last_mut() {
            part.fragments.insert(index, data);
        }
        self
    }

    pub fn logs(mut self, payload: &[u8]) -> Self {
        self.logs = Some(payload.to_vec());
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut image = vec![0u8; FIRST_PARTITION];
        image[..7].copy_from_slice(b"DHFS4.1");

        let mut layouts = Vec::new();
        for part in &self.partitions {
            let count = part.descriptors.len();
            let descriptor_blocks = (count * DESCRIPTOR).div_ceil(BLOCK).max(1);
            let video_blocks = 4 + descriptor_blocks;
            let base = image.len();

            image.resize(base + video_blocks * BLOCK + count * FRAGMENT, 0);

            for (index, desc) in part.descriptors.iter().enumerate() {
                let at = base + 4 * BLOCK + index * DESCRIPTOR;
                image[at..at + DESCRIPTOR].copy_from_slice(&desc.encode());

                let frag = base + video_blocks * BLOCK + index * FRAGMENT;
                match part.fragments.get(&(index as u32)) {
                    Some(data) => image[frag..frag + FRAGMENT].copy_from_slice(data),
                    None => image[frag..frag + FRAGMENT].fill(index as u8),
                }
            }

            layouts.push((base, count, video_blocks));
        }

        let log_offset = image.len();
        if let Some(payload) = &self.logs {
            image.resize(log_offset + 2 * BLOCK, 0);
            LittleEndian::write_u32(&mut image[log_offset..], (2 * BLOCK + payload.len()) as u32);
            image.extend_from_slice(payload);
        }

        let mut entry = DIRECTORY;
        for &(base, count, video_blocks) in &layouts {
            LittleEndian::write_u32(&mut image[entry + 20..], 2);
            LittleEndian::write_u64(&mut image[entry + 48..], (base / BLOCK) as u64);
            entry += 64;

            let sb = base + 2 * BLOCK;
            LittleEndian::write_u32(&mut image[sb + 0x10..], timestamp(20, 3, 1, 0, 0, 0));
            LittleEndian::write_u32(&mut image[sb + 0x14..], timestamp(20, 3, 31, 23, 59, 59));
            LittleEndian::write_u32(&mut image[sb + 0x2C..], BLOCK as u32);
            LittleEndian::write_u32(&mut image[sb + 0x30..], FRAGMENT_BLOCKS as u32);
            LittleEndian::write_u32(&mut image[sb + 0x44..], 4);
            LittleEndian::write_u32(&mut image[sb + 0x48..], video_blocks as u32);
            LittleEndian::write_u32(&mut image[sb + 0x4C..], count as u32);
            LittleEndian::write_u32(&mut image[sb + 0xF8..], (log_offset / BLOCK) as u32);
        }
        image[entry..entry + 4].copy_from_slice(&[0xAA, 0x55, 0xAA, 0x55]);

        image
    }

    /// Write the image into a fresh temporary directory
    pub fn write(&self) -> (TempDir, PathBuf) {
        write_image(&self.build())
    }

    /// Write the image cut to its first `length` bytes
    pub fn write_truncated(&self, length: usize) -> (TempDir, PathBuf) {
        let mut image = self.build();
        image.truncate(length);
        write_image(&image)
    }
}

/// Byte offset of fragment `index` in the first partition, given its
/// descriptor count
pub fn first_partition_fragment(descriptors: usize, index: usize) -> usize {
    let descriptor_blocks = (descriptors * DESCRIPTOR).div_ceil(BLOCK).max(1);
    FIRST_PARTITION + (4 + descriptor_blocks) * BLOCK + index * FRAGMENT
}

fn write_image(image: &[u8]) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dvr.img");
    std::fs::write(&path, image).unwrap();
    (dir, path)
}

/// Sorted names of the files in `dir`
pub fn file_names(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
