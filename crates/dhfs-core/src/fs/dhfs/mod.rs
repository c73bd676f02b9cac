/// DHFS4.1 (DVR video filesystem) support
use std::fmt::Write as _;
use std::path::Path;

use crate::config::DhfsConfig;
use crate::error::{DhfsError, Result};
use crate::fs::common::{BlockDevice, ByteSource};
use crate::progress::Progress;
use crate::recovery::output::{ExportedFile, OutputFile};

// Sub-modules
pub mod classify;
pub mod descriptor;
pub mod logs;
pub mod partition;
pub mod superblock;
pub mod timestamp;

use classify::PartitionView;
use descriptor::{Descriptor, DescriptorDetails, DescriptorTable};
use partition::Partition;
use superblock::Superblock;

/// Filesystem magic at offset 0
pub const DHFS_MAGIC: &[u8; 7] = b"DHFS4.1";

/// Check whether the medium starts with the DHFS4.1 magic
pub fn is_dhfs_image<S: ByteSource + ?Sized>(source: &S) -> bool {
    source
        .read_bytes(0, DHFS_MAGIC.len())
        .map(|magic| magic == DHFS_MAGIC)
        .unwrap_or(false)
}

/// One partition with its geometry and classified descriptors
#[derive(Debug, Clone)]
pub struct DhfsPartition {
    pub index: usize,
    pub partition: Partition,
    view: PartitionView,
}

impl DhfsPartition {
    pub fn superblock(&self) -> &Superblock {
        self.view.table().superblock()
    }

    pub fn table(&self) -> &DescriptorTable {
        self.view.table()
    }

    pub fn view(&self) -> &PartitionView {
        &self.view
    }

    /// Absolute offset of fragment `index`'s data
    pub fn fragment_offset(&self, index: u32) -> Result<u64> {
        let sb = self.superblock();
        (index as u64)
            .checked_mul(sb.fragment_size)
            .and_then(|rel| rel.checked_add(sb.video_data_offset))
            .and_then(|rel| rel.checked_add(self.partition.base_offset))
            .ok_or(DhfsError::TruncatedRead {
                offset: self.partition.base_offset,
                length: sb.fragment_size,
                size: u64::MAX,
            })
    }
}

/// An open DHFS4.1 image: the byte source plus a read-only snapshot of its
/// partitions. Operations are blocking and must not run concurrently against
/// the same image.
pub struct DhfsImage<S: ByteSource = BlockDevice> {
    source: S,
    config: DhfsConfig,
    partitions: Vec<DhfsPartition>,
}

impl DhfsImage<BlockDevice> {
    /// Open an image file or device with the default configuration
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, DhfsConfig::default(), &mut Progress::none())
    }

    pub fn open_with(
        path: impl AsRef<Path>,
        config: DhfsConfig,
        progress: &mut Progress<'_>,
    ) -> Result<Self> {
        tracing::info!("Opening DHFS image {}", path.as_ref().display());
        let device = BlockDevice::open(path)?;
        Self::from_source(device, config, progress)
    }

    /// Replace the image held in `slot`. The previous source is released
    /// before the new one is opened, even if opening fails.
    pub fn reopen<'s>(
        slot: &'s mut Option<Self>,
        path: impl AsRef<Path>,
        config: DhfsConfig,
        progress: &mut Progress<'_>,
    ) -> Result<&'s Self> {
        if slot.take().is_some() {
            tracing::debug!("Released previous image");
        }
        let image = Self::open_with(path, config, progress)?;
        Ok(slot.insert(image))
    }
}

impl<S: ByteSource> DhfsImage<S> {
    /// Parse partitions, superblocks and descriptor tables from `source`
    pub fn from_source(source: S, config: DhfsConfig, progress: &mut Progress<'_>) -> Result<Self> {
        let entries = partition::load_partitions(&source)?;
        let mut partitions = Vec::with_capacity(entries.len());

        for (index, entry) in entries.into_iter().enumerate() {
            let superblock = Superblock::load(&source, &entry)?;
            tracing::info!(
                "Partition {}: block size {}, fragment size {}, {} fragments",
                index,
                superblock.block_size,
                superblock.fragment_size,
                superblock.fragment_count
            );

            let table = DescriptorTable::load(&source, index, &entry, &superblock)?;
            let view = PartitionView::build(table, progress, config.debug);
            partitions.push(DhfsPartition {
                index,
                partition: entry,
                view,
            });
        }

        Ok(DhfsImage {
            source,
            config,
            partitions,
        })
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn config(&self) -> &DhfsConfig {
        &self.config
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    pub fn partitions(&self) -> &[DhfsPartition] {
        &self.partitions
    }

    pub fn partition(&self, index: usize) -> Result<&DhfsPartition> {
        self.partitions
            .get(index)
            .ok_or(DhfsError::PartitionOutOfRange {
                partition: index,
                count: self.partitions.len(),
            })
    }

    /// Live main descriptors of a partition, ascending
    pub fn main_descriptors(&self, partition: usize) -> Result<Vec<u32>> {
        Ok(self.partition(partition)?.view().main_indices().collect())
    }

    pub fn free_fragments(&self, partition: usize) -> Result<&[u32]> {
        Ok(self.partition(partition)?.view().free_fragments())
    }

    pub fn dirty_fragments(&self, partition: usize) -> Result<&[u32]> {
        Ok(self.partition(partition)?.view().dirty_fragments())
    }

    pub fn descriptor(&self, partition: usize, index: u32) -> Result<&Descriptor> {
        self.partition(partition)?.table().get(index)
    }

    pub fn descriptor_details(&self, partition: usize, index: u32) -> Result<DescriptorDetails> {
        self.partition(partition)?.table().details(index)
    }

    /// Declared size of the video `index` belongs to
    pub fn video_size(&self, partition: usize, index: u32) -> Result<u64> {
        self.partition(partition)?.table().video_size(index)
    }

    pub fn video_count(&self) -> usize {
        self.partitions.iter().map(|p| p.view().video_count()).sum()
    }

    /// Borrow `length` bytes of fragment `index`, starting `start` bytes in
    pub fn fragment_bytes(
        &self,
        partition: usize,
        index: u32,
        start: u64,
        length: u64,
    ) -> Result<&[u8]> {
        let part = self.partition(partition)?;
        let offset = part.fragment_offset(index)?;
        let offset = offset.checked_add(start).ok_or(DhfsError::TruncatedRead {
            offset,
            length,
            size: self.source.size(),
        })?;
        let length = usize::try_from(length).map_err(|_| DhfsError::TruncatedRead {
            offset,
            length,
            size: self.source.size(),
        })?;
        self.source.read_bytes(offset, length)
    }

    /// The full fragment `index`
    pub fn read_fragment(&self, partition: usize, index: u32) -> Result<&[u8]> {
        let fragment_size = self.partition(partition)?.superblock().fragment_size;
        self.fragment_bytes(partition, index, 0, fragment_size)
    }

    /// Write the log region of `partition` to `path`
    pub fn export_logs(&self, partition: usize, path: impl AsRef<Path>) -> Result<ExportedFile> {
        let superblock = self.partition(partition)?.superblock();
        let payload = logs::read_log_payload(&self.source, superblock)?;

        let exported = OutputFile::write_chunks(path.as_ref(), [payload])?;

        tracing::info!(
            "Saved {} bytes of logs to {}",
            exported.bytes,
            exported.path.display()
        );
        Ok(exported)
    }

    /// Plain-text summary of the image geometry
    pub fn metadata_summary(&self) -> String {
        let mut message = format!("{} Disk Metadata {}\n", "*".repeat(20), "*".repeat(20));

        if let Some(first) = self.partitions.first() {
            let sb = first.superblock();
            let _ = writeln!(message, "Block size: {}", sb.block_size);
            let _ = writeln!(message, "Fragment Size: {}", sb.fragment_size);
            let _ = writeln!(message, "Fragments Reserved: {}/partition", sb.reserved_fragments);
        }
        let _ = writeln!(message, "Partitions: {}", self.partitions.len());

        for part in &self.partitions {
            let sb = part.superblock();
            let base = part.partition.base_offset;
            let view = part.view();
            let reserved_end = (sb.reserved_fragments as u64)
                .saturating_mul(sb.fragment_size)
                .saturating_add(base.saturating_add(sb.video_data_offset));

            let _ = writeln!(message, "{} Partition {} {}", "-".repeat(20), part.index, "-".repeat(20));
            let _ = writeln!(message, "\tBlock size: {}", sb.block_size);
            let _ = writeln!(message, "\tFragment size: {}", sb.fragment_size);
            let _ = writeln!(
                message,
                "\tDescriptors offset: {}",
                base.saturating_add(sb.descriptor_table_offset)
            );
            let _ = writeln!(message, "\tNumber of fragments: {}", sb.fragment_count);
            let _ = writeln!(
                message,
                "\tVideos offset: {}",
                base.saturating_add(sb.video_data_offset)
            );
            let _ = writeln!(message, "\tVideos offset after reserved: {}", reserved_end);
            let _ = writeln!(
                message,
                "\tDate range: {} - {}",
                sb.first_date(),
                sb.last_date()
            );
            let _ = writeln!(
                message,
                "\tVideos: {}, empty slots: {}, free: {}, dirty: {}",
                view.video_count(),
                view.empty_mains().len(),
                view.free_fragments().len(),
                view.dirty_fragments().len()
            );
        }

        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_detection() {
        let mut data = vec![0u8; 16];
        assert!(!is_dhfs_image(&data));

        data[..7].copy_from_slice(DHFS_MAGIC);
        assert!(is_dhfs_image(&data));

        let short = b"DHFS".to_vec();
        assert!(!is_dhfs_image(&short));
    }
}
