/// Engine error type shared by every DHFS component
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DhfsError {
    /// The medium does not start with the DHFS4.1 magic
    #[error("Unsupported format: expected DHFS4.1 magic, found {found:02x?}")]
    NotThisFilesystem { found: Vec<u8> },

    /// A read went past the end of the medium (or its offset overflowed)
    #[error("Read beyond end of medium: offset {offset} + {length} bytes > size {size}")]
    TruncatedRead { offset: u64, length: u64, size: u64 },

    /// A chain or back-pointer walk did not terminate
    #[error("Malformed chain in partition {partition} at descriptor {descriptor} after {steps} steps")]
    MalformedChain {
        partition: usize,
        descriptor: u32,
        steps: usize,
    },

    #[error("Descriptor {index} out of range in partition {partition} ({count} descriptors)")]
    DescriptorOutOfRange {
        partition: usize,
        index: u32,
        count: u32,
    },

    /// The descriptor is not the main descriptor of a live video
    #[error("Descriptor {descriptor} in partition {partition} does not start a live video")]
    NotAVideo { partition: usize, descriptor: u32 },

    #[error("Partition {partition} out of range ({count} partitions)")]
    PartitionOutOfRange { partition: usize, count: usize },

    /// Creating or writing an export/recovery file failed
    #[error("Output error on {}: {source}", path.display())]
    OutputIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl DhfsError {
    pub(crate) fn output(path: impl Into<PathBuf>, source: io::Error) -> Self {
        DhfsError::OutputIo {
            path: path.into(),
            source,
        }
    }

    /// True for failures confined to a single output file
    pub fn is_output_error(&self) -> bool {
        matches!(self, DhfsError::OutputIo { .. })
    }

    /// True when the source medium itself could not be read; such failures
    /// abort batch operations instead of skipping one item
    pub fn is_medium_error(&self) -> bool {
        matches!(self, DhfsError::TruncatedRead { .. } | DhfsError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, DhfsError>;
