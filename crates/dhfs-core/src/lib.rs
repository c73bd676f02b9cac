//! Forensic parsing and video recovery for DHFS4.1 DVR filesystems
//!
//! ```no_run
//! use dhfs_core::{DhfsImage, VideoListing};
//!
//! let image = DhfsImage::open("dvr.img")?;
//! for video in VideoListing::from_image(&image)?.records {
//!     println!("{} {} ch{:02}", video.date, video.start, video.camera);
//! }
//! # Ok::<(), dhfs_core::DhfsError>(())
//! ```

pub mod config;
pub mod error;
pub mod fs;
pub mod listing;
pub mod progress;
pub mod recovery;

pub use config::{CarveSignature, ConfigError, ConfigWarning, DhfsConfig};
pub use error::{DhfsError, Result};
pub use fs::common::{BlockDevice, ByteSource};
pub use fs::dhfs::classify::FragmentClass;
pub use fs::dhfs::descriptor::{Descriptor, DescriptorDetails, DescriptorType};
pub use fs::dhfs::timestamp::DhfsTimestamp;
pub use fs::dhfs::{DhfsImage, DhfsPartition};
pub use listing::{ListingFilter, VideoListing, VideoRecord};
pub use progress::{Progress, ProgressEvent};
pub use recovery::{
    BatchFailure, BatchReport, ExportedFile, RecoveryEngine, RecoveryMode, RecoveryReport,
    VideoAssembler,
};
