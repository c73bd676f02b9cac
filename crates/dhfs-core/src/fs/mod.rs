/// File system detection and module organization
use std::path::Path;

pub mod common;
pub mod dhfs;

use crate::error::Result;
use common::BlockDevice;

/// Detect whether a device/image holds a DHFS4.1 filesystem
pub fn detect_filesystem(device_path: &Path) -> Result<bool> {
    let device = BlockDevice::open(device_path)?;
    Ok(dhfs::is_dhfs_image(&device))
}

/// Get human-readable file system information
pub fn get_filesystem_info(device_path: &Path) -> Result<String> {
    let image = dhfs::DhfsImage::open(device_path)?;
    Ok(image.metadata_summary())
}
