//! Opening, reopening and metadata of synthetic images

mod common;

use common::{timestamp, Desc, ImageBuilder, BLOCK};
use dhfs_core::fs::{detect_filesystem, get_filesystem_info};
use dhfs_core::{DhfsConfig, DhfsError, DhfsImage, Progress, VideoListing};

fn one_video(partitions: usize) -> ImageBuilder {
    let times = (timestamp(20, 3, 9, 8, 0, 0), timestamp(20, 3, 9, 8, 1, 0));
    let mut builder = ImageBuilder::new();
    for _ in 0..partitions {
        builder = builder.partition(vec![Desc::free(), Desc::main(1, times, 0, 4)]);
    }
    builder
}

#[test]
fn test_rejects_other_filesystems() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blank.img");
    std::fs::write(&path, vec![0u8; 0x5000]).unwrap();

    assert!(!detect_filesystem(&path).unwrap());
    assert!(matches!(
        DhfsImage::open(&path),
        Err(DhfsError::NotThisFilesystem { .. })
    ));
}

#[test]
fn test_zero_partitions() {
    let (_dir, path) = ImageBuilder::new().write();
    let image = DhfsImage::open(&path).unwrap();

    assert!(detect_filesystem(&path).unwrap());
    assert_eq!(image.partition_count(), 0);
    assert!(VideoListing::from_image(&image).unwrap().is_empty());
    assert!(matches!(
        image.main_descriptors(0),
        Err(DhfsError::PartitionOutOfRange { partition: 0, count: 0 })
    ));
}

#[test]
fn test_multiple_partitions() {
    let (_dir, path) = one_video(2).write();
    let image = DhfsImage::open(&path).unwrap();

    assert_eq!(image.partition_count(), 2);
    assert_eq!(image.video_count(), 2);

    let listing = VideoListing::from_image(&image).unwrap();
    assert_eq!(listing.selection(), vec![(0, 1), (1, 1)]);
}

#[test]
fn test_truncated_descriptor_table() {
    let mut image = one_video(1).build();
    // Cut inside the descriptor table of the only partition
    image.truncate(0x4000 + 4 * BLOCK + 40);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cut.img");
    std::fs::write(&path, image).unwrap();

    assert!(matches!(
        DhfsImage::open(&path),
        Err(DhfsError::TruncatedRead { .. })
    ));
}

#[test]
fn test_metadata_summary() {
    let (_dir, path) = one_video(1).write();
    let info = get_filesystem_info(&path).unwrap();

    assert!(info.contains("Block size: 512"));
    assert!(info.contains("Fragment Size: 2048"));
    assert!(info.contains("Partitions: 1"));
    assert!(info.contains("Date range: 2020-03-01 00:00:00 - 2020-03-31 23:59:59"));
    assert!(info.contains("Videos: 1, empty slots: 0, free: 1, dirty: 0"));
}

#[test]
fn test_export_logs() {
    let payload = b"2020-03-09 08:00:00 power on\n2020-03-09 08:00:05 record start\n";
    let (_dir, path) = one_video(1).logs(payload).write();
    let image = DhfsImage::open(&path).unwrap();

    let out = tempfile::tempdir().unwrap();
    let target = out.path().join("logs.bin");
    let exported = image.export_logs(0, &target).unwrap();

    assert_eq!(exported.bytes, payload.len() as u64);
    assert_eq!(std::fs::read(&target).unwrap(), payload);
}

#[test]
fn test_reopen_releases_previous_image() {
    let (_first_dir, first) = one_video(1).write();
    let (_second_dir, second) = one_video(3).write();
    let mut slot = None;

    let image = DhfsImage::reopen(&mut slot, &first, DhfsConfig::default(), &mut Progress::none())
        .unwrap();
    assert_eq!(image.partition_count(), 1);

    let image = DhfsImage::reopen(&mut slot, &second, DhfsConfig::default(), &mut Progress::none())
        .unwrap();
    assert_eq!(image.partition_count(), 3);

    // A failed reopen leaves the slot empty
    let missing = first.with_file_name("missing.img");
    assert!(DhfsImage::reopen(&mut slot, &missing, DhfsConfig::default(), &mut Progress::none())
        .is_err());
    assert!(slot.is_none());
}

#[test]
fn test_debug_config_emits_classification_diagnostics() {
    let (_dir, path) = one_video(1).write();
    let (config, warnings) = DhfsConfig::parse("DEBUG=True\n").unwrap();
    assert!(warnings.is_empty());

    let mut messages = Vec::new();
    {
        let mut progress = Progress::new(|event| messages.push(event.operation.clone()));
        DhfsImage::open_with(&path, config, &mut progress).unwrap();
    }
    assert_eq!(messages.len(), 2);
    assert!(messages[0].starts_with("Partition 0"));
}
