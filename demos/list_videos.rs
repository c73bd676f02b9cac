//! Open a DHFS4.1 image and list its recordings
//!
//! Run with: cargo run --example list_videos -- path/to/dvr.img

use dhfs_core::{DhfsImage, Progress, VideoListing};
use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    let image_path = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => {
            eprintln!("Usage: list_videos <image>");
            return Ok(());
        }
    };

    if !image_path.exists() {
        eprintln!("Image not found: {}", image_path.display());
        return Ok(());
    }

    println!("DHFS4.1 Video Listing");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let mut progress = Progress::new(|event| println!("  {}", event));
    let image = DhfsImage::open_with(&image_path, Default::default(), &mut progress)?;
    println!("{}", image.metadata_summary());

    let listing = VideoListing::from_image(&image)?;
    for video in &listing.records {
        println!(
            "p{} #{:06} {} {}-{} ch{} {}",
            video.partition,
            video.descriptor,
            video.date,
            video.start,
            video.end,
            video.camera_label(),
            video.size_mb()
        );
    }

    println!();
    println!("Videos: {}", listing.len());
    for partition in image.partitions() {
        let view = partition.view();
        println!(
            "Partition {}: {} free fragments, {} dirty fragments",
            partition.index,
            view.free_fragments().len(),
            view.dirty_fragments().len()
        );
    }

    Ok(())
}
