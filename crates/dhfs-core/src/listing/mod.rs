/// Listing of the live videos of an image
///
/// One row per live main descriptor, with optional date/camera filtering and
/// CSV or JSON export of the selected rows.
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::Result;
use crate::fs::common::ByteSource;
use crate::fs::dhfs::DhfsImage;

/// One live video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub partition: usize,
    pub descriptor: u32,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM:SS`
    pub start: String,
    pub end: String,
    pub camera: i32,
    /// Declared size in bytes
    pub size: u64,
}

impl VideoRecord {
    /// Size as shown to users, e.g. `1.50 MB`
    pub fn size_mb(&self) -> String {
        format!("{:.2} MB", self.size as f64 / (1024.0 * 1024.0))
    }

    pub fn camera_label(&self) -> String {
        format!("{:02}", self.camera)
    }
}

/// Row selection; `None` matches everything
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingFilter {
    pub date: Option<String>,
    pub camera: Option<i32>,
}

impl ListingFilter {
    pub fn matches(&self, record: &VideoRecord) -> bool {
        self.date.as_ref().map_or(true, |date| *date == record.date)
            && self.camera.map_or(true, |camera| camera == record.camera)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoListing {
    pub records: Vec<VideoRecord>,
}

pub const CSV_HEADER: &str = "Partition;Descriptor;Date;Start;End;Camera;Size";

impl VideoListing {
    /// Collect every live video, partition by partition in ascending index order
    pub fn from_image<S: ByteSource>(image: &DhfsImage<S>) -> Result<Self> {
        let mut records = Vec::with_capacity(image.video_count());

        for part in image.partitions() {
            for index in part.view().main_indices() {
                let desc = part.table().get(index)?;
                let begin = desc.begin_time();

                records.push(VideoRecord {
                    partition: part.index,
                    descriptor: index,
                    date: begin.date_string(),
                    start: begin.time_string(),
                    end: desc.end_time().time_string(),
                    camera: desc.camera(),
                    size: part.table().video_size(index)?,
                });
            }
        }

        tracing::debug!("Listed {} videos", records.len());
        Ok(VideoListing { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct recording dates, sorted
    pub fn dates(&self) -> Vec<String> {
        let dates: BTreeSet<&str> = self.records.iter().map(|r| r.date.as_str()).collect();
        dates.into_iter().map(str::to_string).collect()
    }

    /// Distinct cameras, sorted
    pub fn cameras(&self) -> Vec<i32> {
        let cameras: BTreeSet<i32> = self.records.iter().map(|r| r.camera).collect();
        cameras.into_iter().collect()
    }

    pub fn filter(&self, filter: &ListingFilter) -> VideoListing {
        VideoListing {
            records: self
                .records
                .iter()
                .filter(|r| filter.matches(r))
                .cloned()
                .collect(),
        }
    }

    /// `(partition, descriptor)` pairs for batch export
    pub fn selection(&self) -> Vec<(usize, u32)> {
        self.records
            .iter()
            .map(|r| (r.partition, r.descriptor))
            .collect()
    }

    pub fn total_size(&self) -> u64 {
        self.records.iter().map(|r| r.size).sum()
    }

    /// Export as JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.records)
    }

    /// Export as `;`-separated CSV
    pub fn to_csv(&self) -> String {
        let mut csv = format!("{}\n", CSV_HEADER);
        for record in &self.records {
            csv.push_str(&format!(
                "{};{};{};{};{};{};{}\n",
                record.partition,
                record.descriptor,
                record.date,
                record.start,
                record.end,
                record.camera_label(),
                record.size_mb()
            ));
        }
        csv
    }
}
