//! Video reconstruction from live fragment chains
//!
//! Every fragment of a chain is copied whole except the last one, which holds
//! only `last_fragment_size` bytes of video. The rest of the last fragment is
//! slack and can be extracted separately.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

use super::output::{slack_file_name, video_file_name, ExportedFile, OutputFile};
use crate::error::{DhfsError, Result};
use crate::fs::common::ByteSource;
use crate::fs::dhfs::DhfsImage;
use crate::progress::{Progress, ProgressEvent};

/// A byte range inside one fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentSpan {
    pub fragment: u32,
    pub start: u64,
    pub length: u64,
}

/// Outcome of a multi-video export
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub exported: Vec<ExportedFile>,
    /// Videos with nothing to export (slack exports only)
    pub skipped: Vec<(usize, u32)>,
    pub failed: Vec<BatchFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFailure {
    pub partition: usize,
    pub descriptor: u32,
    pub error: String,
}

pub struct VideoAssembler<'a, S: ByteSource> {
    image: &'a DhfsImage<S>,
}

impl<'a, S: ByteSource> VideoAssembler<'a, S> {
    pub fn new(image: &'a DhfsImage<S>) -> Self {
        Self { image }
    }

    fn live_chain(&self, partition: usize, main_index: u32) -> Result<&'a [u32]> {
        let chain = self
            .image
            .partition(partition)?
            .view()
            .chain(main_index)
            .ok_or(DhfsError::NotAVideo {
                partition,
                descriptor: main_index,
            })?;

        if chain.is_empty() {
            return Err(DhfsError::MalformedChain {
                partition,
                descriptor: main_index,
                steps: 0,
            });
        }
        Ok(chain)
    }

    /// Byte ranges making up the video started by `main_index`
    pub fn video_plan(&self, partition: usize, main_index: u32) -> Result<Vec<FragmentSpan>> {
        let chain = self.live_chain(partition, main_index)?;
        let part = self.image.partition(partition)?;
        let fragment_size = part.superblock().fragment_size;
        let last_size = part.table().last_fragment_size(main_index)?;

        let last = chain.len() - 1;
        Ok(chain
            .iter()
            .enumerate()
            .map(|(position, &fragment)| FragmentSpan {
                fragment,
                start: 0,
                length: if position == last { last_size } else { fragment_size },
            })
            .collect())
    }

    /// Slack range of the final fragment, `None` when there is no slack
    pub fn slack_plan(&self, partition: usize, main_index: u32) -> Result<Option<FragmentSpan>> {
        let chain = self.live_chain(partition, main_index)?;
        let table = self.image.partition(partition)?.table();
        let last_size = table.last_fragment_size(main_index)?;
        let slack = table.slack_size(main_index)?;

        if slack == 0 {
            return Ok(None);
        }

        Ok(chain.last().map(|&fragment| FragmentSpan {
            fragment,
            start: last_size,
            length: slack,
        }))
    }

    /// Stream the video to `writer`, reporting after each fragment.
    /// Returns the number of bytes written.
    pub fn stream_video<W: Write>(
        &self,
        partition: usize,
        main_index: u32,
        writer: &mut W,
        label: &str,
        progress: &mut Progress<'_>,
    ) -> Result<u64> {
        let plan = self.video_plan(partition, main_index)?;
        let total = plan.len();
        let mut written = 0u64;

        for (position, span) in plan.iter().enumerate() {
            let data = self
                .image
                .fragment_bytes(partition, span.fragment, span.start, span.length)?;
            writer.write_all(data)?;
            written += data.len() as u64;

            progress.emit(ProgressEvent::with_percent(
                format!("Saving {}", label),
                (position + 1) as f32 * 100.0 / total as f32,
            ));
        }

        tracing::debug!(
            "Streamed video {} of partition {}: {} fragments, {} bytes",
            main_index,
            partition,
            total,
            written
        );
        Ok(written)
    }

    /// Write the video started by `main_index` into `out_dir`
    pub fn export_video(
        &self,
        partition: usize,
        main_index: u32,
        out_dir: &Path,
        progress: &mut Progress<'_>,
    ) -> Result<ExportedFile> {
        let desc = self.image.descriptor(partition, main_index)?;
        let name = video_file_name(partition, main_index, desc);
        let path = out_dir.join(&name);

        // Validate the chain before creating the file
        self.live_chain(partition, main_index)?;

        let mut output = OutputFile::create(&path)?;
        if let Err(e) = self.stream_video(partition, main_index, &mut output, &name, progress) {
            output.discard();
            return Err(match e {
                DhfsError::Io(source) => DhfsError::output(&path, source),
                other => other,
            });
        }
        let exported = output.finish()?;

        tracing::info!("Saved {} ({} bytes)", name, exported.bytes);
        Ok(exported)
    }

    /// Write the slack of the video's final fragment into `out_dir`.
    /// `Ok(None)` means there was no slack to export.
    pub fn export_slack(
        &self,
        sequence: usize,
        partition: usize,
        main_index: u32,
        out_dir: &Path,
        progress: &mut Progress<'_>,
    ) -> Result<Option<ExportedFile>> {
        let span = match self.slack_plan(partition, main_index)? {
            Some(span) => span,
            None => {
                tracing::debug!("Video {} of partition {} has no slack", main_index, partition);
                return Ok(None);
            }
        };

        let desc = self.image.descriptor(partition, main_index)?;
        let name = slack_file_name(sequence, partition, main_index, desc);
        let data = self
            .image
            .fragment_bytes(partition, span.fragment, span.start, span.length)?;

        progress.message(format!("Saving {}", name));
        let exported = OutputFile::write_chunks(&out_dir.join(&name), [data])?;

        tracing::info!("Saved slack {} ({} bytes)", name, exported.bytes);
        Ok(Some(exported))
    }

    /// Export several videos. A failure confined to one item is recorded and
    /// the batch continues; a failure reading the medium aborts it.
    pub fn export_videos(
        &self,
        selection: &[(usize, u32)],
        out_dir: &Path,
        progress: &mut Progress<'_>,
    ) -> Result<BatchReport> {
        let mut report = BatchReport::default();

        for &(partition, index) in selection {
            match self.export_video(partition, index, out_dir, progress) {
                Ok(exported) => report.exported.push(exported),
                Err(e) => record_failure(&mut report, partition, index, e)?,
            }
        }

        Ok(report)
    }

    /// Export the slack of several videos; files are numbered by selection order
    pub fn export_slacks(
        &self,
        selection: &[(usize, u32)],
        out_dir: &Path,
        progress: &mut Progress<'_>,
    ) -> Result<BatchReport> {
        let mut report = BatchReport::default();

        for (sequence, &(partition, index)) in selection.iter().enumerate() {
            match self.export_slack(sequence, partition, index, out_dir, progress) {
                Ok(Some(exported)) => report.exported.push(exported),
                Ok(None) => report.skipped.push((partition, index)),
                Err(e) => record_failure(&mut report, partition, index, e)?,
            }
        }

        Ok(report)
    }
}

fn record_failure(
    report: &mut BatchReport,
    partition: usize,
    descriptor: u32,
    error: DhfsError,
) -> Result<()> {
    if error.is_medium_error() {
        return Err(error);
    }

    tracing::warn!(
        "Export of video {} in partition {} failed: {}",
        descriptor,
        partition,
        error
    );
    report.failed.push(BatchFailure {
        partition,
        descriptor,
        error: error.to_string(),
    });
    Ok(())
}

impl<S: ByteSource> DhfsImage<S> {
    pub fn assembler(&self) -> VideoAssembler<'_, S> {
        VideoAssembler::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DhfsConfig;
    use crate::fs::dhfs::descriptor::tests::raw_descriptor;
    use crate::fs::dhfs::descriptor::DESCRIPTOR_SIZE;
    use byteorder::{ByteOrder, LittleEndian};

    const BLOCK: usize = 512;
    const FRAGMENT: usize = 4 * BLOCK;

    /// One partition at offset 0x8000: superblock at +0x400, descriptors at
    /// +0x800, video data at +0x1000, with fragment `i` filled with byte `i`.
    fn image(records: &[[u8; DESCRIPTOR_SIZE]]) -> DhfsImage<Vec<u8>> {
        let base = 0x8000;
        let count = records.len();
        let mut data = vec![0u8; base + 0x1000 + count * FRAGMENT];

        data[..7].copy_from_slice(b"DHFS4.1");
        let entry = 0x3C00 + 0x34;
        LittleEndian::write_u32(&mut data[entry + 20..], 2);
        LittleEndian::write_u64(&mut data[entry + 48..], (base / BLOCK) as u64);
        data[entry + 64..entry + 68].copy_from_slice(&[0xAA, 0x55, 0xAA, 0x55]);

        let sb = base + 0x400;
        LittleEndian::write_u32(&mut data[sb + 0x2C..], BLOCK as u32);
        LittleEndian::write_u32(&mut data[sb + 0x30..], 4);
        LittleEndian::write_u32(&mut data[sb + 0x44..], 4);
        LittleEndian::write_u32(&mut data[sb + 0x48..], 8);
        LittleEndian::write_u32(&mut data[sb + 0x4C..], count as u32);

        for (i, record) in records.iter().enumerate() {
            let at = base + 0x800 + i * DESCRIPTOR_SIZE;
            data[at..at + DESCRIPTOR_SIZE].copy_from_slice(record);
            let frag = base + 0x1000 + i * FRAGMENT;
            data[frag..frag + FRAGMENT].fill(i as u8);
        }

        DhfsImage::from_source(data, DhfsConfig::default(), &mut Progress::none()).unwrap()
    }

    fn two_fragment_video() -> DhfsImage<Vec<u8>> {
        image(&[
            [0u8; DESCRIPTOR_SIZE],
            raw_descriptor(1, 1, (1, 2), 2, 1, 0),
            raw_descriptor(2, 1, (1, 2), 0, 0, 1),
            raw_descriptor(1, 0, (3, 3), 0, 4, 0),
        ])
    }

    #[test]
    fn test_stream_video_size_identity() {
        let image = two_fragment_video();
        let mut buffer = Vec::new();
        let mut events = 0;
        let written = {
            let mut progress = Progress::new(|_| events += 1);
            image
                .assembler()
                .stream_video(0, 1, &mut buffer, "video", &mut progress)
                .unwrap()
        };

        assert_eq!(written as usize, FRAGMENT + BLOCK);
        assert_eq!(buffer.len(), FRAGMENT + BLOCK);
        assert!(buffer[..FRAGMENT].iter().all(|&b| b == 1));
        assert!(buffer[FRAGMENT..].iter().all(|&b| b == 2));
        assert_eq!(events, 2);
        assert_eq!(image.video_size(0, 1).unwrap(), written);
    }

    #[test]
    fn test_slack_plan() {
        let image = two_fragment_video();
        let assembler = image.assembler();

        assert_eq!(
            assembler.slack_plan(0, 1).unwrap(),
            Some(FragmentSpan { fragment: 2, start: BLOCK as u64, length: 3 * BLOCK as u64 })
        );
    }

    #[test]
    fn test_empty_slot_is_not_a_video() {
        let image = two_fragment_video();
        assert!(matches!(
            image.assembler().video_plan(0, 3),
            Err(DhfsError::NotAVideo { descriptor: 3, .. })
        ));
    }

    #[test]
    fn test_batch_continues_after_item_failure() {
        let image = two_fragment_video();
        let dir = tempfile::tempdir().unwrap();

        let report = image
            .assembler()
            .export_videos(&[(0, 3), (0, 1), (4, 1)], dir.path(), &mut Progress::none())
            .unwrap();

        assert_eq!(report.exported.len(), 1);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.exported[0].bytes as usize, FRAGMENT + BLOCK);
    }

    #[test]
    fn test_slack_export_skips_full_fragments() {
        let image = image(&[
            [0u8; DESCRIPTOR_SIZE],
            raw_descriptor(1, 0, (1, 2), 0, 4, 0),
        ]);
        let dir = tempfile::tempdir().unwrap();

        let report = image
            .assembler()
            .export_slacks(&[(0, 1)], dir.path(), &mut Progress::none())
            .unwrap();

        assert!(report.exported.is_empty());
        assert_eq!(report.skipped, vec![(0, 1)]);
    }
}
