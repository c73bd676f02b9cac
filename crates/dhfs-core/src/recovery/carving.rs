//! Signature carving over free fragments
//!
//! Free fragments are scanned in ascending index order. A fragment whose
//! leading bytes match the carve signature starts a new output file; any other
//! fragment extends the file currently open, or is skipped when none is.
//! A file left incomplete by a failed read or write is removed.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::assembler::BatchFailure;
use super::output::{carved_file_name, ExportedFile, OutputFile};
use crate::config::CarveSignature;
use crate::error::{DhfsError, Result};
use crate::fs::common::ByteSource;
use crate::fs::dhfs::DhfsImage;
use crate::progress::{Progress, ProgressEvent};

/// Files produced by a recovery pass
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub files: Vec<ExportedFile>,
    pub failed: Vec<BatchFailure>,
}

impl RecoveryReport {
    pub fn count(&self) -> usize {
        self.files.len()
    }

    pub fn merge(&mut self, other: RecoveryReport) {
        self.files.extend(other.files);
        self.failed.extend(other.failed);
    }

    /// Record an output failure and keep going; medium failures abort
    pub(crate) fn record(&mut self, partition: usize, descriptor: u32, error: DhfsError) -> Result<()> {
        if error.is_medium_error() {
            return Err(error);
        }
        tracing::warn!(
            "Recovery of fragment {} in partition {} failed: {}",
            descriptor,
            partition,
            error
        );
        self.failed.push(BatchFailure {
            partition,
            descriptor,
            error: error.to_string(),
        });
        Ok(())
    }
}

/// Output file under construction plus the fragment that opened it
struct OpenCarve {
    start: u32,
    output: Option<OutputFile>,
}

/// Carve recordings out of the free fragments of `partition`
pub fn recover_free<S: ByteSource>(
    image: &DhfsImage<S>,
    partition: usize,
    signature: &CarveSignature,
    out_dir: &Path,
    progress: &mut Progress<'_>,
) -> Result<RecoveryReport> {
    let free = image.free_fragments(partition)?;
    let mut report = RecoveryReport::default();
    let mut current: Option<OpenCarve> = None;

    tracing::info!(
        "Carving {} free fragments of partition {} for {}",
        free.len(),
        partition,
        signature
    );

    for (position, &index) in free.iter().enumerate() {
        let data = match image.read_fragment(partition, index) {
            Ok(data) => data,
            Err(e) => {
                if let Some(output) = current.take().and_then(|open| open.output) {
                    output.discard();
                }
                return Err(e);
            }
        };

        if signature.matches(data) {
            if let Some(open) = current.take() {
                close(open, partition, &mut report)?;
            }

            let name = carved_file_name(partition, index);
            progress.emit(ProgressEvent::with_percent(
                format!("Saving {}", name),
                (position + 1) as f32 * 100.0 / free.len() as f32,
            ));

            // A file that cannot be created still swallows the fragments
            // belonging to it, so they do not leak into the previous file.
            let output = match OutputFile::create(&out_dir.join(&name)) {
                Ok(output) => Some(output),
                Err(e) => {
                    report.record(partition, index, e)?;
                    None
                }
            };
            current = Some(OpenCarve { start: index, output });
        }

        if let Some(open) = current.as_mut() {
            if let Some(output) = open.output.as_mut() {
                if let Err(e) = output.append(data) {
                    if let Some(output) = open.output.take() {
                        output.discard();
                    }
                    report.record(partition, open.start, e)?;
                }
            }
        }
    }

    if let Some(open) = current.take() {
        close(open, partition, &mut report)?;
    }

    tracing::info!(
        "Carved {} files from partition {}",
        report.count(),
        partition
    );
    Ok(report)
}

fn close(open: OpenCarve, partition: usize, report: &mut RecoveryReport) -> Result<()> {
    let Some(output) = open.output else {
        return Ok(());
    };

    match output.finish() {
        Ok(file) => {
            tracing::debug!("Closed {} ({} bytes)", file.path.display(), file.bytes);
            report.files.push(file);
            Ok(())
        }
        Err(e) => report.record(partition, open.start, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_merge() {
        let mut report = RecoveryReport::default();
        let mut other = RecoveryReport::default();
        other.failed.push(BatchFailure {
            partition: 0,
            descriptor: 3,
            error: "disk full".to_string(),
        });

        report.merge(other);
        assert_eq!(report.count(), 0);
        assert_eq!(report.failed.len(), 1);
    }

    #[test]
    fn test_medium_errors_abort() {
        let mut report = RecoveryReport::default();
        let error = DhfsError::TruncatedRead {
            offset: 0,
            length: 1,
            size: 0,
        };
        assert!(report.record(0, 1, error).is_err());
        assert!(report.failed.is_empty());
    }
}
