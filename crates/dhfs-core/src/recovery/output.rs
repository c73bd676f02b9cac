/// Output files written by exports and recovery, hashed as they are written
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{DhfsError, Result};
use crate::fs::dhfs::descriptor::Descriptor;

/// A finished output file with its SHA-256
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedFile {
    pub path: PathBuf,
    pub bytes: u64,
    pub sha256: String,
    pub exported_at: DateTime<Utc>,
}

/// An output file being written
pub struct OutputFile {
    path: PathBuf,
    writer: BufWriter<File>,
    hasher: Sha256,
    bytes: u64,
}

impl OutputFile {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| DhfsError::output(path, e))?;
        Ok(OutputFile {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            hasher: Sha256::new(),
            bytes: 0,
        })
    }

    /// Write `chunks` to a new file at `path`; nothing is left on failure
    pub fn write_chunks<'d>(
        path: &Path,
        chunks: impl IntoIterator<Item = &'d [u8]>,
    ) -> Result<ExportedFile> {
        let mut output = OutputFile::create(path)?;
        for data in chunks {
            if let Err(e) = output.append(data) {
                output.discard();
                return Err(e);
            }
        }
        output.finish()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    /// Append `data`, mapping failures to [`DhfsError::OutputIo`]
    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        self.write_all(data)
            .map_err(|e| DhfsError::output(&self.path, e))
    }

    /// Flush and close the file. A file that cannot be flushed is removed.
    pub fn finish(mut self) -> Result<ExportedFile> {
        if let Err(e) = self.writer.flush() {
            let error = DhfsError::output(&self.path, e);
            self.discard();
            return Err(error);
        }

        Ok(ExportedFile {
            path: self.path,
            bytes: self.bytes,
            sha256: format!("{:x}", self.hasher.finalize()),
            exported_at: Utc::now(),
        })
    }

    /// Close and delete a file that could not be completed
    pub fn discard(self) {
        let OutputFile { path, writer, .. } = self;
        drop(writer);
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::debug!("Removed incomplete {}", path.display()),
            Err(e) => tracing::warn!("Failed to remove incomplete {}: {}", path.display(), e),
        }
    }
}

impl Write for OutputFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.writer.write(buf)?;
        self.hasher.update(&buf[..written]);
        self.bytes += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

fn camera_tag(desc: &Descriptor) -> String {
    format!("ch{:02}", desc.camera())
}

/// `Video-p{P}-{D:06}-{YYYYMMDD}-{HHMMSS}-{HHMMSS}-ch{CC}.h264`
pub fn video_file_name(partition: usize, index: u32, desc: &Descriptor) -> String {
    format!(
        "Video-p{}-{:06}-{}-{}-{}-{}.h264",
        partition,
        index,
        desc.begin_time().compact_date(),
        desc.begin_time().compact_time(),
        desc.end_time().compact_time(),
        camera_tag(desc)
    )
}

/// `{N:04}-Slack-p{P}-{D:06}-{YYYYMMDD}-{HHMMSS}-{HHMMSS}-ch{CC}.h264`
pub fn slack_file_name(sequence: usize, partition: usize, index: u32, desc: &Descriptor) -> String {
    format!(
        "{:04}-Slack-p{}-{:06}-{}-{}-{}-{}.h264",
        sequence,
        partition,
        index,
        desc.begin_time().compact_date(),
        desc.begin_time().compact_time(),
        desc.end_time().compact_time(),
        camera_tag(desc)
    )
}

/// `FragFree-p{P}-{D:06}.h264`
pub fn carved_file_name(partition: usize, index: u32) -> String {
    format!("FragFree-p{}-{:06}.h264", partition, index)
}

/// `FragDirty-p{P}-{D:06}-{YYYYMMDD}-{HHMMSS}-ch{CC}.h264`
pub fn dirty_file_name(partition: usize, index: u32, desc: &Descriptor) -> String {
    format!(
        "FragDirty-p{}-{:06}-{}-{}-{}.h264",
        partition,
        index,
        desc.begin_time().compact_date(),
        desc.begin_time().compact_time(),
        camera_tag(desc)
    )
}
