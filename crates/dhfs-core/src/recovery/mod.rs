/// Video export and recovery of unreferenced fragments
use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod assembler;
pub mod carving;
pub mod orphans;
pub mod output;

pub use assembler::{BatchFailure, BatchReport, FragmentSpan, VideoAssembler};
pub use carving::{recover_free, RecoveryReport};
pub use orphans::recover_dirty;
pub use output::{ExportedFile, OutputFile};

use crate::config::CarveSignature;
use crate::error::Result;
use crate::fs::common::ByteSource;
use crate::fs::dhfs::DhfsImage;
use crate::progress::Progress;

/// Which recovery heuristics to run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryMode {
    #[default]
    All,
    FreeOnly,
    DirtyOnly,
}

/// Runs the free-space and dirty-chain heuristics against an open image
pub struct RecoveryEngine<'a, S: ByteSource> {
    image: &'a DhfsImage<S>,
    signature: CarveSignature,
}

impl<'a, S: ByteSource> RecoveryEngine<'a, S> {
    /// Engine using the image's configured carve signature
    pub fn new(image: &'a DhfsImage<S>) -> Self {
        Self {
            image,
            signature: image.config().carve_signature.clone(),
        }
    }

    pub fn with_signature(mut self, signature: CarveSignature) -> Self {
        self.signature = signature;
        self
    }

    pub fn signature(&self) -> &CarveSignature {
        &self.signature
    }

    pub fn recover_free(
        &self,
        partition: usize,
        out_dir: &Path,
        progress: &mut Progress<'_>,
    ) -> Result<RecoveryReport> {
        carving::recover_free(self.image, partition, &self.signature, out_dir, progress)
    }

    pub fn recover_dirty(
        &self,
        partition: usize,
        out_dir: &Path,
        progress: &mut Progress<'_>,
    ) -> Result<RecoveryReport> {
        orphans::recover_dirty(self.image, partition, out_dir, progress)
    }

    /// Carving followed by dirty-chain recovery
    pub fn recover_all(
        &self,
        partition: usize,
        out_dir: &Path,
        progress: &mut Progress<'_>,
    ) -> Result<RecoveryReport> {
        self.recover(partition, RecoveryMode::All, out_dir, progress)
    }

    pub fn recover(
        &self,
        partition: usize,
        mode: RecoveryMode,
        out_dir: &Path,
        progress: &mut Progress<'_>,
    ) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();
        if mode != RecoveryMode::DirtyOnly {
            report.merge(self.recover_free(partition, out_dir, progress)?);
        }
        if mode != RecoveryMode::FreeOnly {
            report.merge(self.recover_dirty(partition, out_dir, progress)?);
        }
        Ok(report)
    }

    /// Run `mode` over every partition of the image
    pub fn recover_image(
        &self,
        mode: RecoveryMode,
        out_dir: &Path,
        progress: &mut Progress<'_>,
    ) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();
        for partition in 0..self.image.partition_count() {
            report.merge(self.recover(partition, mode, out_dir, progress)?);
        }
        tracing::info!("Recovered {} files in total", report.count());
        Ok(report)
    }
}

impl<S: ByteSource> DhfsImage<S> {
    pub fn recovery(&self) -> RecoveryEngine<'_, S> {
        RecoveryEngine::new(self)
    }
}
