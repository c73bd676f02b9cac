//! Orphan-chain reconstruction over dirty fragments
//!
//! Dirty continuations are left behind by overwritten or deleted recordings.
//! Each not-yet-emitted dirty fragment starts an output file which then
//! follows `next_index` for as long as the chain stays with the same
//! `begin_index`.

use std::collections::HashSet;
use std::path::Path;

use super::carving::RecoveryReport;
use super::output::{dirty_file_name, OutputFile};
use crate::error::Result;
use crate::fs::common::ByteSource;
use crate::fs::dhfs::descriptor::is_chain_end;
use crate::fs::dhfs::DhfsImage;
use crate::progress::{Progress, ProgressEvent};

/// Reassemble orphaned chains from the dirty fragments of `partition`
pub fn recover_dirty<S: ByteSource>(
    image: &DhfsImage<S>,
    partition: usize,
    out_dir: &Path,
    progress: &mut Progress<'_>,
) -> Result<RecoveryReport> {
    let part = image.partition(partition)?;
    let table = part.table();
    let dirty = part.view().dirty_fragments();

    let mut report = RecoveryReport::default();
    let mut emitted: HashSet<u32> = HashSet::with_capacity(dirty.len());

    tracing::info!(
        "Rebuilding orphan chains from {} dirty fragments of partition {}",
        dirty.len(),
        partition
    );

    for (position, &start) in dirty.iter().enumerate() {
        if emitted.contains(&start) {
            continue;
        }

        let desc = table.get(start)?;
        let begin = desc.begin_index;

        // Collect the run before touching the output so a read error cannot
        // leave a half-written file behind
        let mut run = vec![start];
        emitted.insert(start);
        let mut next = desc.next_index;

        while !is_chain_end(next) {
            let Ok(next_desc) = table.get(next) else {
                tracing::warn!(
                    "Orphan chain from {} in partition {} points past the table at {}",
                    start,
                    partition,
                    next
                );
                break;
            };
            if next_desc.begin_index != begin || emitted.contains(&next) {
                break;
            }

            run.push(next);
            emitted.insert(next);
            next = next_desc.next_index;
        }

        let name = dirty_file_name(partition, start, desc);
        progress.emit(ProgressEvent::with_percent(
            format!("Saving {}", name),
            (position + 1) as f32 * 100.0 / dirty.len() as f32,
        ));
        tracing::debug!("Orphan chain {}: {:?}", name, run);

        let fragments = run
            .iter()
            .map(|&index| image.read_fragment(partition, index))
            .collect::<Result<Vec<_>>>()?;

        let written = OutputFile::write_chunks(&out_dir.join(&name), fragments.iter().copied());

        match written {
            Ok(file) => report.files.push(file),
            Err(e) => report.record(partition, start, e)?,
        }
    }

    tracing::info!(
        "Rebuilt {} orphan chains from partition {}",
        report.count(),
        partition
    );
    Ok(report)
}
