//! Classification of a partition's descriptors
//!
//! Every descriptor lands in exactly one [`FragmentClass`]. Live chains are
//! computed first since dirty continuations are defined against them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use super::descriptor::{DescriptorTable, DescriptorType};
use crate::error::DhfsError;
use crate::progress::Progress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FragmentClass {
    /// Main descriptor with a recording
    LiveMain,
    /// Main descriptor whose begin and end timestamps are equal
    EmptyMain,
    /// Continuation present in the live chain of its own main descriptor
    LinkedContinuation,
    /// Continuation orphaned from any live chain
    DirtyContinuation,
    Free,
    Unknown,
}

/// A live chain whose walk is longer than its declared fragment count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainMismatch {
    pub main_index: u32,
    pub declared: u32,
    pub walked: u32,
}

/// A main descriptor whose chain could not be walked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokenChain {
    pub main_index: u32,
    pub reason: String,
}

/// Immutable classification snapshot of one partition
#[derive(Debug, Clone)]
pub struct PartitionView {
    table: DescriptorTable,
    live_chains: BTreeMap<u32, Vec<u32>>,
    linked: HashSet<u32>,
    empty_mains: Vec<u32>,
    free: Vec<u32>,
    dirty: Vec<u32>,
    unknown: Vec<u32>,
    overlong: Vec<ChainMismatch>,
    broken: Vec<BrokenChain>,
}

impl PartitionView {
    /// Classify every descriptor of `table`. With `debug` set, phase
    /// diagnostics are also sent to `progress`.
    pub fn build(table: DescriptorTable, progress: &mut Progress<'_>, debug: bool) -> Self {
        let partition = table.partition();
        let mut diagnostic = |message: String| {
            tracing::debug!("{}", message);
            if debug {
                progress.message(message);
            }
        };

        diagnostic(format!("Partition {}: linking fragments to main descriptors", partition));
        let mut live_chains = BTreeMap::new();
        let mut empty_mains = Vec::new();
        let mut overlong = Vec::new();
        let mut broken = Vec::new();

        for (index, desc) in table.iter() {
            if !desc.is_main() {
                continue;
            }
            if !desc.has_recording() {
                empty_mains.push(index);
                continue;
            }

            match table.chain_of(index) {
                Ok(chain) => {
                    let declared = desc.frag_field as u32 + 1;
                    if chain.len() as u32 > declared {
                        tracing::warn!(
                            "Video {} in partition {} has {} fragments but declares {}; exports use the walked chain",
                            index,
                            partition,
                            chain.len(),
                            declared
                        );
                        overlong.push(ChainMismatch {
                            main_index: index,
                            declared,
                            walked: chain.len() as u32,
                        });
                    }
                    live_chains.insert(index, chain);
                }
                Err(e) => {
                    tracing::warn!("Skipping video {} in partition {}: {}", index, partition, e);
                    broken.push(BrokenChain {
                        main_index: index,
                        reason: e.to_string(),
                    });
                }
            }
        }

        diagnostic(format!("Partition {}: collecting free and dirty fragments", partition));
        let mut linked = HashSet::new();
        let mut free = Vec::new();
        let mut dirty = Vec::new();
        let mut unknown = Vec::new();

        for (index, desc) in table.iter() {
            match desc.desc_type {
                DescriptorType::Free => free.push(index),
                DescriptorType::Continuation => {
                    let in_own_chain = live_chains
                        .get(&desc.begin_index)
                        .is_some_and(|chain| chain.contains(&index));
                    if in_own_chain {
                        linked.insert(index);
                    } else {
                        dirty.push(index);
                    }
                }
                DescriptorType::Unknown(_) => unknown.push(index),
                DescriptorType::Main => {}
            }
        }

        tracing::info!(
            "Partition {}: {} videos, {} empty slots, {} free, {} dirty, {} unknown",
            partition,
            live_chains.len(),
            empty_mains.len(),
            free.len(),
            dirty.len(),
            unknown.len()
        );

        PartitionView {
            table,
            live_chains,
            linked,
            empty_mains,
            free,
            dirty,
            unknown,
            overlong,
            broken,
        }
    }

    pub fn table(&self) -> &DescriptorTable {
        &self.table
    }

    /// Live main descriptor indices, ascending
    pub fn main_indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.live_chains.keys().copied()
    }

    pub fn video_count(&self) -> usize {
        self.live_chains.len()
    }

    /// Walked chain of a live video
    pub fn chain(&self, main_index: u32) -> Option<&[u32]> {
        self.live_chains.get(&main_index).map(Vec::as_slice)
    }

    pub fn free_fragments(&self) -> &[u32] {
        &self.free
    }

    pub fn dirty_fragments(&self) -> &[u32] {
        &self.dirty
    }

    pub fn empty_mains(&self) -> &[u32] {
        &self.empty_mains
    }

    pub fn unknown_fragments(&self) -> &[u32] {
        &self.unknown
    }

    pub fn overlong_chains(&self) -> &[ChainMismatch] {
        &self.overlong
    }

    pub fn broken_chains(&self) -> &[BrokenChain] {
        &self.broken
    }

    pub fn classify(&self, index: u32) -> Result<FragmentClass, DhfsError> {
        let desc = self.table.get(index)?;
        Ok(match desc.desc_type {
            DescriptorType::Free => FragmentClass::Free,
            DescriptorType::Main if desc.has_recording() => FragmentClass::LiveMain,
            DescriptorType::Main => FragmentClass::EmptyMain,
            DescriptorType::Continuation if self.linked.contains(&index) => {
                FragmentClass::LinkedContinuation
            }
            DescriptorType::Continuation => FragmentClass::DirtyContinuation,
            DescriptorType::Unknown(_) => FragmentClass::Unknown,
        })
    }
}
