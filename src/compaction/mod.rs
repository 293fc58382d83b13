//! # Compaction Module
//!
//! Background maintenance of the on-disk level structure.
//!
//! ## Leveled policy
//!
//! Level 0 receives MemTable flushes directly, so its tables may have
//! overlapping key ranges. Every other level holds non-overlapping
//! tables. Compaction picks work in two ways:
//!
//! - **L0 trigger** — once level 0 accumulates `level0_file_limit`
//!   tables, all of them merge into level 1.
//! - **Size-ratio trigger** — for each level ℓ ≥ 1, if
//!   `size(ℓ) > level_size_ratio · size(ℓ+1)` the whole level merges
//!   into ℓ+1. An empty next level never fires the trigger; level
//!   growth is seeded exclusively by L0 → L1 compaction.
//!
//! A plan always consumes the output level's current tables along with
//! the source level. Rewriting the whole output level keeps levels ≥ 1
//! free of intra-level key overlap, and it is the condition that makes
//! dropping tombstones during the merge safe: no older version of a
//! merged key can survive at or below the output level.
//!
//! ## Execution
//!
//! The [`Compactor`](compactor::Compactor) merge-sorts all input
//! tables, keeps only the newest version of each key, drops
//! tombstones (safe while plans always consume an entire level), and
//! splits the output into tables of at most 64 MiB. Failures delete
//! every partial output; a panic inside the merge is downgraded to an
//! error with the same cleanup.
//!
//! The strategy/executor split mirrors the engine's worker structure:
//! a [`CompactionStrategy`] decides *what* to merge under the engine's
//! read lock, the executor does the heavy lifting without any lock,
//! and the engine publishes the result copy-on-write.

pub mod compactor;

#[cfg(test)]
mod tests;

pub use compactor::Compactor;

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::sstable::{SsTableError, Table};

// ------------------------------------------------------------------------------------------------
// Options
// ------------------------------------------------------------------------------------------------

/// Tuning knobs for the leveled compaction policy.
#[derive(Debug, Clone)]
pub struct LeveledOptions {
    /// Number of L0 tables that triggers an L0 → L1 merge.
    pub level0_file_limit: usize,

    /// A level compacts into the next one when it outweighs it by this
    /// factor.
    pub level_size_ratio: f64,

    /// Total number of levels the engine maintains.
    pub max_levels: usize,
}

impl Default for LeveledOptions {
    fn default() -> Self {
        Self {
            level0_file_limit: 4,
            level_size_ratio: 10.0,
            max_levels: 7,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors produced while executing a compaction.
#[derive(Debug, Error)]
pub enum CompactionError {
    /// Reading an input table or writing an output table failed.
    #[error("SSTable error: {0}")]
    SsTable(#[from] SsTableError),

    /// Underlying filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The merge panicked; partial outputs were deleted.
    #[error("compaction panicked: {0}")]
    Panicked(String),

    /// Deleting superseded table files failed for at least one file.
    #[error("cleanup failed: {0}")]
    Cleanup(String),
}

// ------------------------------------------------------------------------------------------------
// Strategy
// ------------------------------------------------------------------------------------------------

/// A unit of compaction work: merge `inputs` into `output_level`.
pub struct CompactionPlan {
    /// The level whose overflow triggered this plan.
    pub source_level: u32,

    /// The level the merged output tables are written to.
    pub output_level: u32,

    /// Tables to merge — the entire source level plus the entire
    /// output level, ordered older-level-first. The handles stay
    /// readable until the engine publishes the replacement.
    pub inputs: Vec<Arc<dyn Table>>,
}

/// Decides which tables to merge next, if any.
///
/// `select` runs under the engine's read lock and must only inspect
/// the level structure — the heavy lifting happens afterwards in the
/// [`Compactor`] without any lock held.
pub trait CompactionStrategy: Send + Sync {
    /// Returns the next plan, or `None` when no trigger fires.
    fn select(&self, levels: &[Vec<Arc<dyn Table>>]) -> Option<CompactionPlan>;
}

/// The leveled policy described in the module docs.
pub struct LeveledStrategy {
    options: LeveledOptions,
}

impl LeveledStrategy {
    /// Creates a strategy with the given options.
    pub fn new(options: LeveledOptions) -> Self {
        Self { options }
    }
}

impl CompactionStrategy for LeveledStrategy {
    fn select(&self, levels: &[Vec<Arc<dyn Table>>]) -> Option<CompactionPlan> {
        if levels.is_empty() {
            return None;
        }

        if levels[0].len() >= self.options.level0_file_limit {
            return Some(plan_for(levels, 0));
        }

        for level in 1..levels.len().saturating_sub(1) {
            if levels[level].is_empty() {
                continue;
            }
            let size = level_size(&levels[level]) as f64;
            let next_size = level_size(&levels[level + 1]) as f64;

            // An empty next level never fires; L0 → L1 compaction has
            // to seed it first.
            if next_size > 0.0 && size > self.options.level_size_ratio * next_size {
                return Some(plan_for(levels, level));
            }
        }

        None
    }
}

/// Builds the plan merging `source` and `source + 1` into `source + 1`.
/// Inputs are ordered older-level-first so that, after the executor
/// reverses them, newer tables win merge ties.
fn plan_for(levels: &[Vec<Arc<dyn Table>>], source: usize) -> CompactionPlan {
    let output = source + 1;
    let mut inputs: Vec<Arc<dyn Table>> = Vec::new();
    if let Some(output_tables) = levels.get(output) {
        inputs.extend(output_tables.iter().cloned());
    }
    inputs.extend(levels[source].iter().cloned());

    CompactionPlan {
        source_level: source as u32,
        output_level: output as u32,
        inputs,
    }
}

/// Sum of the on-disk byte sizes of a level's tables.
pub fn level_size(tables: &[Arc<dyn Table>]) -> u64 {
    tables.iter().map(|table| table.file_size()).sum()
}
