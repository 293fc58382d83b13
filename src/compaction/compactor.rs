//! Compaction executor — merge, dedup, tombstone drop, output split.

use std::fs;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use crate::engine::utils::{Entry, MergeIterator, TableIdAllocator};
use crate::sstable::{SstWriter, Table, open_table, table_file_name};

use super::{CompactionError, CompactionPlan};

/// Cut a new output table once its approximate size would pass this.
const MAX_OUTPUT_TABLE_BYTES: u64 = 64 * 1024 * 1024;

/// Fixed per-entry overhead used for the approximate size:
/// `len(key) + len(value) + 20`.
const ENTRY_SIZE_OVERHEAD: u64 = 20;

/// Executes [`CompactionPlan`]s: merges the inputs into deduplicated,
/// tombstone-free output tables at the plan's output level.
pub struct Compactor {
    data_dir: PathBuf,
}

impl Compactor {
    /// Creates a compactor writing outputs into `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Runs one plan to completion.
    ///
    /// The merged stream is ordered `(key ASC, timestamp DESC)`; only
    /// the newest version of each key survives, and a newest version
    /// that is a tombstone is removed entirely. Output tables are cut
    /// at 64 MiB of approximate entry payload.
    ///
    /// On any failure — including a panic inside the merge — every
    /// output file created so far is deleted and the error returned.
    /// The input tables are never touched; [`Self::cleanup_old`]
    /// removes them after the engine has published the outputs.
    pub fn compact(
        &self,
        plan: &CompactionPlan,
        ids: &TableIdAllocator,
    ) -> Result<Vec<Arc<dyn Table>>, CompactionError> {
        let created: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());

        let outcome = catch_unwind(AssertUnwindSafe(|| self.run(plan, ids, &created)));

        match outcome {
            Ok(Ok(outputs)) => Ok(outputs),
            Ok(Err(err)) => {
                self.remove_partial_outputs(&created);
                Err(err)
            }
            Err(payload) => {
                self.remove_partial_outputs(&created);
                Err(CompactionError::Panicked(panic_message(payload)))
            }
        }
    }

    fn run(
        &self,
        plan: &CompactionPlan,
        ids: &TableIdAllocator,
        created: &Mutex<Vec<PathBuf>>,
    ) -> Result<Vec<Arc<dyn Table>>, CompactionError> {
        // Collect per-table streams, newest table first so that equal
        // timestamps resolve toward the newer table.
        let mut sources: Vec<Box<dyn Iterator<Item = Entry>>> = Vec::new();
        for table in plan.inputs.iter().rev() {
            sources.push(Box::new(table.entries()?.into_iter()));
        }

        let merged = MergeIterator::new(sources);

        // Keep the newest version per key; drop it entirely when the
        // newest version is a tombstone.
        let mut survivors: Vec<Entry> = Vec::new();
        let mut current: Option<Entry> = None;

        for entry in merged {
            match current.as_mut() {
                Some(cur) if cur.key == entry.key => {
                    if entry.timestamp > cur.timestamp {
                        *cur = entry;
                    }
                }
                _ => {
                    if let Some(done) = current.take() {
                        if !done.deleted {
                            survivors.push(done);
                        }
                    }
                    current = Some(entry);
                }
            }
        }
        if let Some(done) = current.take() {
            if !done.deleted {
                survivors.push(done);
            }
        }

        // Split the survivor stream into ≤ 64 MiB output tables.
        let mut outputs: Vec<Arc<dyn Table>> = Vec::new();
        let mut pending: Vec<Entry> = Vec::new();
        let mut pending_bytes = 0u64;

        for entry in survivors {
            let approx = (entry.key.len() + entry.value.len()) as u64 + ENTRY_SIZE_OVERHEAD;
            if !pending.is_empty() && pending_bytes + approx > MAX_OUTPUT_TABLE_BYTES {
                outputs.push(self.write_output(
                    plan.output_level,
                    std::mem::take(&mut pending),
                    ids,
                    created,
                )?);
                pending_bytes = 0;
            }
            pending_bytes += approx;
            pending.push(entry);
        }
        if !pending.is_empty() {
            outputs.push(self.write_output(plan.output_level, pending, ids, created)?);
        }

        debug!(
            source_level = plan.source_level,
            output_level = plan.output_level,
            inputs = plan.inputs.len(),
            outputs = outputs.len(),
            "compaction merge complete"
        );

        Ok(outputs)
    }

    fn write_output(
        &self,
        level: u32,
        entries: Vec<Entry>,
        ids: &TableIdAllocator,
        created: &Mutex<Vec<PathBuf>>,
    ) -> Result<Arc<dyn Table>, CompactionError> {
        let id = ids.next();
        let path = self.data_dir.join(table_file_name(level, id));

        created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.clone());

        SstWriter::new(&path).write(entries)?;
        Ok(open_table(&path, level, id)?)
    }

    /// Deletes the files of superseded source tables.
    ///
    /// Deletion failures are collected, not short-circuited — every
    /// remaining file still gets its removal attempt — and reported as
    /// one aggregate error.
    pub fn cleanup_old(&self, tables: &[Arc<dyn Table>]) -> Result<(), CompactionError> {
        let mut failures = Vec::new();

        for table in tables {
            if let Err(err) = fs::remove_file(table.path()) {
                warn!(path = %table.path().display(), %err, "failed to remove superseded table");
                failures.push(format!("{}: {err}", table.path().display()));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CompactionError::Cleanup(failures.join("; ")))
        }
    }

    fn remove_partial_outputs(&self, created: &Mutex<Vec<PathBuf>>) {
        let created = created.lock().unwrap_or_else(PoisonError::into_inner);
        for path in created.iter() {
            if let Err(err) = fs::remove_file(path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), %err, "failed to remove partial compaction output");
                }
            }
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
