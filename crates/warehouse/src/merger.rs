//! Core merge.
//!
//! Unions every staged batch into the canonical dataset. Deduplication is an
//! exact match on the business key; among duplicates the record that comes
//! first under [`SeenAt`] ordering (ascending batch period, then source row)
//! is kept.

use exportdw_core::{CoreRecord, Field, Period, StagedBatch};
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::{debug, info};

/// Counts produced by one merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Staged batches merged.
    pub batches: usize,
    /// Normalized rows across all batches.
    pub input_rows: u64,
    /// Rows missing a required field.
    pub excluded: u64,
    /// Rows collapsed into an earlier record with the same business key.
    pub duplicates: u64,
    /// Rows in the resulting core dataset.
    pub core_rows: u64,
}

impl MergeStats {
    /// `core = input - excluded - duplicates`.
    pub fn is_consistent(&self) -> bool {
        self.input_rows == self.core_rows + self.excluded + self.duplicates
    }
}

/// Position of a record in staging order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SeenAt {
    pub batch_period: Period,
    pub source_row: u64,
}

impl From<&CoreRecord> for SeenAt {
    fn from(rec: &CoreRecord) -> Self {
        Self {
            batch_period: rec.batch_period,
            source_row: rec.source_row,
        }
    }
}

/// First-seen ordering between two candidate records.
pub fn first_seen_order(a: &CoreRecord, b: &CoreRecord) -> Ordering {
    SeenAt::from(a).cmp(&SeenAt::from(b))
}

/// Merges staged batches into the core dataset.
pub struct CoreMerger {
    required_fields: Vec<Field>,
}

impl CoreMerger {
    /// Create a merger that drops records missing any of `required_fields`.
    pub fn new(required_fields: Vec<Field>) -> Self {
        Self { required_fields }
    }

    /// Merge batches. The result does not depend on the order of `batches`.
    pub fn merge(&self, batches: &[StagedBatch]) -> (Vec<CoreRecord>, MergeStats) {
        let mut stats = MergeStats {
            batches: batches.len(),
            ..Default::default()
        };

        let mut candidates: Vec<CoreRecord> = batches
            .iter()
            .flat_map(|batch| {
                batch
                    .records
                    .iter()
                    .enumerate()
                    .map(move |(row, record)| CoreRecord {
                        batch_period: batch.period,
                        source_row: row as u64,
                        record: record.clone(),
                    })
            })
            .collect();
        stats.input_rows = candidates.len() as u64;

        candidates.retain(|c| {
            let keep = c.record.first_missing(&self.required_fields).is_none();
            if !keep {
                stats.excluded += 1;
            }
            keep
        });

        candidates.sort_by(first_seen_order);

        let mut seen = HashSet::with_capacity(candidates.len());
        let mut core = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if seen.insert(candidate.record.business_key()) {
                core.push(candidate);
            } else {
                debug!(
                    batch = %candidate.batch_period,
                    row = candidate.source_row,
                    "duplicate record collapsed"
                );
                stats.duplicates += 1;
            }
        }
        stats.core_rows = core.len() as u64;

        info!(
            batches = stats.batches,
            input = stats.input_rows,
            excluded = stats.excluded,
            duplicates = stats.duplicates,
            core = stats.core_rows,
            "merged staging into core"
        );

        (core, stats)
    }
}
