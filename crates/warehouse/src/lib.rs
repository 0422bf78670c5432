//! Core merge and dimensional warehouse.
//!
//! This crate handles:
//! - Merging staged batches into the deduplicated core dataset
//! - Persisting the core dataset as Parquet
//! - Building and loading the star schema into SQLite
//! - Read-only aggregate queries over the loaded model
//! - Orchestrating the stages end to end

pub mod core_store;
pub mod dimensions;
pub mod loader;
pub mod merger;
pub mod pipeline;
pub mod queries;

pub use core_store::CoreStore;
pub use dimensions::{Dimension, FactRow, StarSchema, SurrogateKey};
pub use loader::{LoadStats, WarehouseLoader};
pub use merger::{first_seen_order, CoreMerger, MergeStats, SeenAt};
pub use pipeline::{BatchOutcome, Pipeline, PipelineReport, StagingReport};
pub use queries::{PeriodTotal, RankedTotal, TableCounts, Warehouse};
