//! Ingestion for the export warehouse.
//!
//! This crate handles:
//! - Reading raw monthly batches (spreadsheets, CSV exports)
//! - Column normalization onto the canonical schema
//! - Staging normalized batches to per-period extracts

pub mod normalizer;
pub mod reader;
pub mod staging;

pub use normalizer::{ColumnMapping, ColumnNormalizer, NormalizationStats, NormalizedBatch};
pub use reader::read_batch;
pub use staging::StagingStore;
