//! Core types and configuration for the export warehouse.
//!
//! This crate provides shared types used across all other crates:
//! - The canonical export schema and its alias resolution
//! - Record types for every pipeline stage (raw, normalized, core)
//! - Configuration structures
//! - Common error types

pub mod config;
pub mod error;
pub mod schema;
pub mod types;

pub use config::Config;
pub use error::{Error, Result, Stage, StageContext};
pub use schema::{Field, FieldType};
pub use types::*;
