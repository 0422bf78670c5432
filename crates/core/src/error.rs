//! Error types for the export warehouse.

use std::fmt;
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline stage, used to tag failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Raw batch reading, normalization and staging.
    Staging,
    /// Staging merge into the core dataset.
    Merge,
    /// Dimensional model load.
    Load,
    /// Read-only queries against the loaded model.
    Report,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Staging => "staging",
            Stage::Merge => "merge",
            Stage::Load => "load",
            Stage::Report => "report",
        };
        f.write_str(name)
    }
}

/// Main error type for the export warehouse.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data error (unreadable or malformed input).
    #[error("Data error: {0}")]
    Data(String),

    /// Spreadsheet decoding error.
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    /// Relational store error.
    #[error("Database error: {0}")]
    Database(String),

    /// Columnar file error.
    #[error("Columnar store error: {0}")]
    Columnar(String),

    /// A fact failed to resolve against its own dimensions.
    #[error("Referential integrity violation: {0}")]
    ReferentialIntegrity(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV read/write error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failure attributed to a pipeline stage.
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a data error.
    pub fn data(msg: impl Into<String>) -> Self {
        Error::Data(msg.into())
    }

    /// Create a spreadsheet error.
    pub fn spreadsheet(msg: impl Into<String>) -> Self {
        Error::Spreadsheet(msg.into())
    }

    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Error::Database(msg.into())
    }

    /// Create a columnar store error.
    pub fn columnar(msg: impl Into<String>) -> Self {
        Error::Columnar(msg.into())
    }

    /// Create a referential integrity error.
    pub fn referential_integrity(msg: impl Into<String>) -> Self {
        Error::ReferentialIntegrity(msg.into())
    }

    /// Stage this error is attributed to, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Tag the error of a result with the stage that produced it.
pub trait StageContext<T> {
    fn in_stage(self, stage: Stage) -> Result<T>;
}

impl<T> StageContext<T> for Result<T> {
    fn in_stage(self, stage: Stage) -> Result<T> {
        self.map_err(|e| match e {
            already @ Error::Stage { .. } => already,
            other => Error::Stage {
                stage,
                source: Box::new(other),
            },
        })
    }
}
