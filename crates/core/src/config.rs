//! Configuration structures for the export warehouse.
//!
//! A single [`Config`] is built at process start (defaults or a JSON file)
//! and handed to every stage; no stage reaches for ambient paths.

use crate::error::{Error, Result};
use crate::schema::{normalize_header, Field};
use crate::types::Period;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Main configuration for the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage locations.
    pub storage: StorageConfig,
    /// Column normalization rules.
    pub normalizer: NormalizerConfig,
    /// Input batches, one per reporting period.
    pub batches: Vec<BatchConfig>,
}

impl Default for Config {
    fn default() -> Self {
        let batches = [
            (1, "01_Exportaciones_2025_Enero.xlsx"),
            (2, "02_Exportaciones_2025_Febrero.xlsx"),
            (3, "03_Exportaciones_2025_Marzo.xlsx"),
        ]
        .into_iter()
        .filter_map(|(month, file)| Period::new(2025, month).map(|p| BatchConfig::new(p, file)))
        .collect();

        Self {
            storage: StorageConfig::default(),
            normalizer: NormalizerConfig::default(),
            batches,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file. Missing sections take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<()> {
        self.normalizer.validate()?;

        let mut seen = HashSet::new();
        for batch in &self.batches {
            if !seen.insert(batch.period) {
                return Err(Error::config(format!(
                    "period {} is configured more than once",
                    batch.period
                )));
            }
        }
        Ok(())
    }

    /// Location of the raw input for a batch.
    pub fn raw_path(&self, batch: &BatchConfig) -> PathBuf {
        self.storage
            .raw_dir
            .join(batch.period.to_string())
            .join(&batch.file)
    }
}

/// Storage locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the raw spreadsheets (`<raw_dir>/<YYYY-MM>/<file>`).
    pub raw_dir: PathBuf,
    /// Directory holding one staged CSV per period.
    pub staging_dir: PathBuf,
    /// Directory holding the core file and the relational store.
    pub warehouse_dir: PathBuf,
    /// Core dataset file name.
    pub core_file: String,
    /// Relational store file name.
    pub database_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            staging_dir: PathBuf::from("data/staging"),
            warehouse_dir: PathBuf::from("data/dw"),
            core_file: "core_exports.parquet".to_string(),
            database_file: "dw_exports.db".to_string(),
        }
    }
}

impl StorageConfig {
    /// Staged CSV location for a period.
    pub fn staging_path(&self, period: Period) -> PathBuf {
        self.staging_dir.join(format!("staging_{period}.csv"))
    }

    /// Core dataset location.
    pub fn core_path(&self) -> PathBuf {
        self.warehouse_dir.join(&self.core_file)
    }

    /// Relational store location.
    pub fn database_path(&self) -> PathBuf {
        self.warehouse_dir.join(&self.database_file)
    }
}

/// Locale of numbers written as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberFormat {
    pub decimal_separator: char,
    pub thousands_separator: char,
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self {
            decimal_separator: '.',
            thousands_separator: ',',
        }
    }
}

/// Column normalization rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Known source header variants mapped to canonical column names.
    /// Exhaustive: headers not listed here and not canonical are dropped.
    pub aliases: BTreeMap<String, String>,
    /// Fields a record must carry to be kept.
    pub required_fields: Vec<Field>,
    /// Locale used for numbers stored as text.
    pub number_format: NumberFormat,
    /// Accepted date formats (chrono syntax), tried in order.
    pub date_formats: Vec<String>,
    /// Worksheet to read; the first sheet when unset.
    pub sheet_name: Option<String>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        let aliases = [("NUM_SERIE", "NUMERO_SERIE"), ("NUMERO SERIE", "NUMERO_SERIE")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Self {
            aliases,
            required_fields: vec![Field::CompanyName, Field::ProductCode, Field::FobUsd],
            number_format: NumberFormat::default(),
            date_formats: vec![
                "%Y%m%d".to_string(),
                "%Y-%m-%d".to_string(),
                "%d/%m/%Y".to_string(),
            ],
            sheet_name: None,
        }
    }
}

impl NormalizerConfig {
    /// Resolve a source header to a canonical field.
    pub fn resolve_header(&self, header: &str) -> Option<Field> {
        let key = normalize_header(header);
        Field::from_column(&key).or_else(|| {
            self.aliases
                .iter()
                .find(|(alias, _)| normalize_header(alias) == key)
                .and_then(|(_, target)| Field::from_column(&normalize_header(target)))
        })
    }

    fn validate(&self) -> Result<()> {
        for (alias, target) in &self.aliases {
            if Field::from_column(&normalize_header(target)).is_none() {
                return Err(Error::config(format!(
                    "alias '{alias}' targets unknown column '{target}'"
                )));
            }
            if Field::from_column(&normalize_header(alias)).is_some() {
                return Err(Error::config(format!(
                    "alias '{alias}' shadows a canonical column"
                )));
            }
        }
        if self.required_fields.is_empty() {
            return Err(Error::config("required_fields must not be empty"));
        }
        if self.date_formats.is_empty() {
            return Err(Error::config("date_formats must not be empty"));
        }
        let fmt = self.number_format;
        if fmt.decimal_separator == fmt.thousands_separator {
            return Err(Error::config(
                "decimal and thousands separators must differ",
            ));
        }
        Ok(())
    }
}

/// One input batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Reporting period the file was published for.
    pub period: Period,
    /// File name under `<raw_dir>/<period>/`.
    pub file: String,
}

impl BatchConfig {
    pub fn new(period: Period, file: impl Into<String>) -> Self {
        Self {
            period,
            file: file.into(),
        }
    }
}
