//! Staging persistence.
//!
//! One CSV per reporting period, header row = `PERIODO` plus the canonical
//! columns. Files are written to a temporary sibling and renamed into place,
//! so a failed write never clobbers the previous extract.

use exportdw_core::config::StorageConfig;
use exportdw_core::{Error, Field, NormalizedRecord, Period, Result, StagedBatch};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const PERIOD_COLUMN: &str = "PERIODO";
const FILE_PREFIX: &str = "staging_";
const FILE_SUFFIX: &str = ".csv";

/// Staging header row.
pub fn staging_header() -> Vec<&'static str> {
    std::iter::once(PERIOD_COLUMN)
        .chain(Field::ALL.iter().map(|f| f.column()))
        .collect()
}

/// Reads and writes per-period staged extracts.
pub struct StagingStore {
    dir: PathBuf,
}

impl StagingStore {
    /// Create a store rooted at the configured staging directory.
    pub fn new(storage: &StorageConfig) -> Self {
        Self::at(&storage.staging_dir)
    }

    /// Create a store rooted at an explicit directory.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Extract location for a period.
    pub fn path_for(&self, period: Period) -> PathBuf {
        self.dir.join(format!("{FILE_PREFIX}{period}{FILE_SUFFIX}"))
    }

    /// Write a period's extract, replacing any previous one.
    pub fn write(&self, period: Period, records: &[NormalizedRecord]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(period);

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(tmp.as_file_mut());
            writer.write_record(staging_header())?;
            for record in records {
                writer.serialize(record)?;
            }
            writer.flush()?;
        }
        tmp.persist(&path).map_err(|e| Error::Io(e.error))?;

        info!(%period, rows = records.len(), path = %path.display(), "staged batch");
        Ok(path)
    }

    /// Read a period's extract.
    pub fn read(&self, period: Period) -> Result<StagedBatch> {
        let path = self.path_for(period);
        let mut reader = csv::Reader::from_path(&path)?;

        let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if header != staging_header() {
            return Err(Error::data(format!(
                "{} does not carry the staging header",
                path.display()
            )));
        }

        let records = reader
            .deserialize()
            .collect::<std::result::Result<Vec<NormalizedRecord>, _>>()?;

        debug!(%period, rows = records.len(), "read staged batch");
        Ok(StagedBatch { period, records })
    }

    /// Periods with an extract on disk, ascending. Empty if the directory
    /// does not exist yet.
    pub fn periods(&self) -> Result<Vec<Period>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut periods = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(period) = period_from_file_name(&entry.path()) {
                periods.push(period);
            }
        }
        periods.sort();
        Ok(periods)
    }

    /// Every staged batch, in ascending period order.
    pub fn read_all(&self) -> Result<Vec<StagedBatch>> {
        self.periods()?.into_iter().map(|p| self.read(p)).collect()
    }
}

/// Period of a file written by [`StagingStore::write`]. Names that do not
/// round-trip to the canonical `staging_YYYY-MM.csv` form are ignored.
fn period_from_file_name(path: &Path) -> Option<Period> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    let period: Period = stem.parse().ok()?;
    (period.to_string() == stem).then_some(period)
}
