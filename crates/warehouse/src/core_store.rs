//! Columnar persistence of the core dataset.
//!
//! The core set is written as a single Parquet file through an in-memory
//! DuckDB database: rows are inserted into a scratch table and exported with
//! `COPY ... (FORMAT PARQUET)` to a temporary sibling that is then renamed
//! over the previous file.

use chrono::NaiveDate;
use duckdb::{params, Connection};
use exportdw_core::config::StorageConfig;
use exportdw_core::{CoreRecord, Error, NormalizedRecord, Period, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const CREATE_SCRATCH: &str = "
CREATE TABLE core_exports (
    batch_period        VARCHAR NOT NULL,
    source_row          BIGINT NOT NULL,
    period              VARCHAR NOT NULL,
    form_number         VARCHAR,
    serial_number       VARCHAR,
    declaration_date    VARCHAR,
    company_id          VARCHAR,
    company_name        VARCHAR,
    company_address     VARCHAR,
    country_code        VARCHAR,
    country_name        VARCHAR,
    product_code        VARCHAR,
    product_description VARCHAR,
    units               DOUBLE,
    gross_weight_kg     DOUBLE,
    net_weight_kg       DOUBLE,
    fob_usd             DOUBLE,
    fob_cop             DOUBLE
);";

const INSERT_ROW: &str = "INSERT INTO core_exports VALUES \
    (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

const SELECT_COLUMNS: &str = "batch_period, source_row, period, form_number, serial_number, \
    CAST(declaration_date AS VARCHAR) AS declaration_date, company_id, company_name, \
    company_address, country_code, country_name, product_code, product_description, \
    units, gross_weight_kg, net_weight_kg, fob_usd, fob_cop";

fn columnar(e: duckdb::Error) -> Error {
    Error::columnar(e.to_string())
}

/// Quote a path as a SQL string literal.
fn sql_literal(path: &Path) -> Result<String> {
    let text = path
        .to_str()
        .ok_or_else(|| Error::columnar(format!("non UTF-8 path {}", path.display())))?;
    Ok(format!("'{}'", text.replace('\'', "''")))
}

/// Row as read back from Parquet, before conversion.
struct CoreRow {
    batch_period: String,
    source_row: i64,
    period: String,
    form_number: Option<String>,
    serial_number: Option<String>,
    declaration_date: Option<String>,
    company_id: Option<String>,
    company_name: Option<String>,
    company_address: Option<String>,
    country_code: Option<String>,
    country_name: Option<String>,
    product_code: Option<String>,
    product_description: Option<String>,
    units: Option<f64>,
    gross_weight_kg: Option<f64>,
    net_weight_kg: Option<f64>,
    fob_usd: Option<f64>,
    fob_cop: Option<f64>,
}

impl CoreRow {
    fn into_record(self) -> Result<CoreRecord> {
        let declaration_date = self
            .declaration_date
            .map(|d| {
                NaiveDate::parse_from_str(&d, "%Y-%m-%d")
                    .map_err(|e| Error::data(format!("bad declaration date '{d}': {e}")))
            })
            .transpose()?;
        let source_row = u64::try_from(self.source_row)
            .map_err(|_| Error::data(format!("negative source row {}", self.source_row)))?;

        Ok(CoreRecord {
            batch_period: self.batch_period.parse::<Period>()?,
            source_row,
            record: NormalizedRecord {
                period: self.period.parse()?,
                form_number: self.form_number,
                serial_number: self.serial_number,
                declaration_date,
                company_id: self.company_id,
                company_name: self.company_name,
                company_address: self.company_address,
                country_code: self.country_code,
                country_name: self.country_name,
                product_code: self.product_code,
                product_description: self.product_description,
                units: self.units,
                gross_weight_kg: self.gross_weight_kg,
                net_weight_kg: self.net_weight_kg,
                fob_usd: self.fob_usd,
                fob_cop: self.fob_cop,
            },
        })
    }
}

/// Reads and writes the core dataset file.
pub struct CoreStore {
    path: PathBuf,
}

impl CoreStore {
    /// Create a store at the configured core location.
    pub fn new(storage: &StorageConfig) -> Self {
        Self::at(storage.core_path())
    }

    /// Create a store at an explicit file path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Replace the core file with `records`.
    pub fn write(&self, records: &[CoreRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("parquet.tmp");
        if tmp.exists() {
            fs::remove_file(&tmp)?;
        }

        let conn = Connection::open_in_memory().map_err(columnar)?;
        conn.execute_batch(CREATE_SCRATCH).map_err(columnar)?;

        conn.execute_batch("BEGIN TRANSACTION").map_err(columnar)?;
        {
            let mut stmt = conn.prepare(INSERT_ROW).map_err(columnar)?;
            for core in records {
                let r = &core.record;
                stmt.execute(params![
                    core.batch_period.to_string(),
                    core.source_row as i64,
                    r.period.to_string(),
                    r.form_number,
                    r.serial_number,
                    r.declaration_date.map(|d| d.format("%Y-%m-%d").to_string()),
                    r.company_id,
                    r.company_name,
                    r.company_address,
                    r.country_code,
                    r.country_name,
                    r.product_code,
                    r.product_description,
                    r.units,
                    r.gross_weight_kg,
                    r.net_weight_kg,
                    r.fob_usd,
                    r.fob_cop,
                ])
                .map_err(columnar)?;
            }
        }
        conn.execute_batch("COMMIT").map_err(columnar)?;

        let copy = format!(
            "COPY (
                SELECT * REPLACE (CAST(declaration_date AS DATE) AS declaration_date)
                FROM core_exports
                ORDER BY batch_period, source_row
            ) TO {} (FORMAT PARQUET)",
            sql_literal(&tmp)?
        );
        if let Err(e) = conn.execute_batch(&copy) {
            let _ = fs::remove_file(&tmp);
            return Err(columnar(e));
        }
        fs::rename(&tmp, &self.path)?;

        info!(rows = records.len(), path = %self.path.display(), "wrote core dataset");
        Ok(())
    }

    /// Read the core file back, in first-seen order.
    pub fn read(&self) -> Result<Vec<CoreRecord>> {
        if !self.exists() {
            return Err(Error::data(format!(
                "core dataset {} not found",
                self.path.display()
            )));
        }

        let conn = Connection::open_in_memory().map_err(columnar)?;
        let query = format!(
            "SELECT {SELECT_COLUMNS} FROM read_parquet({}) ORDER BY batch_period, source_row",
            sql_literal(&self.path)?
        );
        let mut stmt = conn.prepare(&query).map_err(columnar)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(CoreRow {
                    batch_period: row.get(0)?,
                    source_row: row.get(1)?,
                    period: row.get(2)?,
                    form_number: row.get(3)?,
                    serial_number: row.get(4)?,
                    declaration_date: row.get(5)?,
                    company_id: row.get(6)?,
                    company_name: row.get(7)?,
                    company_address: row.get(8)?,
                    country_code: row.get(9)?,
                    country_name: row.get(10)?,
                    product_code: row.get(11)?,
                    product_description: row.get(12)?,
                    units: row.get(13)?,
                    gross_weight_kg: row.get(14)?,
                    net_weight_kg: row.get(15)?,
                    fob_usd: row.get(16)?,
                    fob_cop: row.get(17)?,
                })
            })
            .map_err(columnar)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(columnar)?.into_record()?);
        }
        Ok(records)
    }
}
