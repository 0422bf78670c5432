//! Dimensional load into SQLite.
//!
//! The whole model is replaced inside one transaction: tables are dropped,
//! recreated and refilled, then committed. Any failure rolls the transaction
//! back, so readers keep seeing the previous model.

use crate::dimensions::StarSchema;
use exportdw_core::config::StorageConfig;
use exportdw_core::{Error, Result};
use rusqlite::{params, Connection, Transaction};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const DROP_TABLES: &str = "
DROP TABLE IF EXISTS fact_exports;
DROP TABLE IF EXISTS dim_company;
DROP TABLE IF EXISTS dim_country;
DROP TABLE IF EXISTS dim_product;
DROP TABLE IF EXISTS dim_period;";

const CREATE_TABLES: &str = "
CREATE TABLE dim_company (
    company_key INTEGER PRIMARY KEY,
    nit         TEXT,
    name        TEXT,
    address     TEXT,
    UNIQUE (nit, name, address)
);
CREATE TABLE dim_country (
    country_key INTEGER PRIMARY KEY,
    code        TEXT,
    name        TEXT,
    UNIQUE (code, name)
);
CREATE TABLE dim_product (
    product_key INTEGER PRIMARY KEY,
    code        TEXT,
    description TEXT,
    UNIQUE (code, description)
);
CREATE TABLE dim_period (
    period_key INTEGER PRIMARY KEY,
    year       INTEGER NOT NULL,
    month      INTEGER NOT NULL,
    label      TEXT NOT NULL UNIQUE,
    UNIQUE (year, month)
);
CREATE TABLE fact_exports (
    fact_id         INTEGER PRIMARY KEY,
    period_key      INTEGER NOT NULL REFERENCES dim_period(period_key),
    company_key     INTEGER NOT NULL REFERENCES dim_company(company_key),
    country_key     INTEGER NOT NULL REFERENCES dim_country(country_key),
    product_key     INTEGER NOT NULL REFERENCES dim_product(product_key),
    form_number     TEXT,
    serial_number   TEXT,
    fob_usd         REAL,
    fob_cop         REAL,
    net_weight_kg   REAL,
    gross_weight_kg REAL,
    units           REAL
);
CREATE INDEX idx_fact_period ON fact_exports(period_key);
CREATE INDEX idx_fact_company ON fact_exports(company_key);
CREATE INDEX idx_fact_country ON fact_exports(country_key);
CREATE INDEX idx_fact_product ON fact_exports(product_key);";

/// Row counts written by one load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub companies: usize,
    pub countries: usize,
    pub products: usize,
    pub periods: usize,
    pub facts: usize,
}

pub(crate) fn sqlite(e: rusqlite::Error) -> Error {
    Error::database(e.to_string())
}

/// Open a read-write connection with the warehouse pragmas applied.
pub(crate) fn open_connection(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path).map_err(sqlite)?;
    let mode: String = conn
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
        .map_err(sqlite)?;
    conn.pragma_update(None, "foreign_keys", true).map_err(sqlite)?;
    debug!(journal_mode = %mode, path = %path.display(), "opened warehouse");
    Ok(conn)
}

/// Replaces the star schema in the warehouse database.
pub struct WarehouseLoader {
    path: PathBuf,
}

impl WarehouseLoader {
    /// Create a loader targeting the configured database file.
    pub fn new(storage: &StorageConfig) -> Self {
        Self::at(storage.database_path())
    }

    /// Create a loader targeting an explicit database file.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically replace the dimension and fact tables with `schema`.
    pub fn load(&self, schema: &StarSchema) -> Result<LoadStats> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut conn = open_connection(&self.path)?;

        let tx = conn.transaction().map_err(sqlite)?;
        tx.execute_batch(DROP_TABLES).map_err(sqlite)?;
        tx.execute_batch(CREATE_TABLES).map_err(sqlite)?;
        insert_dimensions(&tx, schema).map_err(sqlite)?;
        insert_facts(&tx, schema).map_err(sqlite)?;
        tx.commit().map_err(sqlite)?;

        let stats = LoadStats {
            companies: schema.companies.len(),
            countries: schema.countries.len(),
            products: schema.products.len(),
            periods: schema.periods.len(),
            facts: schema.facts.len(),
        };
        info!(
            companies = stats.companies,
            countries = stats.countries,
            products = stats.products,
            periods = stats.periods,
            facts = stats.facts,
            path = %self.path.display(),
            "loaded star schema"
        );
        Ok(stats)
    }
}

fn insert_dimensions(tx: &Transaction<'_>, schema: &StarSchema) -> rusqlite::Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO dim_company (company_key, nit, name, address) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (key, company) in schema.companies.rows() {
        stmt.execute(params![key, company.id, company.name, company.address])?;
    }

    let mut stmt =
        tx.prepare("INSERT INTO dim_country (country_key, code, name) VALUES (?1, ?2, ?3)")?;
    for (key, country) in schema.countries.rows() {
        stmt.execute(params![key, country.code, country.name])?;
    }

    let mut stmt = tx
        .prepare("INSERT INTO dim_product (product_key, code, description) VALUES (?1, ?2, ?3)")?;
    for (key, product) in schema.products.rows() {
        stmt.execute(params![key, product.code, product.description])?;
    }

    let mut stmt = tx.prepare(
        "INSERT INTO dim_period (period_key, year, month, label) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (key, period) in schema.periods.rows() {
        stmt.execute(params![key, period.year, period.month, period.to_string()])?;
    }
    Ok(())
}

fn insert_facts(tx: &Transaction<'_>, schema: &StarSchema) -> rusqlite::Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO fact_exports
         (fact_id, period_key, company_key, country_key, product_key, form_number,
          serial_number, fob_usd, fob_cop, net_weight_kg, gross_weight_kg, units)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
    )?;
    for (i, fact) in schema.facts.iter().enumerate() {
        stmt.execute(params![
            i as i64 + 1,
            fact.period_key,
            fact.company_key,
            fact.country_key,
            fact.product_key,
            fact.form_number,
            fact.serial_number,
            fact.fob_usd,
            fact.fob_cop,
            fact.net_weight_kg,
            fact.gross_weight_kg,
            fact.units,
        ])?;
    }
    Ok(())
}
