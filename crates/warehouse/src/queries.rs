//! Read-only access to the loaded star schema.
//!
//! Every method returns typed rows; presentation is left to callers. FOB and
//! weight sums use SQLite `TOTAL()`, so null measures count as zero and an
//! empty group sums to `0.0`.

use crate::loader::sqlite;
use exportdw_core::{Error, Period, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::debug;

/// A labelled aggregate, e.g. one company and its FOB total.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedTotal {
    pub label: String,
    pub total: f64,
}

/// FOB total for one reporting period.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodTotal {
    pub period: Period,
    pub total_fob_usd: f64,
    pub facts: u64,
}

/// Row counts of every warehouse table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub companies: u64,
    pub countries: u64,
    pub products: u64,
    pub periods: u64,
    pub facts: u64,
}

const COMPANY_LABEL: &str = "COALESCE(c.name, c.nit, 'Unknown')";
const COUNTRY_LABEL: &str = "COALESCE(k.name, k.code, 'Unknown')";
const PRODUCT_LABEL: &str = "COALESCE(d.description, d.code, 'Unknown')";

/// Read-only handle on the warehouse database.
pub struct Warehouse {
    conn: Connection,
}

impl Warehouse {
    /// Open an existing warehouse. Writes through this handle are refused.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::data(format!(
                "warehouse {} not found, run the load first",
                path.display()
            )));
        }

        let conn = Connection::open(path).map_err(sqlite)?;
        conn.pragma_update(None, "query_only", true).map_err(sqlite)?;
        debug!(path = %path.display(), "opened warehouse read-only");
        Ok(Self { conn })
    }

    /// Most recent period present in the model.
    pub fn latest_period(&self) -> Result<Option<Period>> {
        let label: Option<String> = self
            .conn
            .query_row(
                "SELECT label FROM dim_period ORDER BY year DESC, month DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(sqlite)?;
        label.map(|l| l.parse()).transpose()
    }

    /// Companies ranked by FOB USD within `period` (latest period if `None`).
    pub fn top_companies(&self, period: Option<Period>, limit: usize) -> Result<Vec<RankedTotal>> {
        let period = match period {
            Some(p) => p,
            None => match self.latest_period()? {
                Some(p) => p,
                None => return Ok(Vec::new()),
            },
        };

        let sql = format!(
            "SELECT {COMPANY_LABEL} AS label, TOTAL(f.fob_usd) AS total
             FROM fact_exports f
             JOIN dim_company c ON c.company_key = f.company_key
             JOIN dim_period p ON p.period_key = f.period_key
             WHERE p.label = ?1
             GROUP BY f.company_key
             ORDER BY total DESC, label
             LIMIT ?2"
        );
        self.ranked(&sql, params![period.to_string(), limit as i64])
    }

    /// FOB USD per period, ascending.
    pub fn totals_by_period(&self) -> Result<Vec<PeriodTotal>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT p.label, TOTAL(f.fob_usd), COUNT(*)
                 FROM fact_exports f
                 JOIN dim_period p ON p.period_key = f.period_key
                 GROUP BY p.period_key
                 ORDER BY p.year, p.month",
            )
            .map_err(sqlite)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })
            .map_err(sqlite)?;

        let mut totals = Vec::new();
        for row in rows {
            let (label, total, facts) = row.map_err(sqlite)?;
            totals.push(PeriodTotal {
                period: label.parse()?,
                total_fob_usd: total,
                facts: facts as u64,
            });
        }
        Ok(totals)
    }

    /// Destinations ranked by FOB USD over an inclusive period range.
    pub fn top_destinations(&self, from: Period, to: Period, limit: usize) -> Result<Vec<RankedTotal>> {
        let sql = format!(
            "SELECT {COUNTRY_LABEL} AS label, TOTAL(f.fob_usd) AS total
             FROM fact_exports f
             JOIN dim_country k ON k.country_key = f.country_key
             JOIN dim_period p ON p.period_key = f.period_key
             WHERE p.year * 100 + p.month BETWEEN ?1 AND ?2
             GROUP BY f.country_key
             ORDER BY total DESC, label
             LIMIT ?3"
        );
        self.ranked(&sql, params![ordinal(from), ordinal(to), limit as i64])
    }

    /// Products ranked by FOB USD across every period.
    pub fn top_products(&self, limit: usize) -> Result<Vec<RankedTotal>> {
        let sql = format!(
            "SELECT {PRODUCT_LABEL} AS label, TOTAL(f.fob_usd) AS total
             FROM fact_exports f
             JOIN dim_product d ON d.product_key = f.product_key
             GROUP BY f.product_key
             ORDER BY total DESC, label
             LIMIT ?1"
        );
        self.ranked(&sql, params![limit as i64])
    }

    /// Destinations ranked by net weight across every period.
    pub fn top_destinations_by_weight(&self, limit: usize) -> Result<Vec<RankedTotal>> {
        let sql = format!(
            "SELECT {COUNTRY_LABEL} AS label, TOTAL(f.net_weight_kg) AS total
             FROM fact_exports f
             JOIN dim_country k ON k.country_key = f.country_key
             GROUP BY f.country_key
             ORDER BY total DESC, label
             LIMIT ?1"
        );
        self.ranked(&sql, params![limit as i64])
    }

    pub fn table_counts(&self) -> Result<TableCounts> {
        let count = |table: &str| -> Result<u64> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
                .map_err(sqlite)?;
            Ok(n as u64)
        };
        Ok(TableCounts {
            companies: count("dim_company")?,
            countries: count("dim_country")?,
            products: count("dim_product")?,
            periods: count("dim_period")?,
            facts: count("fact_exports")?,
        })
    }

    /// Facts whose dimension references do not resolve. Zero on a healthy model.
    pub fn orphaned_facts(&self) -> Result<u64> {
        let n: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*)
                 FROM fact_exports f
                 LEFT JOIN dim_company c ON c.company_key = f.company_key
                 LEFT JOIN dim_country k ON k.country_key = f.country_key
                 LEFT JOIN dim_product d ON d.product_key = f.product_key
                 LEFT JOIN dim_period p ON p.period_key = f.period_key
                 WHERE c.company_key IS NULL
                    OR k.country_key IS NULL
                    OR d.product_key IS NULL
                    OR p.period_key IS NULL",
                [],
                |row| row.get(0),
            )
            .map_err(sqlite)?;
        Ok(n as u64)
    }

    fn ranked(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<RankedTotal>> {
        let mut stmt = self.conn.prepare(sql).map_err(sqlite)?;
        let rows = stmt
            .query_map(params, |row| {
                Ok(RankedTotal {
                    label: row.get(0)?,
                    total: row.get(1)?,
                })
            })
            .map_err(sqlite)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(sqlite)
    }
}

fn ordinal(period: Period) -> i64 {
    i64::from(period.year) * 100 + i64::from(period.month)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimensions::StarSchema;
    use crate::loader::WarehouseLoader;
    use approx::assert_relative_eq;
    use exportdw_core::{CoreRecord, Field, FieldValue, NormalizedRecord};

    fn core(row: u64, month: u32, company: &str, country: &str, product: &str, fob: f64, kg: f64) -> CoreRecord {
        let period = Period::new(2025, month).unwrap();
        let mut rec = NormalizedRecord::empty(period);
        rec.set(Field::CompanyName, FieldValue::Text(company.into()));
        rec.set(Field::CountryName, FieldValue::Text(country.into()));
        rec.set(Field::ProductCode, FieldValue::Text(product.into()));
        rec.set(Field::FobUsd, FieldValue::Number(fob));
        rec.set(Field::NetWeightKg, FieldValue::Number(kg));
        CoreRecord {
            batch_period: period,
            source_row: row,
            record: rec,
        }
    }

    fn loaded(dir: &Path) -> Warehouse {
        let path = dir.join("dw.db");
        let records = vec![
            core(0, 1, "ACME", "Chile", "Coffee", 100.0, 10.0),
            core(1, 1, "ACME", "Peru", "Coffee", 50.5, 5.0),
            core(2, 1, "GLOBEX", "Chile", "Flowers", 20.0, 40.0),
            core(3, 2, "GLOBEX", "Peru", "Flowers", 300.0, 1.0),
            core(4, 3, "INITECH", "Chile", "Gold", 7.25, 0.5),
        ];
        WarehouseLoader::at(&path)
            .load(&StarSchema::build(&records).unwrap())
            .unwrap();
        Warehouse::open(&path).unwrap()
    }

    fn p(month: u32) -> Period {
        Period::new(2025, month).unwrap()
    }

    #[test]
    fn test_latest_period() {
        let dir = tempfile::tempdir().unwrap();
        let wh = loaded(dir.path());
        assert_eq!(wh.latest_period().unwrap(), Some(p(3)));
    }

    #[test]
    fn test_top_companies_defaults_to_latest_period() {
        let dir = tempfile::tempdir().unwrap();
        let wh = loaded(dir.path());

        let latest = wh.top_companies(None, 5).unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].label, "INITECH");

        let january = wh.top_companies(Some(p(1)), 5).unwrap();
        assert_eq!(january[0].label, "ACME");
        assert_relative_eq!(january[0].total, 150.5);
        assert_relative_eq!(january[1].total, 20.0);
    }

    #[test]
    fn test_totals_by_period() {
        let dir = tempfile::tempdir().unwrap();
        let wh = loaded(dir.path());

        let totals = wh.totals_by_period().unwrap();

        let periods: Vec<Period> = totals.iter().map(|t| t.period).collect();
        assert_eq!(periods, vec![p(1), p(2), p(3)]);
        assert_relative_eq!(totals[0].total_fob_usd, 170.5);
        assert_eq!(totals[0].facts, 3);
        let sum: f64 = totals.iter().map(|t| t.total_fob_usd).sum();
        assert_relative_eq!(sum, 477.75);
    }

    #[test]
    fn test_top_destinations_respects_range() {
        let dir = tempfile::tempdir().unwrap();
        let wh = loaded(dir.path());

        let january = wh.top_destinations(p(1), p(1), 10).unwrap();
        assert_eq!(january[0].label, "Chile");
        assert_relative_eq!(january[0].total, 120.0);

        let all = wh.top_destinations(p(1), p(3), 10).unwrap();
        assert_eq!(all[0].label, "Peru");
        assert_relative_eq!(all[0].total, 350.5);
        assert_eq!(wh.top_destinations(p(1), p(3), 1).unwrap().len(), 1);
    }

    #[test]
    fn test_top_products_and_weights() {
        let dir = tempfile::tempdir().unwrap();
        let wh = loaded(dir.path());

        let products = wh.top_products(2).unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].label, "Flowers");
        assert_relative_eq!(products[0].total, 320.0);

        let weights = wh.top_destinations_by_weight(10).unwrap();
        assert_eq!(weights[0].label, "Chile");
        assert_relative_eq!(weights[0].total, 50.5);
    }

    #[test]
    fn test_counts_and_integrity() {
        let dir = tempfile::tempdir().unwrap();
        let wh = loaded(dir.path());

        let counts = wh.table_counts().unwrap();
        assert_eq!(
            counts,
            TableCounts {
                companies: 3,
                countries: 2,
                products: 3,
                periods: 3,
                facts: 5,
            }
        );
        assert_eq!(wh.orphaned_facts().unwrap(), 0);
    }

    #[test]
    fn test_handle_refuses_writes() {
        let dir = tempfile::tempdir().unwrap();
        let wh = loaded(dir.path());
        assert!(wh.conn.execute("DELETE FROM fact_exports", []).is_err());
    }

    #[test]
    fn test_open_missing_warehouse() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Warehouse::open(dir.path().join("absent.db")),
            Err(Error::Data(_))
        ));
    }
}
