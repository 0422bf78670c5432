//! Dimension extraction and fact resolution.
//!
//! Each dimension is the sorted set of distinct natural keys present in the
//! core dataset. Surrogate keys are assigned from 1 in ascending natural-key
//! order, so the same core set always yields the same keys.

use exportdw_core::{CompanyKey, CoreRecord, CountryKey, Error, Period, ProductKey, Result};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// System-assigned dimension key.
pub type SurrogateKey = i64;

/// A dimension table: natural keys with their surrogate keys.
#[derive(Debug, Clone, PartialEq)]
pub struct Dimension<K: Ord + Clone> {
    name: &'static str,
    rows: Vec<(SurrogateKey, K)>,
    index: BTreeMap<K, SurrogateKey>,
}

impl<K: Ord + Clone> Dimension<K> {
    /// Build from any number of (possibly repeated) natural keys.
    pub fn from_keys(name: &'static str, keys: impl IntoIterator<Item = K>) -> Self {
        let distinct: BTreeSet<K> = keys.into_iter().collect();

        let rows: Vec<(SurrogateKey, K)> = distinct
            .into_iter()
            .enumerate()
            .map(|(i, key)| (i as SurrogateKey + 1, key))
            .collect();
        let index = rows.iter().map(|(id, key)| (key.clone(), *id)).collect();

        Self { name, rows, index }
    }

    /// Surrogate key of a natural key.
    pub fn resolve(&self, key: &K) -> Option<SurrogateKey> {
        self.index.get(key).copied()
    }

    /// Rows in surrogate-key order.
    pub fn rows(&self) -> &[(SurrogateKey, K)] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn resolve_for(&self, key: &K, record: &CoreRecord) -> Result<SurrogateKey>
    where
        K: std::fmt::Debug,
    {
        self.resolve(key).ok_or_else(|| {
            Error::referential_integrity(format!(
                "{} key {:?} of record {}#{} is not in its dimension",
                self.name, key, record.batch_period, record.source_row
            ))
        })
    }
}

/// One fact: dimension references plus measures.
#[derive(Debug, Clone, PartialEq)]
pub struct FactRow {
    pub period_key: SurrogateKey,
    pub company_key: SurrogateKey,
    pub country_key: SurrogateKey,
    pub product_key: SurrogateKey,
    pub form_number: Option<String>,
    pub serial_number: Option<String>,
    pub fob_usd: Option<f64>,
    pub fob_cop: Option<f64>,
    pub net_weight_kg: Option<f64>,
    pub gross_weight_kg: Option<f64>,
    pub units: Option<f64>,
}

/// The dimensional model derived from a core dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct StarSchema {
    pub companies: Dimension<CompanyKey>,
    pub countries: Dimension<CountryKey>,
    pub products: Dimension<ProductKey>,
    pub periods: Dimension<Period>,
    /// One fact per core record, in core order.
    pub facts: Vec<FactRow>,
}

impl StarSchema {
    /// Derive dimensions from `records` and resolve every record to a fact.
    pub fn build(records: &[CoreRecord]) -> Result<Self> {
        Self::assemble(records, records)
    }

    /// Dimensions come from `dimension_source`, facts from `records`. The
    /// two are the same set outside of tests.
    fn assemble(dimension_source: &[CoreRecord], records: &[CoreRecord]) -> Result<Self> {
        let companies = Dimension::from_keys(
            "company",
            dimension_source.iter().map(|r| r.record.company_key()),
        );
        let countries = Dimension::from_keys(
            "country",
            dimension_source.iter().map(|r| r.record.country_key()),
        );
        let products = Dimension::from_keys(
            "product",
            dimension_source.iter().map(|r| r.record.product_key()),
        );
        let periods = Dimension::from_keys("period", dimension_source.iter().map(|r| r.record.period));

        let mut schema = Self {
            companies,
            countries,
            products,
            periods,
            facts: Vec::with_capacity(records.len()),
        };
        for record in records {
            let fact = schema.fact_for(record)?;
            schema.facts.push(fact);
        }

        debug!(
            companies = schema.companies.len(),
            countries = schema.countries.len(),
            products = schema.products.len(),
            periods = schema.periods.len(),
            facts = schema.facts.len(),
            "built star schema"
        );
        Ok(schema)
    }

    fn fact_for(&self, core: &CoreRecord) -> Result<FactRow> {
        let r = &core.record;
        Ok(FactRow {
            period_key: self.periods.resolve_for(&r.period, core)?,
            company_key: self.companies.resolve_for(&r.company_key(), core)?,
            country_key: self.countries.resolve_for(&r.country_key(), core)?,
            product_key: self.products.resolve_for(&r.product_key(), core)?,
            form_number: r.form_number.clone(),
            serial_number: r.serial_number.clone(),
            fob_usd: r.fob_usd,
            fob_cop: r.fob_cop,
            net_weight_kg: r.net_weight_kg,
            gross_weight_kg: r.gross_weight_kg,
            units: r.units,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exportdw_core::{Field, FieldValue, NormalizedRecord};
    use std::collections::HashSet;

    fn core(row: u64, company: &str, country: &str, product: &str, month: u32) -> CoreRecord {
        let period = Period::new(2025, month).unwrap();
        let mut rec = NormalizedRecord::empty(period);
        rec.set(Field::CompanyName, FieldValue::Text(company.into()));
        rec.set(Field::CountryName, FieldValue::Text(country.into()));
        rec.set(Field::ProductCode, FieldValue::Text(product.into()));
        rec.set(Field::FobUsd, FieldValue::Number(100.0 + row as f64));
        CoreRecord {
            batch_period: period,
            source_row: row,
            record: rec,
        }
    }

    #[test]
    fn test_keys_follow_natural_key_order() {
        let dim = Dimension::from_keys("letters", ["c", "a", "b", "a"]);

        assert_eq!(dim.rows(), &[(1, "a"), (2, "b"), (3, "c")]);
        assert_eq!(dim.resolve(&"c"), Some(3));
        assert_eq!(dim.resolve(&"z"), None);
    }

    #[test]
    fn test_null_attributes_sort_first() {
        let with_name = CountryKey {
            code: None,
            name: Some("Chile".into()),
        };
        let unnamed = CountryKey { code: None, name: None };
        let dim = Dimension::from_keys("country", [with_name.clone(), unnamed.clone()]);

        assert_eq!(dim.resolve(&unnamed), Some(1));
        assert_eq!(dim.resolve(&with_name), Some(2));
    }

    #[test]
    fn test_build_shared_dimensions() {
        let records = vec![
            core(0, "ACME", "Chile", "Coffee", 1),
            core(1, "ACME", "Peru", "Coffee", 1),
            core(2, "GLOBEX", "Chile", "Flowers", 2),
        ];

        let schema = StarSchema::build(&records).unwrap();

        assert_eq!(schema.companies.len(), 2);
        assert_eq!(schema.countries.len(), 2);
        assert_eq!(schema.products.len(), 2);
        assert_eq!(schema.periods.len(), 2);
        assert_eq!(schema.facts.len(), records.len());
        assert_eq!(schema.facts[0].company_key, schema.facts[1].company_key);
        assert_eq!(schema.facts[0].country_key, schema.facts[2].country_key);
        assert_eq!(schema.facts[2].fob_usd, Some(102.0));
    }

    #[test]
    fn test_every_fact_resolves_to_one_dimension_row() {
        let records: Vec<CoreRecord> = (0..20)
            .map(|i| {
                core(
                    i,
                    ["ACME", "GLOBEX", "INITECH"][i as usize % 3],
                    ["Chile", "Peru"][i as usize % 2],
                    ["Coffee", "Flowers", "Bananas", "Gold"][i as usize % 4],
                    1 + (i as u32 % 3),
                )
            })
            .collect();

        let schema = StarSchema::build(&records).unwrap();

        let company_ids: HashSet<_> = schema.companies.rows().iter().map(|(id, _)| *id).collect();
        assert_eq!(company_ids.len(), schema.companies.len());
        for fact in &schema.facts {
            assert!(company_ids.contains(&fact.company_key));
            assert_eq!(
                schema.countries.rows().iter().filter(|(id, _)| *id == fact.country_key).count(),
                1
            );
            assert_eq!(
                schema.products.rows().iter().filter(|(id, _)| *id == fact.product_key).count(),
                1
            );
            assert_eq!(
                schema.periods.rows().iter().filter(|(id, _)| *id == fact.period_key).count(),
                1
            );
        }
    }

    #[test]
    fn test_keys_are_reproducible() {
        let records = vec![
            core(0, "GLOBEX", "Peru", "Gold", 2),
            core(1, "ACME", "Chile", "Coffee", 1),
        ];
        let mut reversed = records.clone();
        reversed.reverse();

        let a = StarSchema::build(&records).unwrap();
        let b = StarSchema::build(&reversed).unwrap();

        assert_eq!(a.companies, b.companies);
        assert_eq!(a.periods, b.periods);
        assert_eq!(a.companies.resolve(&records[1].record.company_key()), Some(1));
    }

    #[test]
    fn test_unresolvable_record_is_integrity_error() {
        let known = vec![core(0, "ACME", "Chile", "Coffee", 1)];
        let stray = vec![core(1, "GLOBEX", "Chile", "Coffee", 1)];

        let err = StarSchema::assemble(&known, &stray).unwrap_err();

        assert!(matches!(err, Error::ReferentialIntegrity(_)));
    }
}
