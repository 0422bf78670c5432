//! Core data types for the export warehouse.

use crate::error::Error;
use crate::schema::Field;
use chrono::{Datelike, NaiveDate};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A reporting period (calendar month).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    /// Create a period, rejecting months outside 1..=12.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// Period containing the given date.
    pub fn of_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = Error;

    /// Accepts `YYYY-MM` and `YYYYMM`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (year, month) = match s.split_once('-') {
            Some((y, m)) => (y, m),
            None if s.len() == 6 && s.bytes().all(|b| b.is_ascii_digit()) => s.split_at(4),
            None => return Err(Error::data(format!("invalid period '{s}'"))),
        };
        let year: i32 = year
            .parse()
            .map_err(|_| Error::data(format!("invalid period year in '{s}'")))?;
        let month: u32 = month
            .parse()
            .map_err(|_| Error::data(format!("invalid period month in '{s}'")))?;
        Period::new(year, month).ok_or_else(|| Error::data(format!("invalid period month in '{s}'")))
    }
}

impl TryFrom<String> for Period {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(p: Period) -> Self {
        p.to_string()
    }
}

/// An untyped cell from a source batch.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
}

impl RawValue {
    /// True for empty cells and whitespace-only text.
    pub fn is_empty(&self) -> bool {
        match self {
            RawValue::Empty => true,
            RawValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

/// One positional row of a raw batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub cells: Vec<RawValue>,
}

impl RawRecord {
    pub fn new(cells: Vec<RawValue>) -> Self {
        Self { cells }
    }

    /// Cell at a column index; short rows read as empty.
    pub fn get(&self, idx: usize) -> &RawValue {
        static EMPTY: RawValue = RawValue::Empty;
        self.cells.get(idx).unwrap_or(&EMPTY)
    }

    /// True if every cell is empty.
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(RawValue::is_empty)
    }
}

/// A source batch: one spreadsheet for one reporting period.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBatch {
    /// Period the batch was published for.
    pub period: Period,
    /// Source headers, as found.
    pub columns: Vec<String>,
    /// Data rows in source order.
    pub rows: Vec<RawRecord>,
}

/// A typed value for a canonical field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

/// A row conforming to the canonical schema.
///
/// Serialized field names are the canonical column names, so the staging
/// header is the schema itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    /// Reporting period: month of the declaration date, else the batch period.
    #[serde(rename = "PERIODO")]
    pub period: Period,
    #[serde(rename = "NUMERO_FORMULARIO")]
    pub form_number: Option<String>,
    #[serde(rename = "NUMERO_SERIE")]
    pub serial_number: Option<String>,
    #[serde(rename = "FECHA_DECLARACION_EXPORTACION")]
    pub declaration_date: Option<NaiveDate>,
    #[serde(rename = "NIT_EXPORTADOR")]
    pub company_id: Option<String>,
    #[serde(rename = "RAZON_SOCIAL_EXPORTADOR")]
    pub company_name: Option<String>,
    #[serde(rename = "DIREC_EXPORTADOR")]
    pub company_address: Option<String>,
    #[serde(rename = "COD_PAIS_DESTINO")]
    pub country_code: Option<String>,
    #[serde(rename = "PAIS_DESTINO_FINAL")]
    pub country_name: Option<String>,
    #[serde(rename = "SUBPARTIDA")]
    pub product_code: Option<String>,
    #[serde(rename = "DESCRIPCION_MERCANCIA")]
    pub product_description: Option<String>,
    #[serde(rename = "CANTIDAD_UNIDADES_FISICAS")]
    pub units: Option<f64>,
    #[serde(rename = "PESO_BRUTO_KGS")]
    pub gross_weight_kg: Option<f64>,
    #[serde(rename = "PESO_NETO_KGS")]
    pub net_weight_kg: Option<f64>,
    #[serde(rename = "VALOR_FOB_USD")]
    pub fob_usd: Option<f64>,
    #[serde(rename = "VALOR_FOB_PESOS")]
    pub fob_cop: Option<f64>,
}

impl NormalizedRecord {
    /// A record with every field null.
    pub fn empty(period: Period) -> Self {
        Self {
            period,
            form_number: None,
            serial_number: None,
            declaration_date: None,
            company_id: None,
            company_name: None,
            company_address: None,
            country_code: None,
            country_name: None,
            product_code: None,
            product_description: None,
            units: None,
            gross_weight_kg: None,
            net_weight_kg: None,
            fob_usd: None,
            fob_cop: None,
        }
    }

    fn text_slot(&mut self, field: Field) -> Option<&mut Option<String>> {
        Some(match field {
            Field::FormNumber => &mut self.form_number,
            Field::SerialNumber => &mut self.serial_number,
            Field::CompanyId => &mut self.company_id,
            Field::CompanyName => &mut self.company_name,
            Field::CompanyAddress => &mut self.company_address,
            Field::CountryCode => &mut self.country_code,
            Field::CountryName => &mut self.country_name,
            Field::ProductCode => &mut self.product_code,
            Field::ProductDescription => &mut self.product_description,
            _ => return None,
        })
    }

    fn number_slot(&mut self, field: Field) -> Option<&mut Option<f64>> {
        Some(match field {
            Field::Units => &mut self.units,
            Field::GrossWeightKg => &mut self.gross_weight_kg,
            Field::NetWeightKg => &mut self.net_weight_kg,
            Field::FobUsd => &mut self.fob_usd,
            Field::FobCop => &mut self.fob_cop,
            _ => return None,
        })
    }

    /// Store a typed value. Returns false if the value type does not match
    /// the field type; the field is left untouched in that case.
    pub fn set(&mut self, field: Field, value: FieldValue) -> bool {
        match value {
            FieldValue::Text(s) => match self.text_slot(field) {
                Some(slot) => {
                    *slot = Some(s);
                    true
                }
                None => false,
            },
            FieldValue::Number(n) => match self.number_slot(field) {
                Some(slot) => {
                    *slot = Some(n);
                    true
                }
                None => false,
            },
            FieldValue::Date(d) if field == Field::DeclarationDate => {
                self.declaration_date = Some(d);
                true
            }
            FieldValue::Date(_) => false,
        }
    }

    /// True if the field holds no value.
    pub fn is_null(&self, field: Field) -> bool {
        match field {
            Field::FormNumber => self.form_number.is_none(),
            Field::SerialNumber => self.serial_number.is_none(),
            Field::DeclarationDate => self.declaration_date.is_none(),
            Field::CompanyId => self.company_id.is_none(),
            Field::CompanyName => self.company_name.is_none(),
            Field::CompanyAddress => self.company_address.is_none(),
            Field::CountryCode => self.country_code.is_none(),
            Field::CountryName => self.country_name.is_none(),
            Field::ProductCode => self.product_code.is_none(),
            Field::ProductDescription => self.product_description.is_none(),
            Field::Units => self.units.is_none(),
            Field::GrossWeightKg => self.gross_weight_kg.is_none(),
            Field::NetWeightKg => self.net_weight_kg.is_none(),
            Field::FobUsd => self.fob_usd.is_none(),
            Field::FobCop => self.fob_cop.is_none(),
        }
    }

    /// First required field that is null, if any.
    pub fn first_missing(&self, required: &[Field]) -> Option<Field> {
        required.iter().copied().find(|&f| self.is_null(f))
    }

    pub fn company_key(&self) -> CompanyKey {
        CompanyKey {
            id: self.company_id.clone(),
            name: self.company_name.clone(),
            address: self.company_address.clone(),
        }
    }

    pub fn country_key(&self) -> CountryKey {
        CountryKey {
            code: self.country_code.clone(),
            name: self.country_name.clone(),
        }
    }

    pub fn product_key(&self) -> ProductKey {
        ProductKey {
            code: self.product_code.clone(),
            description: self.product_description.clone(),
        }
    }

    /// Key identifying a declaration line for deduplication.
    pub fn business_key(&self) -> BusinessKey {
        BusinessKey {
            company: self.company_key(),
            country: self.country_key(),
            product: self.product_key(),
            period: self.period,
            fob_usd: self.fob_usd.map(OrderedFloat),
            net_weight_kg: self.net_weight_kg.map(OrderedFloat),
        }
    }
}

/// Natural key of the company dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompanyKey {
    pub id: Option<String>,
    pub name: Option<String>,
    pub address: Option<String>,
}

/// Natural key of the destination country dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CountryKey {
    pub code: Option<String>,
    pub name: Option<String>,
}

/// Natural key of the product dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProductKey {
    pub code: Option<String>,
    pub description: Option<String>,
}

/// Exact-match deduplication key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BusinessKey {
    pub company: CompanyKey,
    pub country: CountryKey,
    pub product: ProductKey,
    pub period: Period,
    pub fob_usd: Option<OrderedFloat<f64>>,
    pub net_weight_kg: Option<OrderedFloat<f64>>,
}

/// A normalized record as persisted in one staged batch.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedBatch {
    pub period: Period,
    pub records: Vec<NormalizedRecord>,
}

/// A deduplicated record of the canonical dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreRecord {
    /// Batch the record was first seen in.
    pub batch_period: Period,
    /// Row index within that batch (0-based).
    pub source_row: u64,
    pub record: NormalizedRecord,
}
