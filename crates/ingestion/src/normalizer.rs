//! Column normalization.
//!
//! Maps a raw batch onto the canonical schema: headers are resolved once per
//! batch through the alias table, cells are coerced to the field type, and
//! rows lacking a required field are rejected.

use chrono::NaiveDate;
use exportdw_core::config::{NormalizerConfig, NumberFormat};
use exportdw_core::{Field, FieldType, FieldValue, NormalizedRecord, Period, RawBatch, RawRecord, RawValue};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Counts produced while normalizing one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizationStats {
    /// Non-blank rows read from the batch.
    pub rows_read: u64,
    /// Rows emitted as normalized records.
    pub rows_normalized: u64,
    /// Rows dropped for missing a required field.
    pub rows_rejected: u64,
    /// All-empty rows skipped before counting.
    pub blank_rows: u64,
    /// Non-empty cells that failed type coercion and became null.
    pub unparseable_values: u64,
    /// Rejections keyed by the first missing required field.
    pub rejections_by_field: BTreeMap<Field, u64>,
    /// Source columns with no canonical counterpart.
    pub dropped_columns: Vec<String>,
    /// Canonical fields the batch did not provide.
    pub missing_fields: Vec<Field>,
}

impl NormalizationStats {
    /// Fraction of read rows that were rejected.
    pub fn rejection_rate(&self) -> f64 {
        if self.rows_read > 0 {
            self.rows_rejected as f64 / self.rows_read as f64
        } else {
            0.0
        }
    }
}

/// A batch after normalization.
#[derive(Debug, Clone)]
pub struct NormalizedBatch {
    pub period: Period,
    pub records: Vec<NormalizedRecord>,
    pub stats: NormalizationStats,
}

/// Resolution of a batch's source columns to canonical fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMapping {
    /// Canonical field for each source column position.
    targets: Vec<Option<Field>>,
    /// Source headers that were not mapped.
    dropped: Vec<String>,
    /// Canonical fields with no source column.
    missing: Vec<Field>,
}

impl ColumnMapping {
    /// Resolve source headers. When two headers resolve to the same field the
    /// first one wins and the later one is dropped.
    pub fn resolve(columns: &[String], config: &NormalizerConfig) -> Self {
        let mut targets = Vec::with_capacity(columns.len());
        let mut dropped = Vec::new();
        let mut mapped = Vec::new();

        for header in columns {
            match config.resolve_header(header) {
                Some(field) if !mapped.contains(&field) => {
                    mapped.push(field);
                    targets.push(Some(field));
                }
                _ => {
                    dropped.push(header.clone());
                    targets.push(None);
                }
            }
        }

        let missing = Field::ALL
            .into_iter()
            .filter(|f| !mapped.contains(f))
            .collect();

        Self {
            targets,
            dropped,
            missing,
        }
    }

    /// Canonical field for a source column position.
    pub fn field_at(&self, idx: usize) -> Option<Field> {
        self.targets.get(idx).copied().flatten()
    }

    pub fn dropped(&self) -> &[String] {
        &self.dropped
    }

    pub fn missing(&self) -> &[Field] {
        &self.missing
    }

    /// Source positions that map to a canonical field.
    fn mapped(&self) -> impl Iterator<Item = (usize, Field)> + '_ {
        self.targets
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.map(|f| (i, f)))
    }
}

/// Normalizes raw batches into canonical records.
pub struct ColumnNormalizer {
    config: NormalizerConfig,
}

impl ColumnNormalizer {
    /// Create a new normalizer.
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Normalize one batch.
    pub fn normalize(&self, batch: &RawBatch) -> NormalizedBatch {
        let mapping = ColumnMapping::resolve(&batch.columns, &self.config);
        let mut stats = NormalizationStats {
            dropped_columns: mapping.dropped().to_vec(),
            missing_fields: mapping.missing().to_vec(),
            ..Default::default()
        };

        for header in mapping.dropped() {
            warn!(period = %batch.period, column = %header, "dropping unknown column");
        }
        if !mapping.missing().is_empty() {
            debug!(period = %batch.period, missing = ?mapping.missing(), "canonical columns absent, filled with nulls");
        }

        let mut records = Vec::with_capacity(batch.rows.len());
        for row in &batch.rows {
            if row.is_blank() {
                stats.blank_rows += 1;
                continue;
            }
            stats.rows_read += 1;

            let record = self.normalize_row(&mapping, batch.period, row, &mut stats);
            match record.first_missing(&self.config.required_fields) {
                Some(field) => {
                    stats.rows_rejected += 1;
                    *stats.rejections_by_field.entry(field).or_insert(0) += 1;
                }
                None => {
                    stats.rows_normalized += 1;
                    records.push(record);
                }
            }
        }

        info!(
            period = %batch.period,
            read = stats.rows_read,
            normalized = stats.rows_normalized,
            rejected = stats.rows_rejected,
            unparseable = stats.unparseable_values,
            "normalized batch"
        );

        NormalizedBatch {
            period: batch.period,
            records,
            stats,
        }
    }

    fn normalize_row(
        &self,
        mapping: &ColumnMapping,
        batch_period: Period,
        row: &RawRecord,
        stats: &mut NormalizationStats,
    ) -> NormalizedRecord {
        let mut record = NormalizedRecord::empty(batch_period);

        for (idx, field) in mapping.mapped() {
            let cell = row.get(idx);
            if cell.is_empty() {
                continue;
            }
            match self.coerce(field, cell) {
                Some(value) => {
                    record.set(field, value);
                }
                None => stats.unparseable_values += 1,
            }
        }

        if let Some(date) = record.declaration_date {
            record.period = Period::of_date(date);
        }
        record
    }

    /// Coerce a non-empty cell to the field type. `None` means unparseable.
    fn coerce(&self, field: Field, cell: &RawValue) -> Option<FieldValue> {
        match field.field_type() {
            FieldType::Text => text_value(cell).map(FieldValue::Text),
            FieldType::Number => match cell {
                RawValue::Number(n) if n.is_finite() => Some(*n),
                RawValue::Text(s) => parse_number(s, self.config.number_format),
                _ => None,
            }
            .map(FieldValue::Number),
            FieldType::Date => match cell {
                RawValue::Date(d) => Some(*d),
                RawValue::Number(n) if n.fract() == 0.0 => {
                    parse_date(&format!("{}", *n as i64), &self.config.date_formats)
                }
                RawValue::Text(s) => parse_date(s, &self.config.date_formats),
                _ => None,
            }
            .map(FieldValue::Date),
        }
    }
}

/// Render a cell as trimmed text; integral numbers lose their fraction so
/// that identifiers stored as numbers (tax ids, tariff codes) read naturally.
fn text_value(cell: &RawValue) -> Option<String> {
    let text = match cell {
        RawValue::Empty => return None,
        RawValue::Text(s) => s.trim().to_string(),
        RawValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
        RawValue::Number(n) => n.to_string(),
        RawValue::Bool(b) => b.to_string(),
        RawValue::Date(d) => d.format("%Y-%m-%d").to_string(),
    };
    (!text.is_empty()).then_some(text)
}

/// Parse a locale-formatted number. A thousands separator is accepted only
/// between full groups: 1 to 3 leading digits, then groups of exactly 3, all
/// before the decimal separator. Anything else fails closed.
pub fn parse_number(text: &str, format: NumberFormat) -> Option<f64> {
    let s = text.trim();
    let (sign, body) = match s.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", s.strip_prefix('+').unwrap_or(s)),
    };

    let (int_part, frac_part) = match body.split_once(format.decimal_separator) {
        Some((i, f)) => (i, Some(f)),
        None => (body, None),
    };

    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    let mut groups = int_part.split(format.thousands_separator);
    let first = groups.next().unwrap_or_default();
    let rest: Vec<&str> = groups.collect();
    if !all_digits(first) || (!rest.is_empty() && !(1..=3).contains(&first.len())) {
        return None;
    }
    if !rest.iter().all(|g| g.len() == 3 && all_digits(g)) {
        return None;
    }

    let frac = frac_part.unwrap_or_default();
    if !all_digits(frac) || (first.is_empty() && frac.is_empty()) {
        return None;
    }

    let int_digits: String = std::iter::once(first).chain(rest).collect();
    let normalized = if frac_part.is_some() {
        format!("{sign}{int_digits}.{frac}")
    } else {
        format!("{sign}{int_digits}")
    };
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a date against the accepted formats, in order.
pub fn parse_date(text: &str, formats: &[String]) -> Option<NaiveDate> {
    let s = text.trim();
    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}
