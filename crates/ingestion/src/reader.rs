//! Raw batch reading.
//!
//! Spreadsheets (xlsx, xlsm, xlsb, xls, ods) are read through calamine; CSV
//! exports through the csv crate. Either way the result is a positional
//! [`RawBatch`] with the headers exactly as found; no column is interpreted
//! here.

use calamine::{open_workbook_auto, Data, Reader};
use chrono::NaiveDate;
use exportdw_core::{Error, Period, RawBatch, RawRecord, RawValue, Result};
use std::path::Path;
use tracing::debug;

/// Read one batch, choosing the decoder from the file extension.
pub fn read_batch(path: &Path, period: Period, sheet: Option<&str>) -> Result<RawBatch> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let batch = match ext.as_str() {
        "csv" => read_csv(path, period)?,
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_spreadsheet(path, period, sheet)?,
        other => {
            return Err(Error::data(format!(
                "unsupported input format '{other}' for {}",
                path.display()
            )))
        }
    };

    debug!(
        path = %path.display(),
        %period,
        columns = batch.columns.len(),
        rows = batch.rows.len(),
        "read raw batch"
    );
    Ok(batch)
}

/// Read a worksheet. Uses the first sheet when `sheet` is `None`.
pub fn read_spreadsheet(path: &Path, period: Period, sheet: Option<&str>) -> Result<RawBatch> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| Error::spreadsheet(format!("{}: {e}", path.display())))?;

    let sheet_name = match sheet {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| Error::spreadsheet(format!("{}: workbook has no sheets", path.display())))?,
    };

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| Error::spreadsheet(format!("{}[{sheet_name}]: {e}", path.display())))?;

    let mut rows = range.rows();
    let columns = rows
        .next()
        .map(|header| header.iter().map(header_text).collect())
        .unwrap_or_default();
    let rows = rows
        .map(|row| RawRecord::new(row.iter().map(convert_cell).collect()))
        .collect();

    Ok(RawBatch {
        period,
        columns,
        rows,
    })
}

/// Read a delimited export. Every non-empty field is kept as text.
pub fn read_csv(path: &Path, period: Period) -> Result<RawBatch> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let columns = reader.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let cells = record
            .iter()
            .map(|field| {
                if field.is_empty() {
                    RawValue::Empty
                } else {
                    RawValue::Text(field.to_string())
                }
            })
            .collect();
        rows.push(RawRecord::new(cells));
    }

    Ok(RawBatch {
        period,
        columns,
        rows,
    })
}

fn header_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

/// Convert a calamine cell. Cell errors (`#N/A` and friends) read as empty.
pub fn convert_cell(cell: &Data) -> RawValue {
    match cell {
        Data::Empty | Data::Error(_) => RawValue::Empty,
        Data::String(s) => RawValue::Text(s.clone()),
        Data::Float(f) => RawValue::Number(*f),
        Data::Int(i) => RawValue::Number(*i as f64),
        Data::Bool(b) => RawValue::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ts) => RawValue::Date(ts.date()),
            None => RawValue::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) => s
            .get(..10)
            .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
            .map(RawValue::Date)
            .unwrap_or_else(|| RawValue::Text(s.clone())),
        Data::DurationIso(s) => RawValue::Text(s.clone()),
    }
}
