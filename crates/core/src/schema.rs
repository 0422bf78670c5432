//! Canonical schema of a trade-export record.
//!
//! Every column a batch may carry is declared here, in output order, with its
//! value type. Source headers are resolved against this table (and the alias
//! map in [`crate::config::NormalizerConfig`]); nothing is looked up by free
//! text anywhere else.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Value type of a canonical field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Number,
    Date,
}

/// A canonical field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    FormNumber,
    SerialNumber,
    DeclarationDate,
    CompanyId,
    CompanyName,
    CompanyAddress,
    CountryCode,
    CountryName,
    ProductCode,
    ProductDescription,
    Units,
    GrossWeightKg,
    NetWeightKg,
    FobUsd,
    FobCop,
}

impl Field {
    /// All canonical fields in schema order.
    pub const ALL: [Field; 15] = [
        Field::FormNumber,
        Field::SerialNumber,
        Field::DeclarationDate,
        Field::CompanyId,
        Field::CompanyName,
        Field::CompanyAddress,
        Field::CountryCode,
        Field::CountryName,
        Field::ProductCode,
        Field::ProductDescription,
        Field::Units,
        Field::GrossWeightKg,
        Field::NetWeightKg,
        Field::FobUsd,
        Field::FobCop,
    ];

    /// Canonical column name, as written by the export system.
    pub fn column(self) -> &'static str {
        match self {
            Field::FormNumber => "NUMERO_FORMULARIO",
            Field::SerialNumber => "NUMERO_SERIE",
            Field::DeclarationDate => "FECHA_DECLARACION_EXPORTACION",
            Field::CompanyId => "NIT_EXPORTADOR",
            Field::CompanyName => "RAZON_SOCIAL_EXPORTADOR",
            Field::CompanyAddress => "DIREC_EXPORTADOR",
            Field::CountryCode => "COD_PAIS_DESTINO",
            Field::CountryName => "PAIS_DESTINO_FINAL",
            Field::ProductCode => "SUBPARTIDA",
            Field::ProductDescription => "DESCRIPCION_MERCANCIA",
            Field::Units => "CANTIDAD_UNIDADES_FISICAS",
            Field::GrossWeightKg => "PESO_BRUTO_KGS",
            Field::NetWeightKg => "PESO_NETO_KGS",
            Field::FobUsd => "VALOR_FOB_USD",
            Field::FobCop => "VALOR_FOB_PESOS",
        }
    }

    /// Value type of the field.
    pub fn field_type(self) -> FieldType {
        match self {
            Field::DeclarationDate => FieldType::Date,
            Field::Units
            | Field::GrossWeightKg
            | Field::NetWeightKg
            | Field::FobUsd
            | Field::FobCop => FieldType::Number,
            _ => FieldType::Text,
        }
    }

    /// Look up a field by its canonical column name.
    pub fn from_column(name: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|f| f.column() == name)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Normalize a source header for lookup: trimmed and upper-cased.
pub fn normalize_header(header: &str) -> String {
    header.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_are_unique() {
        let mut names: Vec<&str> = Field::ALL.iter().map(|f| f.column()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Field::ALL.len());
    }

    #[test]
    fn test_from_column_round_trips() {
        for field in Field::ALL {
            assert_eq!(Field::from_column(field.column()), Some(field));
        }
        assert_eq!(Field::from_column("NUM_SERIE"), None);
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("  numero serie "), "NUMERO SERIE");
        assert_eq!(normalize_header("Valor_Fob_Usd"), "VALOR_FOB_USD");
    }
}
