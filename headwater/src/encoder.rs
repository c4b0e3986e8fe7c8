//! Encoding of table rows into libsvm / libffm text lines.
//!
//! A line is the label followed by one token per encoded field, in ascending
//! field rank:
//!
//! ```text
//! libsvm:  1 3:1 7:0.25 12:1
//! libffm:  1 0:3:1 1:7:0.25 2:12:1
//! ```

use std::fmt::{self, Write};

use serde::{Deserialize, Serialize};

use crate::common::{ColumnIdx, FeatureIdx, FieldIdx, Result, TransformError};
use crate::index::{FeatureIndex, FieldKind};
use crate::table::{CellRef, Table};

/// Output line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureFormat {
    LibSvm,
    #[default]
    LibFfm,
}

impl fmt::Display for FeatureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureFormat::LibSvm => f.write_str("libsvm"),
            FeatureFormat::LibFfm => f.write_str("libffm"),
        }
    }
}

/// Value part of a single `feature:value` token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureValue {
    /// Categorical indicator, always written as `1`.
    One,
    Int(i64),
    Float(f64),
}

/// Round to `precision` decimal places. Negative zero collapses to zero.
pub fn round_float(value: f64, precision: Option<u32>) -> f64 {
    let rounded = match precision {
        Some(p) => {
            let m = 10f64.powi(p as i32);
            let scaled = value * m;
            // Magnitudes this large carry no fractional digits.
            if scaled.is_finite() { scaled.round() / m } else { value }
        }
        None => value,
    };
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// Token formatting shared by real rows and synthetic negatives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenFormat {
    pub format: FeatureFormat,
    pub float_precision: Option<u32>,
}

impl TokenFormat {
    pub fn write_label(&self, out: &mut String, positive: bool) {
        out.push(if positive { '1' } else { '0' });
    }

    /// Append ` [field:]feature:value` to `out`.
    pub fn write_token(&self, out: &mut String, field: FieldIdx, feature: FeatureIdx, value: FeatureValue) {
        match self.format {
            FeatureFormat::LibSvm => write!(out, " {feature}:").ok(),
            FeatureFormat::LibFfm => write!(out, " {field}:{feature}:").ok(),
        };
        match value {
            FeatureValue::One => out.push('1'),
            FeatureValue::Int(v) => {
                write!(out, "{v}").ok();
            }
            FeatureValue::Float(v) => {
                write!(out, "{}", round_float(v, self.float_precision)).ok();
            }
        }
    }
}

// ============================================================================
// Row Encoder
// ============================================================================

/// Encodes rows of a table against a fitted [`FeatureIndex`].
///
/// Categorical values missing from the index map to the reserved feature 0.
#[derive(Debug, Clone, Copy)]
pub struct RowEncoder<'a> {
    index: &'a FeatureIndex,
    tokens: TokenFormat,
}

impl<'a> RowEncoder<'a> {
    pub fn new(index: &'a FeatureIndex, tokens: TokenFormat) -> Self {
        Self { index, tokens }
    }

    pub fn tokens(&self) -> TokenFormat {
        self.tokens
    }

    /// Check that `row` can be encoded without writing anything.
    pub fn validate(&self, table: &Table, row: usize) -> Result<()> {
        self.label(table, row)?;
        for entry in self.index.fields() {
            if let FieldKind::Numerical(_) = entry.kind {
                numeric_value(table.column(entry.column)?.cell(row), row, entry.column)?;
            }
        }
        Ok(())
    }

    /// Overwrite `out` with the encoded line for `row`, without a newline.
    pub fn encode(&self, table: &Table, row: usize, out: &mut String) -> Result<()> {
        out.clear();
        let positive = self.label(table, row)?;
        self.tokens.write_label(out, positive);

        for entry in self.index.fields() {
            let cell = table.column(entry.column)?.cell(row);
            match &entry.kind {
                FieldKind::Categorical(cats) => {
                    self.tokens
                        .write_token(out, entry.field, cats.lookup(cell), FeatureValue::One);
                }
                FieldKind::Numerical(num) => {
                    let value = numeric_value(cell, row, entry.column)?;
                    self.tokens.write_token(out, entry.field, num.feature, value);
                }
            }
        }
        Ok(())
    }

    fn label(&self, table: &Table, row: usize) -> Result<bool> {
        let col = self.index.label_col();
        match table.column(col)?.cell(row) {
            CellRef::Int(1) => Ok(true),
            CellRef::Int(0) => Ok(false),
            other => Err(TransformError::Encoding {
                row,
                col,
                reason: format!("label must be 0 or 1, got {other:?}"),
            }),
        }
    }
}

fn numeric_value(cell: CellRef<'_>, row: usize, col: ColumnIdx) -> Result<FeatureValue> {
    match cell {
        CellRef::Int(v) => Ok(FeatureValue::Int(v)),
        CellRef::Float(v) if v.is_nan() => Err(TransformError::Data(format!(
            "missing numeric value at row {row}, column {col}"
        ))),
        CellRef::Float(v) if v.is_infinite() => Err(TransformError::Data(format!(
            "non-finite numeric value {v} at row {row}, column {col}"
        ))),
        CellRef::Float(v) => Ok(FeatureValue::Float(v)),
        CellRef::Text(s) => Err(TransformError::Encoding {
            row,
            col,
            reason: format!("numerical field holds non-numeric value '{s}'"),
        }),
    }
}
