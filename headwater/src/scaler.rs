//! Per-column numeric scaling fitted on training data.
//!
//! The scaler is fitted on the training column only and the identical fitted
//! transform is applied to the eval column, before any feature index is
//! computed, so the recorded min/max of a numerical field reflect scaled
//! values. Scaled columns always become floating-point.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::common::{ColumnIdx, Result, TransformError};
use crate::table::{Column, Table};

/// A fit-once, apply-many transform of a single numeric column.
pub trait ColumnScaler: Sized {
    /// Fit on the non-NaN values of a training column.
    fn fit(values: &[f64]) -> Self;

    fn transform(&self, value: f64) -> f64;
}

/// `(x - mean) / std` with the population standard deviation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StandardScaler {
    pub mean: f64,
    pub scale: f64,
}

impl ColumnScaler for StandardScaler {
    fn fit(values: &[f64]) -> Self {
        let mut sum = 0.0f64;
        let mut count = 0u64;
        for &v in values.iter().filter(|v| !v.is_nan()) {
            sum += v;
            count += 1;
        }
        let mean = if count > 0 { sum / count as f64 } else { 0.0 };
        let mut var_sum = 0.0f64;
        for &v in values.iter().filter(|v| !v.is_nan()) {
            let d = v - mean;
            var_sum += d * d;
        }
        let std = if count > 0 {
            (var_sum / count as f64).sqrt()
        } else {
            0.0
        };
        // A constant column keeps its unit scale.
        let scale = if std > 0.0 { std } else { 1.0 };
        Self { mean, scale }
    }

    fn transform(&self, value: f64) -> f64 {
        (value - self.mean) / self.scale
    }
}

/// `(x - min) / (max - min)`, mapping the training range onto `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinMaxScaler {
    pub min: f64,
    pub scale: f64,
}

impl ColumnScaler for MinMaxScaler {
    fn fit(values: &[f64]) -> Self {
        let mut min_val = f64::INFINITY;
        let mut max_val = f64::NEG_INFINITY;
        for &v in values.iter().filter(|v| !v.is_nan()) {
            min_val = min_val.min(v);
            max_val = max_val.max(v);
        }
        if min_val > max_val {
            return Self { min: 0.0, scale: 1.0 };
        }
        let range = max_val - min_val;
        let scale = if range > 0.0 { range } else { 1.0 };
        Self {
            min: min_val,
            scale,
        }
    }

    fn transform(&self, value: f64) -> f64 {
        (value - self.min) / self.scale
    }
}

/// Which scaler to fit for numerical columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalerKind {
    Standard,
    MinMax,
}

impl FromStr for ScalerKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" | "zscore" => Ok(ScalerKind::Standard),
            "minmax" | "min-max" => Ok(ScalerKind::MinMax),
            other => Err(format!("unknown scaler '{other}', expected 'standard' or 'minmax'")),
        }
    }
}

impl fmt::Display for ScalerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalerKind::Standard => f.write_str("standard"),
            ScalerKind::MinMax => f.write_str("minmax"),
        }
    }
}

fn scale_column<S: ColumnScaler + fmt::Debug>(
    train: &mut Table,
    eval: &mut Table,
    col: ColumnIdx,
) -> Result<()> {
    let numeric = |table: &Table| -> Result<Vec<f64>> {
        let column = table.column(col)?;
        column.to_f64().ok_or_else(|| TransformError::Encoding {
            row: 0,
            col,
            reason: format!("cannot scale a {} column", column.type_name()),
        })
    };
    let train_values = numeric(train)?;
    let eval_values = numeric(eval)?;

    let scaler = S::fit(&train_values);
    debug!("  Scaler for column {col}: {scaler:?}");

    *train.column_mut(col)? = Column::Float(train_values.iter().map(|&v| scaler.transform(v)).collect());
    *eval.column_mut(col)? = Column::Float(eval_values.iter().map(|&v| scaler.transform(v)).collect());
    Ok(())
}

/// Fit one scaler per numerical column on `train` and apply it to both tables.
pub fn normalize_columns(
    train: &mut Table,
    eval: &mut Table,
    num_cols: &[ColumnIdx],
    kind: ScalerKind,
) -> Result<()> {
    for &col in num_cols {
        match kind {
            ScalerKind::Standard => scale_column::<StandardScaler>(train, eval, col)?,
            ScalerKind::MinMax => scale_column::<MinMaxScaler>(train, eval, col)?,
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
