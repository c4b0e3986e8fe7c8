//! In-memory column store for raw CSV input.
//!
//! Each input column is stored as one typed vector. The type is inferred per
//! column at load time: a column whose every cell parses as `i64` is
//! [`Column::Int`], one whose non-empty cells all parse as `f64` is
//! [`Column::Float`] (empty cells become NaN), and anything else is
//! [`Column::Text`]. Rows are identified only by position.

use std::path::Path;

use csv::{ReaderBuilder, Trim};
use rand::prelude::*;
use rand::rngs::SmallRng;
use tracing::{debug, info};

use crate::common::{ColumnIdx, Result, TransformError};

// ============================================================================
// Columns & Cells
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Text(Vec<String>),
}

/// Borrowed view of a single cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CellRef<'a> {
    Int(i64),
    Float(f64),
    Text(&'a str),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Int(v) => v.len(),
            Column::Float(v) => v.len(),
            Column::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cell(&self, row: usize) -> CellRef<'_> {
        match self {
            Column::Int(v) => CellRef::Int(v[row]),
            Column::Float(v) => CellRef::Float(v[row]),
            Column::Text(v) => CellRef::Text(&v[row]),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Column::Int(_) => "integer",
            Column::Float(_) => "float",
            Column::Text(_) => "text",
        }
    }

    /// Numeric view of the column, or `None` for text columns.
    pub fn to_f64(&self) -> Option<Vec<f64>> {
        match self {
            Column::Int(v) => Some(v.iter().map(|&x| x as f64).collect()),
            Column::Float(v) => Some(v.clone()),
            Column::Text(_) => None,
        }
    }

    fn take(&self, rows: &[usize]) -> Column {
        match self {
            Column::Int(v) => Column::Int(rows.iter().map(|&r| v[r]).collect()),
            Column::Float(v) => Column::Float(rows.iter().map(|&r| v[r]).collect()),
            Column::Text(v) => Column::Text(rows.iter().map(|&r| v[r].clone()).collect()),
        }
    }

    /// Infer the narrowest column type that holds every raw cell.
    fn infer(raw: Vec<String>) -> Column {
        if let Ok(ints) = raw.iter().map(|s| s.parse::<i64>()).collect::<std::result::Result<Vec<_>, _>>() {
            return Column::Int(ints);
        }
        let floats: Option<Vec<f64>> = raw
            .iter()
            .map(|s| {
                if s.is_empty() {
                    Some(f64::NAN)
                } else {
                    s.parse::<f64>().ok()
                }
            })
            .collect();
        match floats {
            // A column of nothing but empty cells carries no numbers.
            Some(f) if raw.iter().any(|s| !s.is_empty()) => Column::Float(f),
            _ => Column::Text(raw),
        }
    }
}

// ============================================================================
// Table
// ============================================================================

/// A rectangular table of typed columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    header: Option<Vec<String>>,
    columns: Vec<Column>,
    num_rows: usize,
}

/// How raw label values are turned into `0`/`1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LabelRule {
    /// `1` if the raw label is strictly greater than the threshold, else `0`.
    Threshold(f64),
    /// Implicit-feedback data: every observed row is a positive.
    AllPositive,
}

impl Table {
    /// Build a table from column vectors. All columns must have the same length.
    pub fn from_columns(header: Option<Vec<String>>, columns: Vec<Column>) -> Result<Self> {
        let num_rows = columns.first().map(Column::len).unwrap_or(0);
        if let Some((i, c)) = columns.iter().enumerate().find(|(_, c)| c.len() != num_rows) {
            return Err(TransformError::Data(format!(
                "column {i} has {} rows, expected {num_rows}",
                c.len()
            )));
        }
        if let Some(h) = &header {
            if h.len() != columns.len() {
                return Err(TransformError::Data(format!(
                    "header has {} names for {} columns",
                    h.len(),
                    columns.len()
                )));
            }
        }
        Ok(Self {
            header,
            columns,
            num_rows,
        })
    }

    /// Build a table from row-major string records, inferring column types.
    pub fn from_records(header: Option<Vec<String>>, records: Vec<Vec<String>>) -> Result<Self> {
        let num_cols = match (&header, records.first()) {
            (Some(h), _) => h.len(),
            (None, Some(r)) => r.len(),
            (None, None) => 0,
        };
        let mut raw_cols: Vec<Vec<String>> = vec![Vec::with_capacity(records.len()); num_cols];
        for (row, record) in records.into_iter().enumerate() {
            if record.len() != num_cols {
                return Err(TransformError::Data(format!(
                    "row {row} has {} fields, expected {num_cols}",
                    record.len()
                )));
            }
            for (col, value) in record.into_iter().enumerate() {
                raw_cols[col].push(value);
            }
        }
        let columns = raw_cols.into_iter().map(Column::infer).collect();
        Self::from_columns(header, columns)
    }

    /// Load a delimited text file.
    pub fn read_csv(path: &Path, delimiter: u8, has_header: bool) -> Result<Self> {
        let (header, records) = read_records(path, delimiter, has_header)?;
        let table = Self::from_records(header, records)?;
        table.log_loaded(path);
        Ok(table)
    }

    /// Load separately split train and eval files.
    ///
    /// Column types are inferred over the rows of both files together, so a
    /// value such as `1` has the same type on both sides even when only one
    /// file holds a `2.5` in that column. The train header names the columns.
    pub fn read_csv_pair(
        train_path: &Path,
        eval_path: &Path,
        delimiter: u8,
        has_header: bool,
    ) -> Result<(Self, Self)> {
        let (header, mut records) = read_records(train_path, delimiter, has_header)?;
        let (eval_header, eval_records) = read_records(eval_path, delimiter, has_header)?;

        let width = |h: &Option<Vec<String>>, r: &[Vec<String>]| {
            h.as_ref().map(Vec::len).or_else(|| r.first().map(Vec::len))
        };
        if let (Some(t), Some(e)) = (width(&header, &records), width(&eval_header, &eval_records)) {
            if t != e {
                return Err(TransformError::Data(format!(
                    "train has {t} columns but eval has {e}"
                )));
            }
        }

        let n_train = records.len();
        records.extend(eval_records);
        let joined = Self::from_records(header, records)?;
        let train = joined.take_rows(&(0..n_train).collect::<Vec<_>>());
        let eval = joined.take_rows(&(n_train..joined.num_rows()).collect::<Vec<_>>());
        train.log_loaded(train_path);
        eval.log_loaded(eval_path);
        Ok((train, eval))
    }

    fn log_loaded(&self, path: &Path) {
        info!(
            "  Loaded {} ({} rows, {} columns)",
            path.display(),
            self.num_rows(),
            self.num_columns()
        );
        for (i, c) in self.columns.iter().enumerate() {
            debug!("    column {i} ({}): {}", self.column_name(ColumnIdx(i as u32)), c.type_name());
        }
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    pub fn column(&self, col: ColumnIdx) -> Result<&Column> {
        self.columns.get(col.0 as usize).ok_or_else(|| {
            TransformError::Configuration(format!(
                "column index {col} is out of range for a table with {} columns",
                self.columns.len()
            ))
        })
    }

    pub fn column_mut(&mut self, col: ColumnIdx) -> Result<&mut Column> {
        let num_cols = self.columns.len();
        self.columns.get_mut(col.0 as usize).ok_or_else(|| {
            TransformError::Configuration(format!(
                "column index {col} is out of range for a table with {num_cols} columns"
            ))
        })
    }

    /// Header name of a column, or its index when the input had no header.
    pub fn column_name(&self, col: ColumnIdx) -> String {
        self.header
            .as_ref()
            .and_then(|h| h.get(col.0 as usize).cloned())
            .unwrap_or_else(|| format!("col_{}", col.0))
    }

    /// Copy the given rows, in the given order, into a new table.
    pub fn take_rows(&self, rows: &[usize]) -> Table {
        Table {
            header: self.header.clone(),
            columns: self.columns.iter().map(|c| c.take(rows)).collect(),
            num_rows: rows.len(),
        }
    }

    /// Replace the label column with `0`/`1` integers.
    pub fn binarize_labels(&mut self, label_col: ColumnIdx, rule: LabelRule) -> Result<()> {
        let num_rows = self.num_rows;
        let column = self.column_mut(label_col)?;
        let labels: Vec<i64> = match rule {
            LabelRule::AllPositive => vec![1; num_rows],
            LabelRule::Threshold(threshold) => {
                let raw = column.to_f64().ok_or_else(|| {
                    TransformError::Data(format!(
                        "label column {label_col} is not numeric and cannot be binarized"
                    ))
                })?;
                raw.iter().map(|&v| i64::from(v > threshold)).collect()
            }
        };
        *column = Column::Int(labels);
        Ok(())
    }
}

/// Header (when present) and raw string records of a delimited file.
fn read_records(
    path: &Path,
    delimiter: u8,
    has_header: bool,
) -> Result<(Option<Vec<String>>, Vec<Vec<String>>)> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(has_header)
        .trim(Trim::All)
        .from_path(path)?;

    let header = if has_header {
        Some(reader.headers()?.iter().map(str::to_string).collect())
    } else {
        None
    };

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record?;
        records.push(record.iter().map(str::to_string).collect::<Vec<String>>());
    }
    Ok((header, records))
}

// ============================================================================
// Train / Eval Split
// ============================================================================

/// Shuffle row positions with a seeded RNG and cut them into train and eval
/// tables. The train side gets `floor(train_frac * n)` rows.
pub fn train_eval_split(table: &Table, train_frac: f64, seed: u64) -> Result<(Table, Table)> {
    if !(train_frac > 0.0 && train_frac < 1.0) {
        return Err(TransformError::Configuration(format!(
            "train fraction must lie strictly between 0 and 1, got {train_frac}"
        )));
    }
    let n = table.num_rows();
    let n_train = (train_frac * n as f64).floor() as usize;
    if n_train == 0 || n_train == n {
        return Err(TransformError::Data(format!(
            "splitting {n} rows with train fraction {train_frac} leaves one side empty"
        )));
    }

    let mut rows: Vec<usize> = (0..n).collect();
    let mut rng = SmallRng::seed_from_u64(seed);
    rows.shuffle(&mut rng);

    let train = table.take_rows(&rows[..n_train]);
    let eval = table.take_rows(&rows[n_train..]);
    info!("  Split {} rows into {} train / {} eval", n, train.num_rows(), eval.num_rows());
    Ok((train, eval))
}

// ============================================================================
// Tests
// ============================================================================
