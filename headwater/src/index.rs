//! Vocabulary and range indexing of the training table.
//!
//! The fitted [`FeatureIndex`] is the only state shared between the train and
//! eval passes. It is built once from training data and is read-only after
//! construction.
//!
//! ## Index space
//!
//! Feature index 0 is reserved for out-of-vocabulary values. A running offset
//! starting at 1 walks every categorical column in ascending column order, then
//! continues over the numerical columns in ascending column order:
//!
//! | role        | consumes                           | records                 |
//! |-------------|------------------------------------|-------------------------|
//! | categorical | one index per distinct train value | value → index           |
//! | numerical   | exactly one index                  | `(index, min, max)`     |
//!
//! Distinct categorical values are sorted by value before numbering, so the
//! assignment depends only on the set of training values, not on row order.
//! Field ranks are independent of this numbering and follow column order.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::Path;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info};

use crate::common::{
    ColumnIdx, ColumnLayout, ColumnRole, FeatureIdx, FieldIdx, OOV_FEATURE, Result, TransformError,
};
use crate::scheduler::SampleSink;
use crate::table::{CellRef, Column, Table};
use crate::writer::{SampleWriter, StagedArtifact};

// ============================================================================
// Category Keys
// ============================================================================

/// A float usable as a map key: equality, hashing and ordering all follow
/// [`f64::total_cmp`].
#[derive(Debug, Clone, Copy)]
pub struct FloatKey(pub f64);

impl PartialEq for FloatKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for FloatKey {}

impl Hash for FloatKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl PartialOrd for FloatKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloatKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Owned, hashable, totally ordered form of a categorical cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CategoryKey {
    Int(i64),
    Float(FloatKey),
    Text(String),
}

impl From<CellRef<'_>> for CategoryKey {
    fn from(cell: CellRef<'_>) -> Self {
        match cell {
            CellRef::Int(v) => CategoryKey::Int(v),
            CellRef::Float(v) => CategoryKey::Float(FloatKey(v)),
            CellRef::Text(s) => CategoryKey::Text(s.to_string()),
        }
    }
}

impl fmt::Display for CategoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryKey::Int(v) => write!(f, "{v}"),
            CategoryKey::Float(v) => write!(f, "{}", v.0),
            CategoryKey::Text(s) => f.write_str(s),
        }
    }
}

/// Distinct values of one column, sorted by value.
pub fn distinct_values(column: &Column) -> BTreeSet<CategoryKey> {
    (0..column.len()).map(|row| CategoryKey::from(column.cell(row))).collect()
}

// ============================================================================
// Categorical Index
// ============================================================================

/// Value → feature index table of one categorical column.
///
/// Indices are dense: `offset, offset + 1, …, offset + len - 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoricalIndex {
    column: ColumnIdx,
    offset: FeatureIdx,
    values: BTreeMap<CategoryKey, FeatureIdx>,
}

impl CategoricalIndex {
    fn fit(column_idx: ColumnIdx, column: &Column, offset: FeatureIdx) -> Self {
        let values = distinct_values(column)
            .into_iter()
            .enumerate()
            .map(|(i, key)| (key, FeatureIdx(offset.0 + i as u32)))
            .collect();
        Self {
            column: column_idx,
            offset,
            values,
        }
    }

    pub fn column(&self) -> ColumnIdx {
        self.column
    }

    pub fn offset(&self) -> FeatureIdx {
        self.offset
    }

    /// Number of distinct training values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, key: &CategoryKey) -> Option<FeatureIdx> {
        self.values.get(key).copied()
    }

    pub fn contains(&self, cell: CellRef<'_>) -> bool {
        self.get(&CategoryKey::from(cell)).is_some()
    }

    /// Feature index of a cell, or [`OOV_FEATURE`] when the value was never
    /// seen in training data.
    pub fn lookup(&self, cell: CellRef<'_>) -> FeatureIdx {
        self.get(&CategoryKey::from(cell)).unwrap_or(OOV_FEATURE)
    }

    /// The `i`-th index of this column's contiguous block.
    ///
    /// # Panics (debug builds)
    /// If `i >= len()`.
    pub fn nth_index(&self, i: usize) -> FeatureIdx {
        debug_assert!(i < self.len(), "category {i} out of {}", self.len());
        FeatureIdx(self.offset.0 + i as u32)
    }

    /// `(value, index)` pairs in index order.
    pub fn entries(&self) -> impl Iterator<Item = (&CategoryKey, FeatureIdx)> {
        self.values.iter().map(|(k, &v)| (k, v))
    }
}

// ============================================================================
// Numerical Index
// ============================================================================

/// Training range of a numerical column, in the column's native type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NumericRange {
    Int { min: i64, max: i64 },
    Float { min: f64, max: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericalIndex {
    pub column: ColumnIdx,
    pub feature: FeatureIdx,
    pub range: NumericRange,
}

impl NumericalIndex {
    fn fit(column_idx: ColumnIdx, column: &Column, feature: FeatureIdx) -> Result<Self> {
        let range = match column {
            Column::Int(values) => {
                let min = values.iter().copied().min();
                let max = values.iter().copied().max();
                match (min, max) {
                    (Some(min), Some(max)) => NumericRange::Int { min, max },
                    _ => return Err(no_valid_values(column_idx)),
                }
            }
            Column::Float(values) => {
                let mut min_val = f64::INFINITY;
                let mut max_val = f64::NEG_INFINITY;
                for (row, &v) in values.iter().enumerate().filter(|(_, v)| !v.is_nan()) {
                    if v.is_infinite() {
                        return Err(TransformError::Data(format!(
                            "numerical column {column_idx} holds non-finite value {v} at row {row}"
                        )));
                    }
                    min_val = min_val.min(v);
                    max_val = max_val.max(v);
                }
                if min_val > max_val {
                    return Err(no_valid_values(column_idx));
                }
                NumericRange::Float {
                    min: min_val,
                    max: max_val,
                }
            }
            Column::Text(values) => {
                let row = values.iter().position(|s| s.parse::<f64>().is_err()).unwrap_or(0);
                return Err(TransformError::Encoding {
                    row,
                    col: column_idx,
                    reason: format!("numerical column holds non-numeric value '{}'", values[row]),
                });
            }
        };
        Ok(Self {
            column: column_idx,
            feature,
            range,
        })
    }
}

fn no_valid_values(col: ColumnIdx) -> TransformError {
    TransformError::Data(format!(
        "numerical column {col} has no valid values to compute min/max"
    ))
}

// ============================================================================
// Feature Index
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Categorical(CategoricalIndex),
    Numerical(NumericalIndex),
}

/// One encoded column with its field rank.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldEntry {
    pub field: FieldIdx,
    pub column: ColumnIdx,
    pub kind: FieldKind,
}

/// The complete, immutable index state fitted on the training table.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureIndex {
    label_col: ColumnIdx,
    fields: Vec<FieldEntry>,
    /// One past the largest assigned feature index.
    end: FeatureIdx,
}

impl FeatureIndex {
    /// Fit the index on the training table.
    pub fn fit(train: &Table, layout: &ColumnLayout) -> Result<Self> {
        if train.is_empty() {
            return Err(TransformError::Data("training table has no rows".into()));
        }
        train.column(layout.label_col())?;

        let layout_fields = layout.fields();
        let mut offset = FeatureIdx(OOV_FEATURE.0 + 1);
        let mut fields = Vec::with_capacity(layout_fields.len());
        for &(field, col, _) in layout_fields.iter().filter(|f| f.2 == ColumnRole::Categorical) {
            let index = CategoricalIndex::fit(col, train.column(col)?, offset);
            debug!(
                "  Column {col} ({}): {} categories at [{}, {})",
                train.column_name(col),
                index.len(),
                offset,
                offset.0 + index.len() as u32
            );
            offset = FeatureIdx(offset.0 + index.len() as u32);
            fields.push(FieldEntry {
                field,
                column: col,
                kind: FieldKind::Categorical(index),
            });
        }
        for &(field, col, _) in layout_fields.iter().filter(|f| f.2 == ColumnRole::Numerical) {
            let index = NumericalIndex::fit(col, train.column(col)?, offset)?;
            debug!(
                "  Column {col} ({}): numerical at {}, range {:?}",
                train.column_name(col),
                offset,
                index.range
            );
            offset = FeatureIdx(offset.0 + 1);
            fields.push(FieldEntry {
                field,
                column: col,
                kind: FieldKind::Numerical(index),
            });
        }
        fields.sort_unstable_by_key(|f| f.field);

        let index = Self {
            label_col: layout.label_col(),
            fields,
            end: offset,
        };
        info!(
            "  Indexed {} fields into {} features",
            index.fields.len(),
            index.num_features()
        );
        Ok(index)
    }

    pub fn label_col(&self) -> ColumnIdx {
        self.label_col
    }

    /// Encoded fields in field-rank order.
    pub fn fields(&self) -> &[FieldEntry] {
        &self.fields
    }

    /// Number of assigned feature indices, excluding the reserved index 0.
    pub fn num_features(&self) -> usize {
        (self.end.0 - OOV_FEATURE.0 - 1) as usize
    }

    pub fn categorical(&self, col: ColumnIdx) -> Option<&CategoricalIndex> {
        self.fields.iter().find_map(|f| match &f.kind {
            FieldKind::Categorical(c) if c.column == col => Some(c),
            _ => None,
        })
    }

    pub fn numerical(&self, col: ColumnIdx) -> Option<&NumericalIndex> {
        self.fields.iter().find_map(|f| match &f.kind {
            FieldKind::Numerical(n) if n.column == col => Some(n),
            _ => None,
        })
    }

    /// Serializable description of the fitted index, keyed by column name.
    pub fn feature_map(&self, table: &Table) -> FeatureMap {
        let columns = self
            .fields
            .iter()
            .map(|f| {
                let entry = match &f.kind {
                    FieldKind::Categorical(c) => FeatureMapEntry {
                        column: f.column,
                        field: f.field,
                        role: ColumnRole::Categorical,
                        values: Some(c.entries().map(|(k, v)| (k.to_string(), v)).collect()),
                        feature: None,
                        range: None,
                    },
                    FieldKind::Numerical(n) => FeatureMapEntry {
                        column: f.column,
                        field: f.field,
                        role: ColumnRole::Numerical,
                        values: None,
                        feature: Some(n.feature),
                        range: Some(n.range),
                    },
                };
                (table.column_name(f.column), entry)
            })
            .collect();
        FeatureMap {
            num_features: self.num_features(),
            oov_feature: OOV_FEATURE,
            columns,
        }
    }
}

// ============================================================================
// Feature Map Export
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct FeatureMapEntry {
    pub column: ColumnIdx,
    pub field: FieldIdx,
    pub role: ColumnRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<IndexMap<String, FeatureIdx>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature: Option<FeatureIdx>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<NumericRange>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureMap {
    pub num_features: usize,
    pub oov_feature: FeatureIdx,
    pub columns: IndexMap<String, FeatureMapEntry>,
}

impl FeatureMap {
    /// Serialize as pretty JSON into a staged artifact at `path`.
    pub fn stage(&self, path: &Path) -> Result<StagedArtifact> {
        let mut writer = SampleWriter::create(path)?;
        writer.push_line(&serde_json::to_string_pretty(self)?)?;
        writer.finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
