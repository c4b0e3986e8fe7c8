//! Common types and constants used throughout the project.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every input column has exactly one role, assigned once from configuration.
/// Columns that are not named as label, categorical or numerical are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ColumnRole {
    Label = 0,
    Categorical = 1,
    Numerical = 2,
    Ignored = 3,
}

// ============================================================================
// Index NewTypes
// ============================================================================

/// Position of a column in the raw input table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnIdx(pub u32);

/// Rank of an encoded column among all encoded columns (the libffm `field`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldIdx(pub u32);

/// Global feature index shared by every categorical value and numerical column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureIdx(pub u32);

/// Reserved feature index for categorical values never seen in training data.
/// Real categories are numbered from 1.
pub const OOV_FEATURE: FeatureIdx = FeatureIdx(0);

impl fmt::Display for ColumnIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for FieldIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for FeatureIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which output artifact a pass produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Split {
    Train,
    Eval,
}

impl Split {
    /// Offset mixed into the configured seed so each pass owns an independent
    /// RNG stream. The train/eval split draws from the unmodified seed.
    pub fn seed_offset(self) -> u64 {
        match self {
            Split::Train => 1,
            Split::Eval => 2,
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Split::Train => f.write_str("train"),
            Split::Eval => f.write_str("eval"),
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("data error: {0}")]
    Data(String),

    #[error("encoding error at row {row}, column {col}: {reason}")]
    Encoding {
        row: usize,
        col: ColumnIdx,
        reason: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse CSV input: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to serialize feature map: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to move finished artifact into place: {0}")]
    Persist(#[from] tempfile::PersistError),
}

pub type Result<T> = std::result::Result<T, TransformError>;

// ============================================================================
// Column Layout
// ============================================================================

/// Parse a comma-separated list of column indices such as `"1,2,3,5,7"`.
///
/// An empty (or whitespace-only) string means "no columns".
pub fn parse_column_list(s: &str) -> Result<Vec<ColumnIdx>> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(Vec::new());
    }
    s.split(',')
        .map(|part| {
            part.trim().parse::<u32>().map(ColumnIdx).map_err(|e| {
                TransformError::Configuration(format!("invalid column index '{part}' in '{s}': {e}"))
            })
        })
        .collect()
}

/// Role assignment for every encoded column, validated once at construction.
///
/// Categorical and numerical sets are stored sorted and deduplicated. The
/// field rank of a column is its position in the merged ascending order, which
/// is the token order of every encoded line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnLayout {
    label_col: ColumnIdx,
    cat_cols: Vec<ColumnIdx>,
    num_cols: Vec<ColumnIdx>,
}

impl ColumnLayout {
    pub fn new(
        label_col: ColumnIdx,
        mut cat_cols: Vec<ColumnIdx>,
        mut num_cols: Vec<ColumnIdx>,
    ) -> Result<Self> {
        cat_cols.sort_unstable();
        cat_cols.dedup();
        num_cols.sort_unstable();
        num_cols.dedup();

        if let Some(col) = cat_cols.iter().find(|c| num_cols.binary_search(*c).is_ok()) {
            return Err(TransformError::Configuration(format!(
                "column {col} is listed as both categorical and numerical"
            )));
        }
        if cat_cols.contains(&label_col) || num_cols.contains(&label_col) {
            return Err(TransformError::Configuration(format!(
                "label column {label_col} cannot also be a feature column"
            )));
        }
        if cat_cols.is_empty() && num_cols.is_empty() {
            return Err(TransformError::Configuration(
                "no categorical or numerical columns selected for encoding".into(),
            ));
        }

        Ok(Self {
            label_col,
            cat_cols,
            num_cols,
        })
    }

    pub fn label_col(&self) -> ColumnIdx {
        self.label_col
    }

    pub fn cat_cols(&self) -> &[ColumnIdx] {
        &self.cat_cols
    }

    pub fn num_cols(&self) -> &[ColumnIdx] {
        &self.num_cols
    }

    /// Largest column index the layout references, label included.
    pub fn max_column(&self) -> ColumnIdx {
        self.cat_cols
            .iter()
            .chain(self.num_cols.iter())
            .copied()
            .chain(std::iter::once(self.label_col))
            .max()
            .unwrap_or(self.label_col)
    }

    pub fn role(&self, col: ColumnIdx) -> ColumnRole {
        if col == self.label_col {
            ColumnRole::Label
        } else if self.cat_cols.binary_search(&col).is_ok() {
            ColumnRole::Categorical
        } else if self.num_cols.binary_search(&col).is_ok() {
            ColumnRole::Numerical
        } else {
            ColumnRole::Ignored
        }
    }

    /// Encoded columns in field-rank order: `(field, column, role)`.
    pub fn fields(&self) -> Vec<(FieldIdx, ColumnIdx, ColumnRole)> {
        let mut cols: Vec<(ColumnIdx, ColumnRole)> = self
            .cat_cols
            .iter()
            .map(|&c| (c, ColumnRole::Categorical))
            .chain(self.num_cols.iter().map(|&c| (c, ColumnRole::Numerical)))
            .collect();
        cols.sort_unstable_by_key(|&(c, _)| c);
        cols.into_iter()
            .enumerate()
            .map(|(rank, (col, role))| (FieldIdx(rank as u32), col, role))
            .collect()
    }

    pub fn num_fields(&self) -> usize {
        self.cat_cols.len() + self.num_cols.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(ids: &[u32]) -> Vec<ColumnIdx> {
        ids.iter().copied().map(ColumnIdx).collect()
    }

    #[test]
    fn test_parse_column_list() {
        assert_eq!(parse_column_list("1,2, 5").unwrap(), cols(&[1, 2, 5]));
        assert!(parse_column_list("").unwrap().is_empty());
        assert!(parse_column_list("  ").unwrap().is_empty());
        assert!(matches!(
            parse_column_list("1,x"),
            Err(TransformError::Configuration(_))
        ));
    }

    #[test]
    fn test_layout_rejects_overlap() {
        let err = ColumnLayout::new(ColumnIdx(0), cols(&[1, 2]), cols(&[2, 3])).unwrap_err();
        assert!(matches!(err, TransformError::Configuration(_)));
    }

    #[test]
    fn test_layout_rejects_label_overlap() {
        let err = ColumnLayout::new(ColumnIdx(1), cols(&[1, 2]), cols(&[3])).unwrap_err();
        assert!(matches!(err, TransformError::Configuration(_)));
        let err = ColumnLayout::new(ColumnIdx(3), cols(&[1, 2]), cols(&[3])).unwrap_err();
        assert!(matches!(err, TransformError::Configuration(_)));
    }

    #[test]
    fn test_layout_requires_some_feature() {
        assert!(ColumnLayout::new(ColumnIdx(0), vec![], vec![]).is_err());
    }

    #[test]
    fn test_pass_seeds_differ_from_split_seed() {
        assert_ne!(Split::Train.seed_offset(), 0);
        assert_ne!(Split::Eval.seed_offset(), 0);
        assert_ne!(Split::Train.seed_offset(), Split::Eval.seed_offset());
    }

    #[test]
    fn test_field_rank_follows_column_order() {
        let layout = ColumnLayout::new(ColumnIdx(2), cols(&[5, 0, 3]), cols(&[4, 1])).unwrap();
        let fields = layout.fields();
        let order: Vec<(u32, u32)> = fields.iter().map(|(f, c, _)| (f.0, c.0)).collect();
        assert_eq!(order, vec![(0, 0), (1, 1), (2, 3), (3, 4), (4, 5)]);
        assert_eq!(fields[1].2, ColumnRole::Numerical);
        assert_eq!(fields[2].2, ColumnRole::Categorical);
        assert_eq!(layout.role(ColumnIdx(2)), ColumnRole::Label);
        assert_eq!(layout.role(ColumnIdx(9)), ColumnRole::Ignored);
        assert_eq!(layout.max_column(), ColumnIdx(5));
    }
}
