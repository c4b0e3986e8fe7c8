//! Removal of eval rows whose categorical values never appear in training data.

use std::collections::BTreeSet;

use tracing::info;

use crate::common::{ColumnIdx, Result};
use crate::index::{CategoryKey, distinct_values};
use crate::table::Table;

/// Row counts of the eval table around filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterReport {
    pub before: usize,
    pub after: usize,
}

impl FilterReport {
    pub fn dropped(&self) -> usize {
        self.before - self.after
    }
}

/// Keep only eval rows whose every categorical value was seen in `train`.
///
/// Numerical and label columns are never examined.
pub fn filter_unseen_categories(
    train: &Table,
    eval: &Table,
    cat_cols: &[ColumnIdx],
) -> Result<(Table, FilterReport)> {
    let mut seen: Vec<(ColumnIdx, BTreeSet<CategoryKey>)> = Vec::with_capacity(cat_cols.len());
    for &col in cat_cols {
        seen.push((col, distinct_values(train.column(col)?)));
    }

    let mut keep = Vec::with_capacity(eval.num_rows());
    'rows: for row in 0..eval.num_rows() {
        for (col, values) in &seen {
            let cell = eval.column(*col)?.cell(row);
            if !values.contains(&CategoryKey::from(cell)) {
                continue 'rows;
            }
        }
        keep.push(row);
    }

    let report = FilterReport {
        before: eval.num_rows(),
        after: keep.len(),
    };
    info!("  Eval size before filtering: {}", report.before);
    info!("  Eval size after filtering:  {}", report.after);
    Ok((eval.take_rows(&keep), report))
}
