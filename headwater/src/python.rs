//! PyO3 bindings for the headwater transformation.
//!
//! Exposes `headwater.transform_csv(...)` as a Python function via maturin.

use std::path::PathBuf;

use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::common::{ColumnIdx, TransformError, parse_column_list};
use crate::encoder::FeatureFormat;
use crate::pipeline::{DataSource, OovPolicy, TransformConfig, parse_delimiter, run};
use crate::scaler::ScalerKind;
use crate::scheduler::NegativeSamplingPolicy;

fn to_py_err(e: TransformError) -> PyErr {
    match e {
        TransformError::Configuration(_) | TransformError::Data(_) | TransformError::Encoding { .. } => {
            PyValueError::new_err(e.to_string())
        }
        TransformError::Io(_) | TransformError::Persist(_) => PyIOError::new_err(e.to_string()),
        _ => PyRuntimeError::new_err(e.to_string()),
    }
}

/// Transform CSV data into libsvm/libffm files.
///
/// Returns `(train_lines, eval_lines)`, the number of lines written to each
/// output. The GIL is released while the transformation runs.
#[pyfunction]
#[pyo3(signature = (
    train_output_path,
    eval_output_path,
    cat_cols,
    num_cols,
    data_path = None,
    train_path = None,
    eval_path = None,
    train_frac = 0.8,
    threshold = 0.0,
    num_neg = None,
    sep = ",",
    label_col = 0,
    normalize = None,
    ffm = true,
    seed = 42,
    has_header = true,
    float_precision = Some(4),
    keep_oov = false,
    shuffle_train = false,
    feature_map_path = None,
))]
#[allow(clippy::too_many_arguments)]
fn transform_csv(
    py: Python<'_>,
    train_output_path: PathBuf,
    eval_output_path: PathBuf,
    cat_cols: &str,
    num_cols: &str,
    data_path: Option<PathBuf>,
    train_path: Option<PathBuf>,
    eval_path: Option<PathBuf>,
    train_frac: f64,
    threshold: f64,
    num_neg: Option<u32>,
    sep: &str,
    label_col: u32,
    normalize: Option<&str>,
    ffm: bool,
    seed: u64,
    has_header: bool,
    float_precision: Option<u32>,
    keep_oov: bool,
    shuffle_train: bool,
    feature_map_path: Option<PathBuf>,
) -> PyResult<(usize, usize)> {
    let normalize = normalize
        .map(|s| s.parse::<ScalerKind>())
        .transpose()
        .map_err(PyValueError::new_err)?;

    let config = TransformConfig {
        source: DataSource::from_paths(data_path, train_path, eval_path, train_frac).map_err(to_py_err)?,
        train_output_path,
        eval_output_path,
        delimiter: parse_delimiter(sep).map_err(to_py_err)?,
        has_header,
        label_col: ColumnIdx(label_col),
        threshold,
        cat_cols: parse_column_list(cat_cols).map_err(to_py_err)?,
        num_cols: parse_column_list(num_cols).map_err(to_py_err)?,
        normalize,
        negative_sampling: num_neg.map_or(NegativeSamplingPolicy::None, NegativeSamplingPolicy::Ratio),
        format: if ffm { FeatureFormat::LibFfm } else { FeatureFormat::LibSvm },
        float_precision,
        oov: if keep_oov { OovPolicy::Sentinel } else { OovPolicy::Drop },
        shuffle_train,
        feature_map_path,
        seed,
    };

    let summary = py.detach(|| run(&config)).map_err(to_py_err)?;
    Ok((summary.train.lines(), summary.eval.lines()))
}

/// Register the headwater Python module.
#[pymodule]
fn headwater(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(transform_csv, m)?)?;
    Ok(())
}
