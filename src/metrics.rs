//! Binary classification metrics over model output.
//!
//! Model output is one `label prob` pair per line, space separated. A label is
//! positive when it is greater than zero; a prediction is positive when its
//! probability is at least [`DECISION_THRESHOLD`].

use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use thiserror::Error;

pub const DECISION_THRESHOLD: f64 = 0.5;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("no predictions to evaluate")]
    Empty,

    #[error("AUC is undefined when only one class is present")]
    SingleClass,
}

pub type Result<T> = std::result::Result<T, MetricsError>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: bool,
    pub prob: f64,
}

impl Prediction {
    pub fn predicted(&self) -> bool {
        self.prob >= DECISION_THRESHOLD
    }
}

// ============================================================================
// Input
// ============================================================================

pub fn parse_predictions<R: BufRead>(reader: R) -> Result<Vec<Prediction>> {
    let mut out = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = i + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let (Some(label), Some(prob), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(MetricsError::Parse {
                line: line_no,
                reason: format!("expected 'label prob', got '{trimmed}'"),
            });
        };
        let parse = |s: &str, what: &str| {
            s.parse::<f64>().map_err(|e| MetricsError::Parse {
                line: line_no,
                reason: format!("invalid {what} '{s}': {e}"),
            })
        };
        let label = parse(label, "label")?;
        let prob = parse(prob, "probability")?;
        out.push(Prediction {
            label: label > 0.0,
            prob,
        });
    }
    Ok(out)
}

pub fn read_predictions(path: &Path) -> Result<Vec<Prediction>> {
    parse_predictions(BufReader::new(File::open(path)?))
}

// ============================================================================
// Metrics
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Confusion {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    pub fn_: usize,
}

impl Confusion {
    pub fn from_predictions(preds: &[Prediction]) -> Self {
        let mut c = Confusion::default();
        for p in preds {
            match (p.label, p.predicted()) {
                (true, true) => c.tp += 1,
                (false, true) => c.fp += 1,
                (false, false) => c.tn += 1,
                (true, false) => c.fn_ += 1,
            }
        }
        c
    }

    pub fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_
    }
}

/// F1 of the positive class; 0 when there are no positives at all.
pub fn f1_score(preds: &[Prediction]) -> f64 {
    let c = Confusion::from_predictions(preds);
    let denom = 2 * c.tp + c.fp + c.fn_;
    if denom == 0 {
        0.0
    } else {
        (2 * c.tp) as f64 / denom as f64
    }
}

pub fn accuracy(preds: &[Prediction]) -> f64 {
    let c = Confusion::from_predictions(preds);
    if c.total() == 0 {
        0.0
    } else {
        (c.tp + c.tn) as f64 / c.total() as f64
    }
}

fn class_counts(preds: &[Prediction]) -> Result<(usize, usize)> {
    if preds.is_empty() {
        return Err(MetricsError::Empty);
    }
    let pos = preds.iter().filter(|p| p.label).count();
    let neg = preds.len() - pos;
    if pos == 0 || neg == 0 {
        return Err(MetricsError::SingleClass);
    }
    Ok((pos, neg))
}

/// Area under the ROC curve, computed from average ranks so tied scores
/// count half.
pub fn roc_auc(preds: &[Prediction]) -> Result<f64> {
    let (pos, neg) = class_counts(preds)?;
    let mut sorted: Vec<&Prediction> = preds.iter().collect();
    sorted.sort_by(|a, b| a.prob.partial_cmp(&b.prob).unwrap_or(Ordering::Equal));

    let mut pos_rank_sum = 0.0;
    let mut i = 0;
    while i < sorted.len() {
        let mut j = i;
        while j + 1 < sorted.len() && sorted[j + 1].prob == sorted[i].prob {
            j += 1;
        }
        // Ranks are 1-based; ties share the mean of their ranks.
        let avg_rank = (i + j + 2) as f64 / 2.0;
        let tied_pos = sorted[i..=j].iter().filter(|p| p.label).count();
        pos_rank_sum += avg_rank * tied_pos as f64;
        i = j + 1;
    }

    let pos = pos as f64;
    Ok((pos_rank_sum - pos * (pos + 1.0) / 2.0) / (pos * neg as f64))
}

/// Area under the precision-recall curve by the trapezoid rule.
///
/// The curve has one point per distinct score, starts at `(recall 0,
/// precision 1)` and stops at the first point reaching full recall.
pub fn pr_auc(preds: &[Prediction]) -> Result<f64> {
    let (pos, _) = class_counts(preds)?;
    let mut sorted: Vec<&Prediction> = preds.iter().collect();
    sorted.sort_by(|a, b| b.prob.partial_cmp(&a.prob).unwrap_or(Ordering::Equal));

    let mut area = 0.0;
    let (mut prev_recall, mut prev_precision) = (0.0, 1.0);
    let (mut tps, mut fps) = (0usize, 0usize);
    let mut i = 0;
    while i < sorted.len() {
        let score = sorted[i].prob;
        while i < sorted.len() && sorted[i].prob == score {
            if sorted[i].label {
                tps += 1;
            } else {
                fps += 1;
            }
            i += 1;
        }
        let recall = tps as f64 / pos as f64;
        let precision = tps as f64 / (tps + fps) as f64;
        area += (recall - prev_recall) * (precision + prev_precision) / 2.0;
        prev_recall = recall;
        prev_precision = precision;
        if tps == pos {
            break;
        }
    }
    Ok(area)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Report {
    pub f1: f64,
    pub accuracy: f64,
    pub roc_auc: f64,
    pub pr_auc: f64,
}

pub fn evaluate(preds: &[Prediction]) -> Result<Report> {
    Ok(Report {
        f1: f1_score(preds),
        accuracy: accuracy(preds),
        roc_auc: roc_auc(preds)?,
        pr_auc: pr_auc(preds)?,
    })
}
