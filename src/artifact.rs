//! Structural scan of libsvm / libffm artifacts.

use std::collections::BTreeSet;
use std::fmt;
use std::io::BufRead;

use crate::metrics::Result;

/// Malformed lines kept for reporting.
const MAX_REPORTED_ERRORS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedFormat {
    LibSvm,
    LibFfm,
    Mixed,
    Unknown,
}

impl fmt::Display for DetectedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectedFormat::LibSvm => f.write_str("libsvm"),
            DetectedFormat::LibFfm => f.write_str("libffm"),
            DetectedFormat::Mixed => f.write_str("mixed"),
            DetectedFormat::Unknown => f.write_str("unknown"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ArtifactStats {
    pub lines: usize,
    pub positives: usize,
    pub negatives: usize,
    pub svm_lines: usize,
    pub ffm_lines: usize,
    pub min_tokens: Option<usize>,
    pub max_tokens: usize,
    pub fields: BTreeSet<u32>,
    pub max_feature: Option<u32>,
    /// Lines carrying the reserved out-of-vocabulary feature 0.
    pub oov_lines: usize,
    pub malformed: usize,
    /// `(line number, reason)` of the first malformed lines.
    pub errors: Vec<(usize, String)>,
}

impl ArtifactStats {
    pub fn format(&self) -> DetectedFormat {
        match (self.svm_lines, self.ffm_lines) {
            (0, 0) => DetectedFormat::Unknown,
            (_, 0) => DetectedFormat::LibSvm,
            (0, _) => DetectedFormat::LibFfm,
            _ => DetectedFormat::Mixed,
        }
    }

    fn reject(&mut self, line_no: usize, reason: String) {
        self.malformed += 1;
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push((line_no, reason));
        }
    }

    fn scan_line(&mut self, line_no: usize, line: &str) {
        let mut tokens = line.split(' ');
        match tokens.next() {
            Some("1") => self.positives += 1,
            Some("0") => self.negatives += 1,
            other => {
                return self.reject(line_no, format!("label must be 0 or 1, got {:?}", other.unwrap_or("")));
            }
        }

        let mut parts_per_token = None;
        let mut count = 0;
        let mut saw_oov = false;
        for tok in tokens {
            let parts: Vec<&str> = tok.split(':').collect();
            if *parts_per_token.get_or_insert(parts.len()) != parts.len() {
                return self.reject(line_no, format!("token '{tok}' mixes formats"));
            }
            let (field, feature, value) = match parts.as_slice() {
                [feat, val] => (None, *feat, *val),
                [field, feat, val] => (Some(*field), *feat, *val),
                _ => return self.reject(line_no, format!("token '{tok}' is not feature:value")),
            };
            let Ok(feature) = feature.parse::<u32>() else {
                return self.reject(line_no, format!("feature index '{feature}' is not an integer"));
            };
            if value.parse::<f64>().is_err() {
                return self.reject(line_no, format!("value '{value}' is not numeric"));
            }
            if let Some(field) = field {
                let Ok(field) = field.parse::<u32>() else {
                    return self.reject(line_no, format!("field '{field}' is not an integer"));
                };
                self.fields.insert(field);
            }
            saw_oov |= feature == 0;
            self.max_feature = self.max_feature.max(Some(feature));
            count += 1;
        }

        match parts_per_token {
            Some(3) => self.ffm_lines += 1,
            _ => self.svm_lines += 1,
        }
        self.oov_lines += usize::from(saw_oov);
        self.min_tokens = Some(self.min_tokens.map_or(count, |m| m.min(count)));
        self.max_tokens = self.max_tokens.max(count);
    }
}

/// Scan every line of an artifact. Empty lines are skipped.
pub fn scan<R: BufRead>(reader: R) -> Result<ArtifactStats> {
    let mut stats = ArtifactStats::default();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        stats.lines += 1;
        stats.scan_line(i + 1, &line);
    }
    Ok(stats)
}
