//! End-to-end transformation: raw CSV in, encoded train/eval artifacts out.
//!
//! Stages run to completion in order:
//!
//! 1. load (and split) the input tables
//! 2. binarize labels
//! 3. scale numerical columns (optional)
//! 4. drop eval rows with unseen categories (optional)
//! 5. fit the feature index on train
//! 6. validate every row, then stage the outputs
//! 7. encode train and eval in parallel, then commit every output together
//!
//! Every configuration and data error surfaces before step 6 opens an output.
//! Outputs live in temporary files until both passes have succeeded, so a
//! failed run leaves no artifact behind.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rand::prelude::*;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::common::{ColumnIdx, ColumnLayout, Result, Split, TransformError};
use crate::encoder::{FeatureFormat, RowEncoder, TokenFormat};
use crate::filter::{FilterReport, filter_unseen_categories};
use crate::index::FeatureIndex;
use crate::sampler::NegativeSampler;
use crate::scaler::{ScalerKind, normalize_columns};
use crate::scheduler::{BatchReport, NegativeSamplingPolicy, SampleSink, encode_batch};
use crate::table::{LabelRule, Table, train_eval_split};
use crate::writer::{SampleWriter, StagedArtifact, commit_all};

/// Progress is reported every this many lines.
const PROGRESS_STRIDE: usize = 4096;

// ============================================================================
// Configuration
// ============================================================================

/// Where the train and eval tables come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DataSource {
    /// One file, shuffled and split by `train_frac`.
    Single { path: PathBuf, train_frac: f64 },
    /// Separate, already split files.
    Split { train_path: PathBuf, eval_path: PathBuf },
}

impl DataSource {
    /// Pick a source from optional paths. A single dataset wins over a
    /// train/eval pair.
    pub fn from_paths(
        data_path: Option<PathBuf>,
        train_path: Option<PathBuf>,
        eval_path: Option<PathBuf>,
        train_frac: f64,
    ) -> Result<Self> {
        match (data_path, train_path, eval_path) {
            (Some(path), _, _) => Ok(DataSource::Single { path, train_frac }),
            (None, Some(train_path), Some(eval_path)) => Ok(DataSource::Split {
                train_path,
                eval_path,
            }),
            _ => Err(TransformError::Configuration(
                "either a single dataset path or both train and eval paths must be given".into(),
            )),
        }
    }
}

/// What to do with eval categories that never occur in training data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OovPolicy {
    /// Drop the whole eval row.
    #[default]
    Drop,
    /// Keep the row and encode the value as feature 0.
    Sentinel,
}

/// Parse a delimiter argument. Accepts a single byte or the escape `\t`.
pub fn parse_delimiter(s: &str) -> Result<u8> {
    match s {
        "\\t" | "\t" | "tab" => Ok(b'\t'),
        _ if s.len() == 1 => Ok(s.as_bytes()[0]),
        _ => Err(TransformError::Configuration(format!(
            "delimiter must be a single byte, got '{s}'"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformConfig {
    pub source: DataSource,
    pub train_output_path: PathBuf,
    pub eval_output_path: PathBuf,
    pub delimiter: u8,
    pub has_header: bool,
    pub label_col: ColumnIdx,
    /// Raw labels strictly above this become `1`.
    pub threshold: f64,
    pub cat_cols: Vec<ColumnIdx>,
    pub num_cols: Vec<ColumnIdx>,
    pub normalize: Option<ScalerKind>,
    pub negative_sampling: NegativeSamplingPolicy,
    pub format: FeatureFormat,
    /// Decimal places kept for float values; `None` writes them unrounded.
    pub float_precision: Option<u32>,
    pub oov: OovPolicy,
    pub shuffle_train: bool,
    pub feature_map_path: Option<PathBuf>,
    pub seed: u64,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            source: DataSource::Single {
                path: PathBuf::from("data.csv"),
                train_frac: 0.8,
            },
            train_output_path: PathBuf::from("train.txt"),
            eval_output_path: PathBuf::from("eval.txt"),
            delimiter: b',',
            has_header: true,
            label_col: ColumnIdx(0),
            threshold: 0.0,
            cat_cols: Vec::new(),
            num_cols: Vec::new(),
            normalize: None,
            negative_sampling: NegativeSamplingPolicy::None,
            format: FeatureFormat::LibFfm,
            float_precision: Some(4),
            oov: OovPolicy::Drop,
            shuffle_train: false,
            feature_map_path: None,
            seed: 42,
        }
    }
}

impl TransformConfig {
    /// Column layout described by this configuration.
    pub fn layout(&self) -> Result<ColumnLayout> {
        ColumnLayout::new(self.label_col, self.cat_cols.clone(), self.num_cols.clone())
    }

    pub fn tokens(&self) -> TokenFormat {
        TokenFormat {
            format: self.format,
            float_precision: self.float_precision,
        }
    }

    /// Reject configurations that cannot produce output, before any I/O.
    pub fn validate(&self) -> Result<()> {
        self.layout()?;
        if let DataSource::Single { train_frac, .. } = self.source {
            if !(train_frac > 0.0 && train_frac < 1.0) {
                return Err(TransformError::Configuration(format!(
                    "train fraction must lie strictly between 0 and 1, got {train_frac}"
                )));
            }
        }
        if let NegativeSamplingPolicy::Ratio(0) = self.negative_sampling {
            return Err(TransformError::Configuration(
                "number of negatives per positive must be at least 1".into(),
            ));
        }
        if self.train_output_path.as_os_str().is_empty() || self.eval_output_path.as_os_str().is_empty() {
            return Err(TransformError::Configuration("output paths must not be empty".into()));
        }
        if self.train_output_path == self.eval_output_path {
            return Err(TransformError::Configuration(format!(
                "train and eval outputs both point at {}",
                self.train_output_path.display()
            )));
        }
        if let Some(p) = self.float_precision {
            if p > 15 {
                return Err(TransformError::Configuration(format!(
                    "float precision {p} exceeds the 15 significant decimals of f64"
                )));
            }
        }
        Ok(())
    }

    fn label_rule(&self) -> LabelRule {
        match self.negative_sampling {
            NegativeSamplingPolicy::None => LabelRule::Threshold(self.threshold),
            NegativeSamplingPolicy::Ratio(_) => LabelRule::AllPositive,
        }
    }

    fn output_path(&self, split: Split) -> &Path {
        match split {
            Split::Train => &self.train_output_path,
            Split::Eval => &self.eval_output_path,
        }
    }
}

// ============================================================================
// Progress & Summary
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    Started { split: Split, total: usize },
    Advanced { split: Split, lines: usize },
    Finished { split: Split },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformSummary {
    pub train_rows: usize,
    pub eval_rows: usize,
    pub filter: FilterReport,
    pub num_features: usize,
    pub train: BatchReport,
    pub eval: BatchReport,
    pub elapsed: Duration,
}

// ============================================================================
// Driver
// ============================================================================

pub fn run(config: &TransformConfig) -> Result<TransformSummary> {
    run_with(config, |_| {})
}

/// Run the transformation, reporting encoding progress through `on_progress`.
///
/// `on_progress` is called from both encoding passes concurrently.
pub fn run_with<F>(config: &TransformConfig, on_progress: F) -> Result<TransformSummary>
where
    F: Fn(ProgressEvent) + Sync,
{
    config.validate()?;
    let layout = config.layout()?;
    let start = Instant::now();

    // ── Step 1: Load input ───────────────────────────────────────────────
    info!("Step 1: Loading input...");
    let (mut train, mut eval) = load_tables(config)?;
    for (name, table) in [("train", &train), ("eval", &eval)] {
        table.column(layout.max_column())?;
        debug!("  {name}: {} rows, {} columns", table.num_rows(), table.num_columns());
    }
    if train.num_columns() != eval.num_columns() {
        return Err(TransformError::Data(format!(
            "train has {} columns but eval has {}",
            train.num_columns(),
            eval.num_columns()
        )));
    }
    if train.is_empty() {
        return Err(TransformError::Data("training table has no rows".into()));
    }

    // ── Step 2: Binarize labels ──────────────────────────────────────────
    info!("Step 2: Binarizing labels...");
    let rule = config.label_rule();
    train.binarize_labels(layout.label_col(), rule)?;
    eval.binarize_labels(layout.label_col(), rule)?;
    debug!("  Label rule: {rule:?}");

    // ── Step 3: Normalize ────────────────────────────────────────────────
    if let Some(kind) = config.normalize {
        info!("Step 3: Normalizing {} numerical columns ({kind})...", layout.num_cols().len());
        normalize_columns(&mut train, &mut eval, layout.num_cols(), kind)?;
    } else {
        info!("Step 3: Normalization disabled");
    }

    // ── Step 4: Filter unseen categories ─────────────────────────────────
    let (eval, filter) = match config.oov {
        OovPolicy::Drop => {
            info!("Step 4: Filtering eval rows with unseen categories...");
            filter_unseen_categories(&train, &eval, layout.cat_cols())?
        }
        OovPolicy::Sentinel => {
            info!("Step 4: Keeping unseen eval categories as feature 0");
            let n = eval.num_rows();
            (eval, FilterReport { before: n, after: n })
        }
    };
    if eval.is_empty() {
        warn!("  Eval table is empty; the eval artifact will have no lines");
    }

    // ── Step 5: Fit feature index ────────────────────────────────────────
    info!("Step 5: Indexing features...");
    let index = FeatureIndex::fit(&train, &layout)?;

    // ── Step 6: Validate rows, stage outputs ─────────────────────────────
    info!("Step 6: Validating rows...");
    let tokens = config.tokens();
    let encoder = RowEncoder::new(&index, tokens);
    let sampler = NegativeSampler::new(&index, tokens);
    for table in [&train, &eval] {
        for row in 0..table.num_rows() {
            encoder.validate(table, row)?;
        }
    }
    let train_writer = SampleWriter::create(&config.train_output_path)?;
    let eval_writer = SampleWriter::create(&config.eval_output_path)?;
    let feature_map = match &config.feature_map_path {
        Some(path) => Some(index.feature_map(&train).stage(path)?),
        None => None,
    };

    // ── Step 7: Encode ───────────────────────────────────────────────────
    info!(
        "Step 7: Encoding {} train / {} eval rows as {}...",
        train.num_rows(),
        eval.num_rows(),
        config.format
    );
    let pass = |split: Split, table: &Table, writer: SampleWriter| -> Result<(BatchReport, StagedArtifact)> {
        run_pass(config, split, table, writer, &encoder, &sampler, &on_progress)
    };
    let (train_out, eval_out) = rayon::join(
        || pass(Split::Train, &train, train_writer),
        || pass(Split::Eval, &eval, eval_writer),
    );
    let (train_report, train_artifact) = train_out?;
    let (eval_report, eval_artifact) = eval_out?;

    let mut staged = vec![train_artifact, eval_artifact];
    staged.extend(feature_map);
    for artifact in &staged {
        info!("  Committing {}", artifact.target().display());
    }
    commit_all(staged)?;

    let summary = TransformSummary {
        train_rows: train.num_rows(),
        eval_rows: eval.num_rows(),
        filter,
        num_features: index.num_features(),
        train: train_report,
        eval: eval_report,
        elapsed: start.elapsed(),
    };
    info!("  final train size: {}", summary.train.lines());
    info!("  final eval size:  {}", summary.eval.lines());
    Ok(summary)
}

fn load_tables(config: &TransformConfig) -> Result<(Table, Table)> {
    match &config.source {
        DataSource::Single { path, train_frac } => {
            let table = Table::read_csv(path, config.delimiter, config.has_header)?;
            train_eval_split(&table, *train_frac, config.seed)
        }
        DataSource::Split { train_path, eval_path } => {
            Table::read_csv_pair(train_path, eval_path, config.delimiter, config.has_header)
        }
    }
}

fn run_pass<F>(
    config: &TransformConfig,
    split: Split,
    table: &Table,
    mut writer: SampleWriter,
    encoder: &RowEncoder<'_>,
    sampler: &NegativeSampler<'_>,
    on_progress: &F,
) -> Result<(BatchReport, StagedArtifact)>
where
    F: Fn(ProgressEvent) + Sync,
{
    let mut rng = SmallRng::seed_from_u64(config.seed.wrapping_add(split.seed_offset()));
    let total = match config.negative_sampling {
        NegativeSamplingPolicy::None => table.num_rows(),
        NegativeSamplingPolicy::Ratio(n) => table.num_rows() * (n as usize + 1),
    };
    on_progress(ProgressEvent::Started { split, total });
    let progress = |lines: usize| {
        if lines % PROGRESS_STRIDE == 0 || lines == total {
            on_progress(ProgressEvent::Advanced { split, lines });
        }
    };
    let report = if split == Split::Train && config.shuffle_train {
        let mut lines: Vec<String> = Vec::with_capacity(total);
        let report = encode_batch(
            table,
            encoder,
            sampler,
            config.negative_sampling,
            &mut rng,
            &mut lines,
            progress,
        )?;
        lines.shuffle(&mut rng);
        for line in &lines {
            writer.push_line(line)?;
        }
        report
    } else {
        encode_batch(
            table,
            encoder,
            sampler,
            config.negative_sampling,
            &mut rng,
            &mut writer,
            progress,
        )?
    };
    let staged = writer.finish()?;

    on_progress(ProgressEvent::Finished { split });
    info!(
        "  Encoded {} ({} positives, {} negatives) for {}",
        split,
        report.positives,
        report.negatives,
        config.output_path(split).display()
    );
    Ok((report, staged))
}
