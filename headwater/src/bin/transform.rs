//! Transform binary: converts raw CSV into libsvm / libffm train and eval files.
//!
//! ## Input
//!
//! Either one CSV file (`--data-path`, split by `--train-frac`) or a train/eval
//! pair (`--train-path`, `--eval-path`). The label column is binarized with
//! `--threshold`, or forced to 1 when `--neg-sampling` is on.
//!
//! ## Output
//!
//! - `--train-output-path` / `--eval-output-path`: one encoded sample per line
//! - `--feature-map-path` (optional): JSON description of the fitted index
//!
//! ## Usage
//!
//! ```sh
//! cargo run --release --bin transform -- \
//!     --data-path ratings.csv --train-output-path train.ffm --eval-output-path eval.ffm \
//!     --label-col 0 --cat-cols 1,2 --num-cols 3 --neg-sampling --num-neg 2
//! ```

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use indicatif::{HumanCount, HumanDuration, MultiProgress, ProgressBar, ProgressStyle};
use tracing::info;

use headwater::common::{ColumnIdx, Split, parse_column_list};
use headwater::encoder::FeatureFormat;
use headwater::pipeline::{DataSource, OovPolicy, ProgressEvent, TransformConfig, parse_delimiter, run_with};
use headwater::scaler::ScalerKind;
use headwater::scheduler::NegativeSamplingPolicy;

// ============================================================================
// CLI
// ============================================================================

#[derive(Parser, Debug)]
#[command(about = "Transform CSV data into libsvm / libffm format")]
struct Args {
    /// Single dataset, split into train and eval by `--train-frac`.
    #[arg(long)]
    data_path: Option<PathBuf>,

    /// Train data, used together with `--eval-path`.
    #[arg(long)]
    train_path: Option<PathBuf>,

    /// Eval data, used together with `--train-path`.
    #[arg(long)]
    eval_path: Option<PathBuf>,

    #[arg(long)]
    train_output_path: PathBuf,

    #[arg(long)]
    eval_output_path: PathBuf,

    /// Fraction of rows kept for training when splitting a single dataset.
    #[arg(long, default_value_t = 0.8)]
    train_frac: f64,

    /// Raw labels strictly above this become 1, the rest 0.
    #[arg(long, default_value_t = 0.0)]
    threshold: f64,

    /// Treat every row as a positive and synthesize negatives.
    #[arg(long, default_value_t = false)]
    neg_sampling: bool,

    /// Negatives generated per positive.
    #[arg(long, default_value_t = 1)]
    num_neg: u32,

    /// Field delimiter. `\t` selects tabs.
    #[arg(long, default_value = ",")]
    sep: String,

    #[arg(long, default_value_t = 0)]
    label_col: u32,

    /// Categorical column indices, e.g. "1,2,3".
    #[arg(long, default_value = "")]
    cat_cols: String,

    /// Numerical column indices, e.g. "4,5".
    #[arg(long, default_value = "")]
    num_cols: String,

    /// Scale numerical columns (`standard` or `minmax`).
    #[arg(long, num_args = 0..=1, default_missing_value = "standard")]
    normalize: Option<ScalerKind>,

    /// Write libffm (`field:feature:value`) instead of libsvm (`feature:value`).
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    ffm: bool,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// The input files have no header row.
    #[arg(long, default_value_t = false)]
    no_header: bool,

    /// Decimal places kept for float values.
    #[arg(long, default_value_t = 4)]
    float_precision: u32,

    /// Write float values unrounded.
    #[arg(long, default_value_t = false)]
    no_rounding: bool,

    /// Keep eval rows with unseen categories and encode them as feature 0.
    #[arg(long, default_value_t = false)]
    keep_oov: bool,

    /// Shuffle the train output (buffers the whole train artifact).
    #[arg(long, default_value_t = false)]
    shuffle_train: bool,

    /// Where to write the fitted feature map as JSON.
    #[arg(long)]
    feature_map_path: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> Result<TransformConfig, Box<dyn std::error::Error>> {
        Ok(TransformConfig {
            source: DataSource::from_paths(self.data_path, self.train_path, self.eval_path, self.train_frac)?,
            train_output_path: self.train_output_path,
            eval_output_path: self.eval_output_path,
            delimiter: parse_delimiter(&self.sep)?,
            has_header: !self.no_header,
            label_col: ColumnIdx(self.label_col),
            threshold: self.threshold,
            cat_cols: parse_column_list(&self.cat_cols)?,
            num_cols: parse_column_list(&self.num_cols)?,
            normalize: self.normalize,
            negative_sampling: if self.neg_sampling {
                NegativeSamplingPolicy::Ratio(self.num_neg)
            } else {
                NegativeSamplingPolicy::None
            },
            format: if self.ffm {
                FeatureFormat::LibFfm
            } else {
                FeatureFormat::LibSvm
            },
            float_precision: (!self.no_rounding).then_some(self.float_precision),
            oov: if self.keep_oov {
                OovPolicy::Sentinel
            } else {
                OovPolicy::Drop
            },
            shuffle_train: self.shuffle_train,
            feature_map_path: self.feature_map_path,
            seed: self.seed,
        })
    }
}

// ============================================================================
// Main
// ============================================================================

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Args::parse().into_config()?;
    info!("Config:   {}", serde_json::to_string(&config)?);
    info!("Train out: {}", config.train_output_path.display());
    info!("Eval out:  {}", config.eval_output_path.display());

    let multi = MultiProgress::new();
    let style = ProgressStyle::with_template(
        "  {prefix:<6} {bar:40.cyan/blue} {pos}/{len} lines [{elapsed_precise}]",
    )?
    .progress_chars("##-");
    let train_bar = ProgressBar::new(0).with_style(style.clone()).with_prefix("train");
    let eval_bar = ProgressBar::new(0).with_style(style).with_prefix("eval");
    let bar = |split: Split| match split {
        Split::Train => &train_bar,
        Split::Eval => &eval_bar,
    };

    let summary = run_with(&config, |event| match event {
        ProgressEvent::Started { split, total } => {
            let pb = multi.add(bar(split).clone());
            pb.set_length(total as u64);
        }
        ProgressEvent::Advanced { split, lines } => bar(split).set_position(lines as u64),
        ProgressEvent::Finished { split } => bar(split).finish_and_clear(),
    })?;

    info!("Transform complete in {}!", HumanDuration(summary.elapsed));
    info!("  Features: {}", HumanCount(summary.num_features as u64));
    info!(
        "  Train: {} rows -> {} lines",
        HumanCount(summary.train_rows as u64),
        HumanCount(summary.train.lines() as u64)
    );
    info!(
        "  Eval:  {} rows ({} dropped as unseen) -> {} lines",
        HumanCount(summary.eval_rows as u64),
        HumanCount(summary.filter.dropped() as u64),
        HumanCount(summary.eval.lines() as u64)
    );
    Ok(())
}
