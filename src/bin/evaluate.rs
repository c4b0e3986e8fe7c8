//! Evaluate model output against its labels.
//!
//! Input is one `label prob` pair per line, space separated, as written by
//! libffm / libfm style predictors when asked to echo labels.
//!
//! ## Usage
//!
//! ```sh
//! cargo run --release --bin evaluate -- --predictions output.txt
//! ```

use std::path::PathBuf;

use clap::Parser;
use estuary::metrics::{Confusion, evaluate, read_predictions};
use tracing::info;

#[derive(Parser, Debug)]
#[command(about = "Compute F1, accuracy, ROC AUC and PR AUC from model output")]
struct Args {
    /// File of `label prob` lines.
    #[arg(long)]
    predictions: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let preds = read_predictions(&args.predictions)?;
    let confusion = Confusion::from_predictions(&preds);
    info!("Loaded {} predictions from {}", preds.len(), args.predictions.display());
    info!(
        "  tp={} fp={} tn={} fn={}",
        confusion.tp, confusion.fp, confusion.tn, confusion.fn_
    );

    let report = evaluate(&preds)?;
    println!("f1 score: {:.4}", report.f1);
    println!("accuracy: {:.4}", report.accuracy);
    println!("roc auc:  {:.4}", report.roc_auc);
    println!("pr auc:   {:.4}", report.pr_auc);
    Ok(())
}
