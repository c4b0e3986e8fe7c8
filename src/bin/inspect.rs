//! Inspect an encoded libsvm / libffm artifact: line and label counts, format,
//! field and feature coverage, and the first malformed lines.
//!
//! ## Usage
//!
//! ```sh
//! cargo run --release --bin inspect -- --path train.ffm
//! cargo run --release --bin inspect -- --path eval.ffm --sample-lines 10
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use clap::Parser;
use indicatif::HumanCount;
use estuary::artifact::{DetectedFormat, scan};

#[derive(Parser, Debug)]
#[command(about = "Inspect an encoded libsvm / libffm artifact")]
struct Args {
    /// Path to the encoded artifact.
    #[arg(long)]
    path: PathBuf,

    /// Number of leading lines to print (0 to skip).
    #[arg(long, default_value_t = 5)]
    sample_lines: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let stats = scan(BufReader::new(File::open(&args.path)?))?;

    let ratio = if stats.positives > 0 {
        format!("{:.2}", stats.negatives as f64 / stats.positives as f64)
    } else {
        "n/a".to_string()
    };

    // ── Overview ──────────────────────────────────────────────────────────
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║  Artifact: {}", args.path.display());
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Format:     {:>10}", stats.format().to_string());
    let count = |n: usize| HumanCount(n as u64).to_string();
    println!("║  Lines:      {:>10}", count(stats.lines));
    println!("║  Positives:  {:>10}", count(stats.positives));
    println!("║  Negatives:  {:>10}  ({ratio} per positive)", count(stats.negatives));
    println!(
        "║  Tokens:     {:>10} min, {:>10} max",
        stats.min_tokens.unwrap_or(0),
        stats.max_tokens
    );
    if stats.format() == DetectedFormat::LibFfm {
        println!("║  Fields:     {:>10}", stats.fields.len());
    }
    match stats.max_feature {
        Some(f) => println!("║  Max feat:   {f:>10}"),
        None => println!("║  Max feat:   {:>10}", "(none)"),
    }
    println!("║  OOV lines:  {:>10}", count(stats.oov_lines));
    println!("║  Malformed:  {:>10}", count(stats.malformed));
    println!("╚══════════════════════════════════════════════════════════════╝");

    // ── Malformed lines ──────────────────────────────────────────────────
    if !stats.errors.is_empty() {
        println!();
        println!("┌─ Malformed lines (first {} of {})", stats.errors.len(), stats.malformed);
        for (line_no, reason) in &stats.errors {
            println!("│  line {line_no:>8}: {reason}");
        }
        println!("└─");
    }

    // ── Sample lines ─────────────────────────────────────────────────────
    if args.sample_lines > 0 {
        println!();
        println!("┌─ First {} lines", args.sample_lines.min(stats.lines));
        let reader = BufReader::new(File::open(&args.path)?);
        for line in reader.lines().take(args.sample_lines) {
            println!("│  {}", line?);
        }
        println!("└─");
    }

    Ok(())
}
