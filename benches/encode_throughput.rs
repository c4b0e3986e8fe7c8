//! Encoding throughput benchmarks.
//!
//! Benchmarks the headwater encoder on two workloads:
//! - **row_encoding**: plain libsvm / libffm encoding of every input row.
//! - **negative_sampling**: interleaved positives and synthetic negatives at
//!   increasing ratios.
//!
//! Inputs are synthetic: categorical cardinalities and numeric values follow
//! log-normal distributions, which is roughly what click logs look like.
//!
//! # Running
//!
//! ```sh
//! cargo bench --bench encode_throughput
//! ```

use criterion::{BenchmarkId, Criterion, Throughput};
use rand::prelude::*;
use rand::rngs::SmallRng;
use rand_distr::LogNormal;

use headwater::common::{ColumnIdx, ColumnLayout};
use headwater::encoder::{FeatureFormat, RowEncoder, TokenFormat};
use headwater::index::FeatureIndex;
use headwater::sampler::NegativeSampler;
use headwater::scheduler::{NegativeSamplingPolicy, encode_batch};
use headwater::table::{Column, Table};

const NUM_ROWS: usize = 50_000;
const NUM_CAT: usize = 8;
const NUM_NUM: usize = 4;

// ============================================================================
// Test data generators
// ============================================================================

/// Label, then `NUM_CAT` text columns, then `NUM_NUM` float columns.
fn generate_table(num_rows: usize) -> (Table, ColumnLayout) {
    let mut rng = SmallRng::seed_from_u64(0);
    let cardinality = LogNormal::new(5.0, 1.5).unwrap();
    let magnitude = LogNormal::new(0.0, 1.0).unwrap();

    let mut columns = vec![Column::Int((0..num_rows).map(|_| rng.random_range(0..=1)).collect())];
    for c in 0..NUM_CAT {
        let card = (cardinality.sample(&mut rng) as u64).max(2);
        columns.push(Column::Text(
            (0..num_rows)
                .map(|_| format!("c{c}_{}", rng.random_range(0..card)))
                .collect(),
        ));
    }
    for _ in 0..NUM_NUM {
        columns.push(Column::Float(
            (0..num_rows).map(|_| magnitude.sample(&mut rng)).collect(),
        ));
    }

    let table = Table::from_columns(None, columns).unwrap();
    let layout = ColumnLayout::new(
        ColumnIdx(0),
        (1..=NUM_CAT as u32).map(ColumnIdx).collect(),
        (NUM_CAT as u32 + 1..=(NUM_CAT + NUM_NUM) as u32).map(ColumnIdx).collect(),
    )
    .unwrap();
    (table, layout)
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_row_encoding(c: &mut Criterion) {
    let (table, layout) = generate_table(NUM_ROWS);
    let index = FeatureIndex::fit(&table, &layout).unwrap();

    let mut group = c.benchmark_group("row_encoding");
    group.sample_size(20);
    group.noise_threshold(0.05);
    group.throughput(Throughput::Elements(NUM_ROWS as u64));

    for format in [FeatureFormat::LibSvm, FeatureFormat::LibFfm] {
        let tokens = TokenFormat {
            format,
            float_precision: Some(4),
        };
        let encoder = RowEncoder::new(&index, tokens);
        let sampler = NegativeSampler::new(&index, tokens);
        group.bench_with_input(BenchmarkId::new("encode_batch", format), &format, |b, _| {
            b.iter(|| {
                let mut rng = SmallRng::seed_from_u64(1);
                let mut lines: Vec<String> = Vec::with_capacity(NUM_ROWS);
                encode_batch(
                    &table,
                    &encoder,
                    &sampler,
                    NegativeSamplingPolicy::None,
                    &mut rng,
                    &mut lines,
                    |_| {},
                )
                .unwrap()
            });
        });
    }
    group.finish();
}

fn bench_negative_sampling(c: &mut Criterion) {
    let (table, layout) = generate_table(NUM_ROWS);
    let index = FeatureIndex::fit(&table, &layout).unwrap();
    let tokens = TokenFormat {
        format: FeatureFormat::LibFfm,
        float_precision: Some(4),
    };
    let encoder = RowEncoder::new(&index, tokens);
    let sampler = NegativeSampler::new(&index, tokens);

    let mut group = c.benchmark_group("negative_sampling");
    group.sample_size(10);
    group.noise_threshold(0.05);

    for num_neg in [1u32, 4, 10] {
        let total = NUM_ROWS * (num_neg as usize + 1);
        group.throughput(Throughput::Elements(total as u64));
        group.bench_with_input(BenchmarkId::new("encode_batch", num_neg), &num_neg, |b, &num_neg| {
            b.iter(|| {
                let mut rng = SmallRng::seed_from_u64(1);
                let mut lines: Vec<String> = Vec::with_capacity(total);
                encode_batch(
                    &table,
                    &encoder,
                    &sampler,
                    NegativeSamplingPolicy::Ratio(num_neg),
                    &mut rng,
                    &mut lines,
                    |_| {},
                )
                .unwrap()
            });
        });
    }
    group.finish();
}

// ============================================================================
// Criterion main
// ============================================================================

fn main() {
    let mut criterion = Criterion::default()
        .warm_up_time(std::time::Duration::from_secs(3))
        .measurement_time(std::time::Duration::from_secs(10))
        .configure_from_args();

    bench_row_encoding(&mut criterion);
    bench_negative_sampling(&mut criterion);

    criterion.final_summary();
}
