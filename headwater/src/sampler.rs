//! Synthetic negative rows drawn from the fitted training distribution.
//!
//! A negative never consumes an input row. Each field is drawn independently:
//!
//! - categorical: one index uniformly from the column's training index block
//! - integer numerical: uniform over `[min, max]`
//! - float numerical: uniform over `[min, max)`
//!
//! A numerical column with `min == max` always yields that constant.

use rand::prelude::*;

use crate::encoder::{FeatureValue, TokenFormat};
use crate::index::{FeatureIndex, FieldKind, NumericRange};

pub struct NegativeSampler<'a> {
    index: &'a FeatureIndex,
    tokens: TokenFormat,
}

impl<'a> NegativeSampler<'a> {
    pub fn new(index: &'a FeatureIndex, tokens: TokenFormat) -> Self {
        Self { index, tokens }
    }

    /// Overwrite `out` with one encoded `label=0` line.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, out: &mut String) {
        out.clear();
        self.tokens.write_label(out, false);
        for entry in self.index.fields() {
            match &entry.kind {
                FieldKind::Categorical(cats) => {
                    let feature = cats.nth_index(rng.random_range(0..cats.len()));
                    self.tokens.write_token(out, entry.field, feature, FeatureValue::One);
                }
                FieldKind::Numerical(num) => {
                    let value = draw_numeric(rng, num.range);
                    self.tokens.write_token(out, entry.field, num.feature, value);
                }
            }
        }
    }
}

fn draw_numeric<R: Rng + ?Sized>(rng: &mut R, range: NumericRange) -> FeatureValue {
    match range {
        NumericRange::Int { min, max } => FeatureValue::Int(rng.random_range(min..=max)),
        NumericRange::Float { min, max } if min < max => FeatureValue::Float(draw_float(rng, min, max)),
        NumericRange::Float { min, .. } => FeatureValue::Float(min),
    }
}

/// Uniform draw from `[min, max)` for finite `min < max`.
///
/// `max - min` overflows for ranges wider than `f64::MAX`; those interpolate
/// between the endpoints instead.
fn draw_float<R: Rng + ?Sized>(rng: &mut R, min: f64, max: f64) -> f64 {
    if (max - min).is_finite() {
        return rng.random_range(min..max);
    }
    let t: f64 = rng.random();
    let v = min * (1.0 - t) + max * t;
    if v < max { v } else { min }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;

    use crate::common::{ColumnIdx, ColumnLayout};
    use crate::encoder::FeatureFormat;
    use crate::table::{Column, Table};

    fn tokens() -> TokenFormat {
        TokenFormat {
            format: FeatureFormat::LibSvm,
            float_precision: None,
        }
    }

    fn fit(columns: Vec<Column>, cat: &[u32], num: &[u32]) -> FeatureIndex {
        let table = Table::from_columns(None, columns).unwrap();
        let layout = ColumnLayout::new(
            ColumnIdx(0),
            cat.iter().copied().map(ColumnIdx).collect(),
            num.iter().copied().map(ColumnIdx).collect(),
        )
        .unwrap();
        FeatureIndex::fit(&table, &layout).unwrap()
    }

    /// Values of the tokens of a libsvm negative line, label checked.
    fn values(line: &str) -> Vec<(u32, String)> {
        let mut parts = line.split(' ');
        assert_eq!(parts.next(), Some("0"));
        parts
            .map(|tok| {
                let (feat, val) = tok.split_once(':').unwrap();
                (feat.parse().unwrap(), val.to_string())
            })
            .collect()
    }

    #[test]
    fn test_integer_range_is_closed() {
        let index = fit(vec![Column::Int(vec![1, 1]), Column::Int(vec![3, 9])], &[], &[1]);
        let sampler = NegativeSampler::new(&index, tokens());
        let mut rng = SmallRng::seed_from_u64(42);
        let mut line = String::new();
        let mut seen = [false; 7];
        for _ in 0..2000 {
            sampler.sample(&mut rng, &mut line);
            let v: i64 = values(&line)[0].1.parse().unwrap();
            assert!((3..=9).contains(&v), "{v} outside [3, 9]");
            seen[(v - 3) as usize] = true;
        }
        assert!(seen.iter().all(|&s| s), "both endpoints should be drawn");
    }

    #[test]
    fn test_float_range_is_half_open() {
        let index = fit(vec![Column::Int(vec![1, 1]), Column::Float(vec![0.0, 1.0])], &[], &[1]);
        let sampler = NegativeSampler::new(&index, tokens());
        let mut rng = SmallRng::seed_from_u64(7);
        let mut line = String::new();
        for _ in 0..2000 {
            sampler.sample(&mut rng, &mut line);
            let v: f64 = values(&line)[0].1.parse().unwrap();
            assert!((0.0..1.0).contains(&v), "{v} outside [0, 1)");
        }
    }

    #[test]
    fn test_float_range_wider_than_f64_max() {
        let index = fit(
            vec![Column::Int(vec![1, 1]), Column::Float(vec![-1.5e308, 1.5e308])],
            &[],
            &[1],
        );
        let sampler = NegativeSampler::new(&index, tokens());
        let mut rng = SmallRng::seed_from_u64(11);
        let mut line = String::new();
        for _ in 0..1000 {
            sampler.sample(&mut rng, &mut line);
            let v: f64 = values(&line)[0].1.parse().unwrap();
            assert!(v.is_finite());
            assert!((-1.5e308..1.5e308).contains(&v), "{v} outside range");
        }
    }

    #[test]
    fn test_constant_column() {
        let index = fit(
            vec![
                Column::Int(vec![1, 1]),
                Column::Float(vec![2.5, 2.5]),
                Column::Int(vec![4, 4]),
            ],
            &[],
            &[1, 2],
        );
        let sampler = NegativeSampler::new(&index, tokens());
        let mut rng = SmallRng::seed_from_u64(0);
        let mut line = String::new();
        sampler.sample(&mut rng, &mut line);
        assert_eq!(line, "0 1:2.5 2:4");
    }

    #[test]
    fn test_categorical_draws_stay_in_block() {
        let index = fit(
            vec![
                Column::Int(vec![1, 1, 1]),
                Column::Text(vec!["a".into(), "b".into(), "c".into()]),
                Column::Int(vec![10, 20, 10]),
            ],
            &[1, 2],
            &[],
        );
        let sampler = NegativeSampler::new(&index, tokens());
        let mut rng = SmallRng::seed_from_u64(3);
        let mut line = String::new();
        for _ in 0..500 {
            sampler.sample(&mut rng, &mut line);
            let toks = values(&line);
            assert_eq!(toks.len(), 2);
            assert!((1..=3).contains(&toks[0].0));
            assert!((4..=5).contains(&toks[1].0));
            assert!(toks.iter().all(|(_, v)| v == "1"));
        }
    }
}
