//! Interleaving of real positives and synthetic negatives.
//!
//! With `num_neg` negatives per positive, a batch of `n` input rows produces
//! exactly `n` positives (each input row once, in order) and `num_neg * n`
//! negatives. Every step draws `d` in `[0, 1)`:
//!
//! 1. `d <= 1 / (num_neg + 1)` and positives remain: emit the next input row
//! 2. otherwise, negatives remain: emit a negative
//! 3. otherwise: the draw is wasted and nothing is emitted
//!
//! Once the positives are exhausted, rule 2 forces the remaining negatives.

use rand::prelude::*;
use serde::{Deserialize, Serialize};

use crate::common::{Result, TransformError};
use crate::encoder::RowEncoder;
use crate::sampler::NegativeSampler;
use crate::table::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NegativeSamplingPolicy {
    /// Encode every input row once, in order.
    #[default]
    None,
    /// Emit this many synthetic negatives per input row.
    Ratio(u32),
}

// ============================================================================
// State Machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emission {
    Positive(usize),
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Emit(Emission),
    Skip,
    Done,
}

#[derive(Debug, Clone)]
pub struct SamplingScheduler {
    pos_target: usize,
    neg_target: usize,
    pos_emitted: usize,
    neg_emitted: usize,
    pos_prob: f64,
}

impl SamplingScheduler {
    pub fn new(num_rows: usize, num_neg: u32) -> Result<Self> {
        if num_neg == 0 {
            return Err(TransformError::Configuration(
                "number of negatives per positive must be at least 1".into(),
            ));
        }
        Ok(Self {
            pos_target: num_rows,
            neg_target: num_rows * num_neg as usize,
            pos_emitted: 0,
            neg_emitted: 0,
            pos_prob: 1.0 / (num_neg as f64 + 1.0),
        })
    }

    pub fn is_done(&self) -> bool {
        self.pos_emitted == self.pos_target && self.neg_emitted == self.neg_target
    }

    /// Total number of lines the batch will contain.
    pub fn target(&self) -> usize {
        self.pos_target + self.neg_target
    }

    pub fn emitted(&self) -> (usize, usize) {
        (self.pos_emitted, self.neg_emitted)
    }

    /// Advance by one draw `dice` in `[0, 1)`.
    pub fn step(&mut self, dice: f64) -> Step {
        if self.is_done() {
            return Step::Done;
        }
        if dice <= self.pos_prob && self.pos_emitted < self.pos_target {
            let row = self.pos_emitted;
            self.pos_emitted += 1;
            Step::Emit(Emission::Positive(row))
        } else if self.neg_emitted < self.neg_target {
            self.neg_emitted += 1;
            Step::Emit(Emission::Negative)
        } else {
            Step::Skip
        }
    }
}

// ============================================================================
// Batch Encoding
// ============================================================================

/// Destination for encoded lines.
pub trait SampleSink {
    fn push_line(&mut self, line: &str) -> Result<()>;
}

impl SampleSink for Vec<String> {
    fn push_line(&mut self, line: &str) -> Result<()> {
        self.push(line.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchReport {
    pub positives: usize,
    pub negatives: usize,
}

impl BatchReport {
    pub fn lines(&self) -> usize {
        self.positives + self.negatives
    }
}

/// Encode every row of `table` into `sink`, interleaving negatives per `policy`.
///
/// `on_line` is called after every written line with the running line count.
pub fn encode_batch<R, S, F>(
    table: &Table,
    encoder: &RowEncoder<'_>,
    sampler: &NegativeSampler<'_>,
    policy: NegativeSamplingPolicy,
    rng: &mut R,
    sink: &mut S,
    mut on_line: F,
) -> Result<BatchReport>
where
    R: Rng + ?Sized,
    S: SampleSink + ?Sized,
    F: FnMut(usize),
{
    let mut line = String::new();
    let mut report = BatchReport::default();

    match policy {
        NegativeSamplingPolicy::None => {
            for row in 0..table.num_rows() {
                encoder.encode(table, row, &mut line)?;
                sink.push_line(&line)?;
                report.positives += 1;
                on_line(report.lines());
            }
        }
        NegativeSamplingPolicy::Ratio(num_neg) => {
            let mut scheduler = SamplingScheduler::new(table.num_rows(), num_neg)?;
            loop {
                match scheduler.step(rng.random::<f64>()) {
                    Step::Emit(Emission::Positive(row)) => {
                        encoder.encode(table, row, &mut line)?;
                        report.positives += 1;
                    }
                    Step::Emit(Emission::Negative) => {
                        sampler.sample(rng, &mut line);
                        report.negatives += 1;
                    }
                    Step::Skip => continue,
                    Step::Done => break,
                }
                sink.push_line(&line)?;
                on_line(report.lines());
            }
        }
    }
    Ok(report)
}
