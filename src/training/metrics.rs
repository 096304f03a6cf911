use burn::prelude::*;
use serde::Serialize;

/// Number of rows whose argmax matches the target class.
pub fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let [batch, _] = logits.dims();
    let pred = logits.argmax(1).reshape([batch]);
    pred.equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>() as usize
}

/// `correct / total * 100`, zero for an empty batch.
pub fn accuracy_percent(correct: usize, total: usize) -> f32 {
    if total == 0 {
        return 0.0;
    }
    correct as f32 / total as f32 * 100.0
}

/// Percentage of correct predictions in one batch.
pub fn batch_accuracy<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> f32 {
    let [batch, _] = logits.dims();
    accuracy_percent(count_correct(logits, targets), batch)
}

/// A batch whose progress line was printed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoggedBatch {
    pub batch: usize,
    pub size: usize,
    pub correct: usize,
    /// The `Acc` value of the line.
    pub accuracy: f32,
}

/// Result of one pass of [`Trainer::train_epoch`](super::Trainer::train_epoch).
#[derive(Debug, Clone, PartialEq)]
pub struct EpochSummary {
    pub epoch: usize,
    pub steps: usize,
    /// Loss of every batch, in order.
    pub losses: Vec<f32>,
    pub logged: Vec<LoggedBatch>,
}

impl EpochSummary {
    pub fn mean_loss(&self) -> f32 {
        if self.losses.is_empty() {
            return 0.0;
        }
        self.losses.iter().sum::<f32>() / self.losses.len() as f32
    }
}

/// Test-set metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EvalMetrics {
    /// Sample-weighted mean loss.
    pub loss: f32,
    pub correct: usize,
    pub total: usize,
    pub accuracy: f32,
}

impl EvalMetrics {
    pub fn new(loss_sum: f32, correct: usize, total: usize) -> Self {
        Self {
            loss: if total == 0 { 0.0 } else { loss_sum / total as f32 },
            correct,
            total,
            accuracy: accuracy_percent(correct, total),
        }
    }
}
