use burn::nn::loss::CrossEntropyLossConfig;
use burn::prelude::*;

/// Mean cross-entropy between class logits `[N, C]` and integer targets `[N]`.
pub struct ClassificationLoss;

impl ClassificationLoss {
    pub fn compute<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        let [batch, _] = logits.dims();
        let [n_targets] = targets.dims();
        debug_assert_eq!(batch, n_targets, "logits and targets disagree on batch size");

        CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits, targets)
    }
}
