use anyhow::Result;
use burn::prelude::*;

use crate::data::ClassifierDataLoader;
use crate::model::TaskNet;
use crate::training::metrics::{count_correct, EvalMetrics};

/// Average loss and accuracy of `model` over one pass of `loader`.
pub fn evaluate<B: Backend>(
    loader: &mut ClassifierDataLoader<B>,
    model: &TaskNet<B>,
) -> Result<EvalMetrics> {
    let mut loss_sum = 0.0;
    let mut correct = 0;
    let mut total = 0;

    for batch in loader.iter() {
        let batch = batch?;
        let n = batch.len();

        let logits = model.forward(batch.images);
        let loss = model
            .criterion_cls(logits.clone(), batch.targets.clone())
            .into_scalar()
            .elem::<f32>();

        loss_sum += loss * n as f32;
        correct += count_correct(logits, batch.targets);
        total += n;
    }

    let metrics = EvalMetrics::new(loss_sum, correct, total);
    println!(
        "[Evaluate] Average loss: {:.4}, Accuracy: {}/{} ({:.2}%)",
        metrics.loss, metrics.correct, metrics.total, metrics.accuracy
    );
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ImageSpec, Preprocessor, SyntheticDataset};
    use crate::model::ModelKind;
    use burn::backend::NdArray;
    use std::sync::Arc;

    type TestBackend = NdArray;

    #[test]
    fn covers_every_test_sample() {
        let device = Default::default();
        let spec = ImageSpec::new(1, 28);
        let dataset = SyntheticDataset::new(13, 2, Preprocessor::new(spec).unwrap());
        let mut loader = ClassifierDataLoader::<TestBackend>::new(
            Arc::new(dataset),
            spec,
            5,
            false,
            0,
            Default::default(),
        );
        let model = TaskNet::new(&device, ModelKind::LeNet, 10);

        let metrics = evaluate(&mut loader, &model).unwrap();

        assert_eq!(metrics.total, 13);
        assert!(metrics.correct <= 13);
        assert!((0.0..=100.0).contains(&metrics.accuracy));
        assert!(metrics.loss.is_finite() && metrics.loss > 0.0);
    }
}
