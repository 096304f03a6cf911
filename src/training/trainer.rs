use anyhow::Result;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use indicatif::ProgressBar;

use crate::data::ClassifierDataLoader;
use crate::model::TaskNet;
use crate::training::metrics::{accuracy_percent, count_correct, EpochSummary, LoggedBatch};
use crate::training::TrainingConfig;

/// Owns a model and the Adam state bound to its parameters.
pub struct Trainer<B: AutodiffBackend> {
    model: TaskNet<B>,
    optimizer: OptimizerAdaptor<Adam, TaskNet<B>, B>,
    learning_rate: f64,
    log_interval: usize,
    steps: usize,
    progress: Option<ProgressBar>,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(model: TaskNet<B>, config: &TrainingConfig) -> Self {
        Self {
            model,
            optimizer: adam_config(config).init(),
            learning_rate: config.lr,
            log_interval: config.log_interval.max(1),
            steps: 0,
            progress: None,
        }
    }

    /// Routes progress lines above `bar` while it is drawn.
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    pub fn model(&self) -> &TaskNet<B> {
        &self.model
    }

    pub fn into_model(self) -> TaskNet<B> {
        self.model
    }

    /// Optimizer steps taken so far.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// One optimizer step per batch of `loader`.
    pub fn train_epoch(
        &mut self,
        loader: &mut ClassifierDataLoader<B>,
        epoch: usize,
    ) -> Result<EpochSummary> {
        let total = loader.dataset_len();
        let num_batches = loader.len();
        let mut losses = Vec::with_capacity(num_batches);
        let mut logged = Vec::new();

        for (batch_idx, batch) in loader.iter().enumerate() {
            let batch = batch?;
            let batch_len = batch.len();

            let logits = self.model.forward(batch.images);
            let loss = self
                .model
                .criterion_cls(logits.clone(), batch.targets.clone());
            let loss_value = loss.clone().into_scalar().elem::<f32>();
            if !loss_value.is_finite() {
                log::warn!("non-finite loss {} at epoch {} batch {}", loss_value, epoch, batch_idx);
            }

            if batch_idx % self.log_interval == 0 {
                let correct = count_correct(logits.detach(), batch.targets);
                let acc = accuracy_percent(correct, batch_len);
                logged.push(LoggedBatch {
                    batch: batch_idx,
                    size: batch_len,
                    correct,
                    accuracy: acc,
                });
                self.emit(format!(
                    "[Train] Epoch: {} [{}/{} ({:.0}%)]\tLoss: {:.6}  Acc: {:.2}",
                    epoch,
                    batch_idx * batch_len,
                    total,
                    100.0 * batch_idx as f32 / num_batches as f32,
                    loss_value,
                    acc
                ));
            }

            let grads = GradientsParams::from_grads(loss.backward(), &self.model);
            self.model = self
                .optimizer
                .step(self.learning_rate, self.model.clone(), grads);
            self.steps += 1;

            losses.push(loss_value);
        }

        Ok(EpochSummary {
            epoch,
            steps: losses.len(),
            losses,
            logged,
        })
    }

    fn emit(&self, line: String) {
        match &self.progress {
            Some(bar) if !bar.is_hidden() => bar.println(line),
            _ => println!("{line}"),
        }
    }
}

/// Adam with the configured betas, epsilon and optional L2 weight decay.
pub fn adam_config(config: &TrainingConfig) -> AdamConfig {
    let [beta_1, beta_2] = config.betas;
    let weight_decay =
        (config.weight_decay > 0.0).then(|| WeightDecayConfig::new(config.weight_decay));

    AdamConfig::new()
        .with_beta_1(beta_1)
        .with_beta_2(beta_2)
        .with_epsilon(config.epsilon)
        .with_weight_decay(weight_decay)
}
