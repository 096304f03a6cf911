pub mod config;
pub mod evaluate;
pub mod metrics;
pub mod trainer;

use std::path::PathBuf;

use anyhow::{anyhow, ensure, Context, Result};
use burn::module::AutodiffModule;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use indicatif::{ProgressBar, ProgressStyle};

use crate::data::{load_data, ClassifierDataLoader, DataRequest, ImageSpec, LoaderOptions, Split};
use crate::model::{get_model, TaskNet};

pub use config::TrainingConfig;
pub use evaluate::evaluate;
pub use metrics::{
    accuracy_percent, batch_accuracy, count_correct, EpochSummary, EvalMetrics, LoggedBatch,
};
pub use trainer::{adam_config, Trainer};

/// Everything a finished run produced.
pub struct TrainingReport<B: AutodiffBackend> {
    pub model: TaskNet<B>,
    pub seed: u64,
    /// Optimizer steps over all epochs.
    pub steps: usize,
    pub epochs: Vec<EpochSummary>,
    /// `None` when the dataset has no test split.
    pub eval: Option<EvalMetrics>,
    pub artifact: PathBuf,
}

/// Trains a classifier, evaluates it on the test split and saves it to
/// [`TrainingConfig::output_path`]. Returns the trained model.
pub fn train<B: AutodiffBackend>(config: &TrainingConfig, device: &B::Device) -> Result<TaskNet<B>> {
    run(config, device).map(|report| report.model)
}

/// Same as [`train`], keeping the step count, loss history and test metrics.
pub fn run<B: AutodiffBackend>(
    config: &TrainingConfig,
    device: &B::Device,
) -> Result<TrainingReport<B>> {
    config.validate()?;

    let seed = config.seed.unwrap_or_else(rand::random);
    B::seed(seed);
    log::info!("Seed: {}", seed);

    let options = LoaderOptions::detect();
    log::info!(
        "Loader: {} workers (accelerator: {})",
        options.num_workers,
        crate::backend::accelerator_available()
    );

    let model = get_model::<B>(&config.model, config.num_cls, device)?;
    println!("-------Training net--------");
    println!("{}", model.summary());

    let spec = ImageSpec::new(model.num_channels(), model.image_size());
    let request = |split| DataRequest {
        name: &config.data,
        split,
        batch: config.batch,
        rootdir: &config.datadir,
        spec,
        download: config.download,
        options,
        seed,
    };
    let mut train_data = load_data::<B>(&request(Split::Train), device)?
        .ok_or_else(|| anyhow!("dataset '{}' has no train split", config.data))?;
    let test_data = load_data::<B::InnerBackend>(&request(Split::Test), device)?;

    let data_classes = train_data.dataset().num_classes();
    ensure!(
        data_classes <= config.num_cls,
        "dataset '{}' has {} classes but the model only predicts {}",
        config.data,
        data_classes,
        config.num_cls
    );

    let progress = ProgressBar::new(config.num_epoch as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?,
    );
    let mut trainer = Trainer::new(model, config).with_progress(progress.clone());

    println!("Training {} model for {}", config.model, config.data);
    let epochs = train_epochs(&mut trainer, &mut train_data, config.num_epoch, &progress)?;

    let steps = trainer.steps();
    let model = trainer.into_model();

    let eval = match test_data {
        Some(mut loader) => {
            println!(
                "Evaluating {}-{} model on {} test set",
                config.model, config.data, config.data
            );
            Some(evaluate(&mut loader, &model.valid())?)
        }
        None => None,
    };

    std::fs::create_dir_all(&config.outdir)
        .with_context(|| format!("create output dir {}", config.outdir.display()))?;
    let artifact = config.output_path();
    println!("Saving to {}", artifact.display());
    model.save(&artifact)?;

    Ok(TrainingReport {
        model,
        seed,
        steps,
        epochs,
        eval,
        artifact,
    })
}

/// Runs `num_epoch` epochs, ticking `progress` once per epoch. The bar is
/// cleared whether training finishes or fails.
fn train_epochs<B: AutodiffBackend>(
    trainer: &mut Trainer<B>,
    loader: &mut ClassifierDataLoader<B>,
    num_epoch: usize,
    progress: &ProgressBar,
) -> Result<Vec<EpochSummary>> {
    let mut epochs = Vec::with_capacity(num_epoch);
    for epoch in 0..num_epoch {
        let summary = trainer
            .train_epoch(loader, epoch)
            .inspect_err(|_| progress.finish_and_clear())?;
        progress.set_message(format!("Epoch {}: loss={:.4}", epoch, summary.mean_loss()));
        progress.inc(1);
        epochs.push(summary);
    }
    progress.finish_and_clear();
    Ok(epochs)
}
