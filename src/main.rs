use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use tasknet::backend::{default_device, TrainingBackend};
use tasknet::training::{self, TrainingConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Train a task classifier net")]
struct Args {
    /// YAML config; command line flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dataset name: mnist, synthetic[:<n>] or a folder under --datadir
    #[arg(short, long)]
    data: Option<String>,

    #[arg(long)]
    datadir: Option<PathBuf>,

    /// LeNet or DTNClassifier
    #[arg(short, long)]
    model: Option<String>,

    #[arg(long)]
    num_cls: Option<usize>,

    #[arg(short = 'e', long)]
    num_epoch: Option<usize>,

    #[arg(short, long)]
    batch: Option<usize>,

    #[arg(long)]
    lr: Option<f64>,

    #[arg(long, num_args = 2, value_names = ["BETA1", "BETA2"])]
    betas: Option<Vec<f32>>,

    #[arg(long)]
    weight_decay: Option<f32>,

    #[arg(long)]
    epsilon: Option<f32>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(short, long)]
    outdir: Option<PathBuf>,

    #[arg(long)]
    log_interval: Option<usize>,

    /// Fail instead of fetching missing dataset files
    #[arg(long)]
    no_download: bool,

    /// Write the resolved config to this path before training
    #[arg(long)]
    save_config: Option<PathBuf>,
}

impl Args {
    fn resolve(self) -> Result<(TrainingConfig, Option<PathBuf>)> {
        let mut config = match &self.config {
            Some(path) => TrainingConfig::from_yaml(path)?,
            None => TrainingConfig::default(),
        };

        if let Some(v) = self.data {
            config.data = v;
        }
        if let Some(v) = self.datadir {
            config.datadir = v;
        }
        if let Some(v) = self.model {
            config.model = v;
        }
        if let Some(v) = self.num_cls {
            config.num_cls = v;
        }
        if let Some(v) = self.num_epoch {
            config.num_epoch = v;
        }
        if let Some(v) = self.batch {
            config.batch = v;
        }
        if let Some(v) = self.lr {
            config.lr = v;
        }
        if let Some(v) = self.betas {
            if let [beta_1, beta_2] = v[..] {
                config.betas = [beta_1, beta_2];
            }
        }
        if let Some(v) = self.weight_decay {
            config.weight_decay = v;
        }
        if let Some(v) = self.epsilon {
            config.epsilon = v;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if let Some(v) = self.outdir {
            config.outdir = v;
        }
        if let Some(v) = self.log_interval {
            config.log_interval = v;
        }
        if self.no_download {
            config.download = false;
        }

        Ok((config, self.save_config))
    }
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let (config, save_config) = Args::parse().resolve()?;
    config.validate()?;

    if let Some(path) = save_config {
        config.save(&path)?;
        log::info!("Wrote config to {}", path.display());
    }

    println!("Training configuration:");
    println!("  Data: {} ({})", config.data, config.datadir.display());
    println!("  Model: {} ({} classes)", config.model, config.num_cls);
    println!("  Epochs: {}", config.num_epoch);
    println!("  Batch size: {}", config.batch);
    println!("  Learning rate: {}", config.lr);
    println!("  Betas: {:?}", config.betas);
    println!("  Weight decay: {}", config.weight_decay);
    println!();

    let device = default_device();
    let report = training::run::<TrainingBackend>(&config, &device)?;

    println!();
    println!("Finished {} optimizer steps (seed {})", report.steps, report.seed);
    if let Some(last) = report.epochs.last() {
        println!("  Final epoch loss: {:.4}", last.mean_loss());
    }
    if let Some(eval) = report.eval {
        println!("  Test accuracy: {:.2}%", eval.accuracy);
    }
    println!("  Weights: {}", report.artifact.display());

    Ok(())
}
