use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    // Data
    pub data: String,
    pub datadir: PathBuf,
    pub download: bool,

    // Model
    pub model: String,
    pub num_cls: usize,

    // Optimization
    pub num_epoch: usize,
    pub batch: usize,
    pub lr: f64,
    pub betas: [f32; 2],
    pub weight_decay: f32,
    /// Added to the denominator of every Adam update.
    pub epsilon: f32,
    /// Seeds weight init, dropout and shuffling. Unset means a fresh random run.
    pub seed: Option<u64>,

    // Output
    pub outdir: PathBuf,
    /// Print a progress line every this many batches.
    pub log_interval: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            data: "mnist".to_string(),
            datadir: PathBuf::from("data"),
            download: true,
            model: "LeNet".to_string(),
            num_cls: 10,
            num_epoch: 100,
            batch: 128,
            lr: 1e-4,
            betas: [0.9, 0.999],
            weight_decay: 0.0,
            epsilon: 1e-8,
            seed: None,
            outdir: PathBuf::new(),
            log_interval: 10,
        }
    }
}

impl TrainingConfig {
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let config: TrainingConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml).with_context(|| format!("write config {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.batch > 0, "batch size must be positive");
        ensure!(self.num_cls > 0, "num_cls must be positive");
        ensure!(self.log_interval > 0, "log_interval must be positive");
        ensure!(
            self.lr.is_finite() && self.lr > 0.0,
            "learning rate must be positive, got {}",
            self.lr
        );
        for beta in self.betas {
            ensure!(
                (0.0..1.0).contains(&beta),
                "Adam betas must lie in [0, 1), got {:?}",
                self.betas
            );
        }
        ensure!(
            self.weight_decay >= 0.0,
            "weight decay must be non-negative, got {}",
            self.weight_decay
        );
        ensure!(
            self.epsilon.is_finite() && self.epsilon > 0.0,
            "Adam epsilon must be positive, got {}",
            self.epsilon
        );
        Ok(())
    }

    /// `{outdir}/{model}_net_{data}.pth`
    pub fn output_path(&self) -> PathBuf {
        self.outdir
            .join(format!("{}_net_{}.pth", self.model, self.data))
    }
}
