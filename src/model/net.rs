use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use burn::module::Ignored;
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::record::{BinBytesRecorder, FullPrecisionSettings, Recorder};
use serde::{Deserialize, Serialize};

use super::blocks::{ConvBlock, DenseBlock};
use super::loss::ClassificationLoss;
use super::zoo::ModelKind;

/// Image classifier built from a [`NetLayout`](super::NetLayout).
#[derive(Module, Debug)]
pub struct TaskNet<B: Backend> {
    features: Vec<ConvBlock<B>>,
    classifier: Vec<DenseBlock<B>>,
    head: Linear<B>,
    kind: Ignored<ModelKind>,
    num_channels: usize,
    image_size: usize,
    num_cls: usize,
}

/// Architecture description written next to the saved weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMeta {
    pub model: String,
    pub num_cls: usize,
    pub num_channels: usize,
    pub image_size: usize,
}

impl<B: Backend> TaskNet<B> {
    pub fn new(device: &B::Device, kind: ModelKind, num_cls: usize) -> Self {
        let layout = kind.layout();

        let features = layout
            .features
            .iter()
            .map(|block| block.init(device))
            .collect();

        let mut width = layout.flat_features();
        let mut classifier = Vec::with_capacity(layout.hidden.len());
        for &(hidden, dropout) in &layout.hidden {
            classifier.push(DenseBlock::new(device, width, hidden, dropout));
            width = hidden;
        }

        Self {
            features,
            classifier,
            head: LinearConfig::new(width, num_cls).init(device),
            kind: Ignored(kind),
            num_channels: layout.num_channels,
            image_size: layout.image_size,
            num_cls,
        }
    }

    /// Class logits `[N, num_cls]` for images `[N, num_channels, image_size, image_size]`.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self
            .features
            .iter()
            .fold(images, |x, block| block.forward(x));
        let x = x.flatten::<2>(1, 3);
        let x = self
            .classifier
            .iter()
            .fold(x, |x, block| block.forward(x));
        self.head.forward(x)
    }

    /// Classification criterion used for training and evaluation.
    pub fn criterion_cls(&self, logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        ClassificationLoss::compute(logits, targets)
    }

    pub fn kind(&self) -> ModelKind {
        self.kind.0
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }

    pub fn num_cls(&self) -> usize {
        self.num_cls
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} conv blocks, {} hidden layers, input {}x{}x{}, {} classes, {} parameters",
            self.kind(),
            self.features.len(),
            self.classifier.len(),
            self.num_channels,
            self.image_size,
            self.image_size,
            self.num_cls,
            self.num_params()
        )
    }

    pub fn meta(&self) -> ModelMeta {
        ModelMeta {
            model: self.kind().to_string(),
            num_cls: self.num_cls,
            num_channels: self.num_channels,
            image_size: self.image_size,
        }
    }

    /// Writes the weights to exactly `path` and the architecture to [`meta_path`]`(path)`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let bytes = BinBytesRecorder::<FullPrecisionSettings>::default()
            .record(self.clone().into_record(), ())
            .map_err(|e| anyhow!("failed to encode {} weights: {:?}", self.kind(), e))?;
        fs::write(path, bytes).with_context(|| format!("write weights {}", path.display()))?;

        let meta_path = meta_path(path);
        let meta = serde_json::to_string_pretty(&self.meta())?;
        fs::write(&meta_path, meta)
            .with_context(|| format!("write model description {}", meta_path.display()))?;

        Ok(())
    }

    /// Rebuilds the architecture from the description next to `path` and loads the weights.
    pub fn load(path: impl AsRef<Path>, device: &B::Device) -> Result<Self> {
        let path = path.as_ref();

        let meta_path = meta_path(path);
        let content = fs::read_to_string(&meta_path)
            .with_context(|| format!("read model description {}", meta_path.display()))?;
        let meta: ModelMeta = serde_json::from_str(&content)
            .with_context(|| format!("parse model description {}", meta_path.display()))?;

        let model = super::get_model::<B>(&meta.model, meta.num_cls, device)?;

        let bytes = fs::read(path).with_context(|| format!("read weights {}", path.display()))?;
        let record = BinBytesRecorder::<FullPrecisionSettings>::default()
            .load(bytes, device)
            .map_err(|e| anyhow!("failed to decode weights {}: {:?}", path.display(), e))?;

        Ok(model.load_record(record))
    }
}

/// Sidecar file describing the architecture of the weights at `weights`.
pub fn meta_path(weights: &Path) -> PathBuf {
    weights.with_extension("json")
}
