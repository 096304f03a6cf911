use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};

use crate::model::blocks::ConvBlockConfig;

/// Architectures the model factory knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    /// Two conv layers + two fc layers on 28x28 grayscale digits.
    LeNet,
    /// Three strided conv layers with batch norm on 32x32 RGB digits.
    DtnClassifier,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::LeNet, ModelKind::DtnClassifier];

    pub fn layout(&self) -> NetLayout {
        match self {
            ModelKind::LeNet => NetLayout {
                num_channels: 1,
                image_size: 28,
                features: vec![
                    ConvBlockConfig::new(1, 20, 5).with_pool(2),
                    ConvBlockConfig::new(20, 50, 5).with_dropout(0.5).with_pool(2),
                ],
                hidden: vec![(500, 0.5)],
            },
            ModelKind::DtnClassifier => {
                let block = |in_channels, out_channels, dropout| {
                    ConvBlockConfig::new(in_channels, out_channels, 5)
                        .with_stride(2)
                        .with_padding(2)
                        .with_batch_norm()
                        .with_dropout(dropout)
                };
                NetLayout {
                    num_channels: 3,
                    image_size: 32,
                    features: vec![block(3, 64, 0.1), block(64, 128, 0.3), block(128, 256, 0.5)],
                    hidden: vec![(512, 0.5)],
                }
            }
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::LeNet => write!(f, "LeNet"),
            ModelKind::DtnClassifier => write!(f, "DTNClassifier"),
        }
    }
}

impl FromStr for ModelKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lenet" => Ok(ModelKind::LeNet),
            "dtnclassifier" | "dtn" => Ok(ModelKind::DtnClassifier),
            _ => {
                let known: Vec<String> = ModelKind::ALL.iter().map(|k| k.to_string()).collect();
                bail!("unknown model '{}', expected one of: {}", s, known.join(", "))
            }
        }
    }
}

/// Layer plan of a classifier: conv feature blocks, hidden fc layers, then a linear head.
#[derive(Debug, Clone, PartialEq)]
pub struct NetLayout {
    pub num_channels: usize,
    pub image_size: usize,
    pub features: Vec<ConvBlockConfig>,
    /// `(width, dropout)` of each hidden fully connected layer.
    pub hidden: Vec<(usize, f64)>,
}

impl NetLayout {
    /// Length of the flattened feature vector fed to the first fc layer.
    pub fn flat_features(&self) -> usize {
        let size = self
            .features
            .iter()
            .fold(self.image_size, |size, block| block.output_size(size));
        let channels = self
            .features
            .last()
            .map_or(self.num_channels, |block| block.out_channels);
        channels * size * size
    }
}
