use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use thiserror::Error;

/// Failures specific to reading and preparing image data.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("{file}: invalid IDX magic, expected {expected:#06x}, got {got:#06x}")]
    InvalidMagic {
        file: String,
        expected: u32,
        got: u32,
    },
    #[error("{file}: truncated, expected {expected} bytes, got {got}")]
    Truncated {
        file: String,
        expected: usize,
        got: usize,
    },
    #[error("{images} images but {labels} labels")]
    CountMismatch { images: usize, labels: usize },
    #[error("unsupported channel count {0}, expected 1 or 3")]
    UnsupportedChannels(usize),
    #[error("dataset not found at {}; rerun with download enabled", .0.display())]
    Missing(PathBuf),
    #[error("class '{class}' in the {split} split has no train directory")]
    UnknownClass { class: String, split: Split },
    #[error("no images found under {}", .0.display())]
    Empty(PathBuf),
}

/// Which part of a dataset to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "train" => Ok(Split::Train),
            "test" => Ok(Split::Test),
            _ => Err(anyhow::anyhow!(
                "unknown split: {}. Use 'train' or 'test'",
                s
            )),
        }
    }
}

/// Input geometry a model expects: `num_channels x image_size x image_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSpec {
    pub num_channels: usize,
    pub image_size: usize,
}

impl ImageSpec {
    pub fn new(num_channels: usize, image_size: usize) -> Self {
        Self {
            num_channels,
            image_size,
        }
    }

    /// Number of floats in one preprocessed image.
    pub fn numel(&self) -> usize {
        self.num_channels * self.image_size * self.image_size
    }
}

/// One preprocessed image (CHW, normalized) and its class index.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub image: Vec<f32>,
    pub label: usize,
}

/// Indexed collection of labelled images, already shaped for a model.
///
/// Implementations are shared with loader worker threads.
pub trait ImageDataset: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, index: usize) -> Result<Sample>;

    fn num_classes(&self) -> usize;

    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_parses_known_names() {
        assert_eq!("train".parse::<Split>().unwrap(), Split::Train);
        assert_eq!("TEST".parse::<Split>().unwrap(), Split::Test);
        assert!("val".parse::<Split>().is_err());
    }

    #[test]
    fn image_spec_numel() {
        assert_eq!(ImageSpec::new(3, 32).numel(), 3 * 32 * 32);
    }

    #[test]
    fn missing_error_mentions_download() {
        let msg = DataError::Missing(PathBuf::from("data/mnist")).to_string();
        assert!(msg.contains("data/mnist"));
        assert!(msg.contains("download"));
    }
}
