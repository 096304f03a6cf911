pub mod dataloader;
pub mod dataset;
pub mod download;
pub mod folder;
pub mod mnist;
pub mod synthetic;
pub mod transforms;

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use burn::prelude::*;

pub use dataloader::{BatchIter, ClassBatch, ClassifierDataLoader, LoaderOptions};
pub use dataset::{DataError, ImageDataset, ImageSpec, Sample, Split};
pub use folder::ImageFolderDataset;
pub use mnist::MnistDataset;
pub use synthetic::SyntheticDataset;
pub use transforms::Preprocessor;

/// Where a dataset name points to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    /// IDX files under `{root}/mnist`, downloadable.
    Mnist,
    /// In-memory generated images; `synthetic:<n>` sets the train size.
    Synthetic { train_len: usize },
    /// Class-per-directory images under `{root}/{name}`.
    Folder(String),
}

impl DataSource {
    pub const SYNTHETIC_TRAIN_LEN: usize = 256;

    pub fn parse(name: &str) -> Result<Self> {
        let lower = name.to_ascii_lowercase();
        if lower == "mnist" {
            return Ok(DataSource::Mnist);
        }
        if lower == "synthetic" {
            return Ok(DataSource::Synthetic {
                train_len: Self::SYNTHETIC_TRAIN_LEN,
            });
        }
        if let Some(len) = lower.strip_prefix("synthetic:") {
            let train_len = len
                .parse()
                .map_err(|_| anyhow!("invalid synthetic dataset size in '{}'", name))?;
            return Ok(DataSource::Synthetic { train_len });
        }
        if name.is_empty() {
            return Err(anyhow!("dataset name is empty"));
        }
        Ok(DataSource::Folder(name.to_string()))
    }
}

/// Everything needed to build a loader for one split of a dataset.
#[derive(Debug, Clone)]
pub struct DataRequest<'a> {
    pub name: &'a str,
    pub split: Split,
    pub batch: usize,
    pub rootdir: &'a Path,
    pub spec: ImageSpec,
    pub download: bool,
    pub options: LoaderOptions,
    pub seed: u64,
}

/// Builds a batch loader for `request.split`; `Ok(None)` when the dataset has no such split.
///
/// The train split is reshuffled every pass, the test split is read in order.
pub fn load_data<B: Backend>(
    request: &DataRequest<'_>,
    device: &B::Device,
) -> Result<Option<ClassifierDataLoader<B>>> {
    let preprocessor = Preprocessor::new(request.spec)?;

    let dataset: Arc<dyn ImageDataset> = match DataSource::parse(request.name)? {
        DataSource::Mnist => Arc::new(MnistDataset::load(
            &request.rootdir.join("mnist"),
            request.split,
            request.download,
            preprocessor,
        )?),
        DataSource::Synthetic { train_len } => {
            let (len, seed) = match request.split {
                Split::Train => (train_len, request.seed),
                Split::Test => ((train_len / 4).max(1), request.seed.wrapping_add(1)),
            };
            Arc::new(SyntheticDataset::new(len, seed, preprocessor))
        }
        DataSource::Folder(name) => {
            let root = request.rootdir.join(&name);
            if !root.is_dir() {
                return Err(DataError::Missing(root).into());
            }
            match ImageFolderDataset::open(&root, request.split, preprocessor)? {
                Some(ds) => Arc::new(ds),
                None => return Ok(None),
            }
        }
    };

    let shuffle = request.split == Split::Train;
    Ok(Some(
        ClassifierDataLoader::new(
            dataset,
            request.spec,
            request.batch,
            shuffle,
            request.seed,
            device.clone(),
        )
        .with_options(request.options),
    ))
}
