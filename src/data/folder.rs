use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;

use crate::data::dataset::{DataError, ImageDataset, Sample, Split};
use crate::data::transforms::Preprocessor;

/// Images laid out one directory per class:
///
/// ```text
/// {root}/
/// ├── train/
/// │   ├── <class a>/*.png
/// │   └── <class b>/*.jpg
/// └── test/
///     └── ...
/// ```
///
/// Class indices follow the sorted class directories of `train/`, so a
/// class keeps its label in every split.
#[derive(Debug, Clone)]
pub struct ImageFolderDataset {
    name: String,
    samples: Vec<(PathBuf, usize)>,
    class_names: Vec<String>,
    preprocessor: Preprocessor,
}

impl ImageFolderDataset {
    /// Returns `Ok(None)` when the split directory does not exist.
    pub fn open(root: &Path, split: Split, preprocessor: Preprocessor) -> Result<Option<Self>> {
        let split_dir = root.join(split.as_str());
        if !split_dir.is_dir() {
            return Ok(None);
        }

        // The train split defines the class indices for every split.
        let train_dir = root.join(Split::Train.as_str());
        let class_names = if train_dir.is_dir() {
            class_dirs(&train_dir)?
        } else {
            class_dirs(&split_dir)?
        };

        let mut samples = Vec::new();
        for class_name in class_dirs(&split_dir)? {
            let class_id = class_names
                .iter()
                .position(|c| *c == class_name)
                .ok_or_else(|| DataError::UnknownClass {
                    class: class_name.clone(),
                    split,
                })?;
            let mut paths: Vec<PathBuf> = WalkDir::new(split_dir.join(class_name))
                .into_iter()
                .filter_map(|e| e.ok())
                .map(|e| e.into_path())
                .filter(|p| p.is_file() && is_image(p))
                .collect();
            paths.sort();
            samples.extend(paths.into_iter().map(|p| (p, class_id)));
        }

        if samples.is_empty() {
            return Err(DataError::Empty(split_dir).into());
        }

        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());
        log::info!(
            "Loaded {} {} samples in {} classes from {}",
            samples.len(),
            split,
            class_names.len(),
            root.display()
        );

        Ok(Some(Self {
            name,
            samples,
            class_names,
            preprocessor,
        }))
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }
}

/// Sorted names of the subdirectories of `dir`.
fn class_dirs(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_lowercase().as_str(), "jpg" | "jpeg" | "png"))
        .unwrap_or(false)
}

impl ImageDataset for ImageFolderDataset {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, index: usize) -> Result<Sample> {
        let (path, label) = self
            .samples
            .get(index)
            .with_context(|| format!("index {} out of bounds for {} samples", index, self.len()))?;
        let img = image::open(path).with_context(|| format!("decode {}", path.display()))?;

        Ok(Sample {
            image: self.preprocessor.apply(&img),
            label: *label,
        })
    }

    fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
