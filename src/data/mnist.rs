//! MNIST in the IDX format, raw or gzip-compressed.
//!
//! images: magic 2051 | count | rows | cols | pixels (u8, row major)
//! labels: magic 2049 | count | labels (u8)
//!
//! All header fields are big-endian u32.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use image::{DynamicImage, GrayImage};
use reqwest::blocking::Client;

use crate::data::dataset::{DataError, ImageDataset, Sample, Split};
use crate::data::download::download_noclobber;
use crate::data::transforms::Preprocessor;

pub const MIRROR: &str = "https://ossci-datasets.s3.amazonaws.com/mnist/";

const IMAGES_MAGIC: u32 = 2051;
const LABELS_MAGIC: u32 = 2049;
const NUM_CLASSES: usize = 10;

fn file_names(split: Split) -> (&'static str, &'static str) {
    match split {
        Split::Train => ("train-images-idx3-ubyte", "train-labels-idx1-ubyte"),
        Split::Test => ("t10k-images-idx3-ubyte", "t10k-labels-idx1-ubyte"),
    }
}

#[derive(Debug)]
pub struct MnistDataset {
    images: Vec<Vec<u8>>,
    labels: Vec<u8>,
    rows: usize,
    cols: usize,
    preprocessor: Preprocessor,
}

impl MnistDataset {
    /// Loads `split` from `dir`, fetching missing files from [`MIRROR`] when `download` is set.
    pub fn load(dir: &Path, split: Split, download: bool, preprocessor: Preprocessor) -> Result<Self> {
        let (img_name, lbl_name) = file_names(split);

        let img_path = locate(dir, img_name, download)?;
        let lbl_path = locate(dir, lbl_name, download)?;

        let img_bytes = read_maybe_gz(&img_path)?;
        let lbl_bytes = read_maybe_gz(&lbl_path)?;

        let dataset = Self::from_idx(&img_bytes, &lbl_bytes, preprocessor)?;
        log::info!("Loaded {} MNIST {} samples", dataset.len(), split);
        Ok(dataset)
    }

    pub fn from_idx(image_bytes: &[u8], label_bytes: &[u8], preprocessor: Preprocessor) -> Result<Self> {
        let (images, rows, cols) = parse_images(image_bytes)?;
        let labels = parse_labels(label_bytes)?;

        if images.len() != labels.len() {
            return Err(DataError::CountMismatch {
                images: images.len(),
                labels: labels.len(),
            }
            .into());
        }

        Ok(Self {
            images,
            labels,
            rows,
            cols,
            preprocessor,
        })
    }
}

impl ImageDataset for MnistDataset {
    fn len(&self) -> usize {
        self.images.len()
    }

    fn get(&self, index: usize) -> Result<Sample> {
        let pixels = self
            .images
            .get(index)
            .with_context(|| format!("index {} out of bounds for {} samples", index, self.len()))?;
        let gray = GrayImage::from_raw(self.cols as u32, self.rows as u32, pixels.clone())
            .context("MNIST image does not match its header dimensions")?;

        Ok(Sample {
            image: self.preprocessor.apply(&DynamicImage::ImageLuma8(gray)),
            label: self.labels[index] as usize,
        })
    }

    fn num_classes(&self) -> usize {
        NUM_CLASSES
    }

    fn name(&self) -> &str {
        "mnist"
    }
}

/// Finds `name` or `name.gz` in `dir`, downloading the compressed file if allowed.
fn locate(dir: &Path, name: &str, download: bool) -> Result<PathBuf> {
    let raw = dir.join(name);
    if raw.exists() {
        return Ok(raw);
    }
    let gz = dir.join(format!("{name}.gz"));
    if gz.exists() {
        return Ok(gz);
    }
    if !download {
        return Err(DataError::Missing(dir.to_path_buf()).into());
    }

    let client = Client::new();
    download_noclobber(&client, &format!("{MIRROR}{name}.gz"), &gz)
}

fn read_maybe_gz(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut bytes = Vec::new();
    if path.extension().is_some_and(|ext| ext == "gz") {
        GzDecoder::new(file)
            .read_to_end(&mut bytes)
            .with_context(|| format!("decompress {}", path.display()))?;
    } else {
        let mut file = file;
        file.read_to_end(&mut bytes)
            .with_context(|| format!("read {}", path.display()))?;
    }
    Ok(bytes)
}

fn read_u32(bytes: &[u8], offset: usize, file: &str) -> Result<u32, DataError> {
    bytes
        .get(offset..offset + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(DataError::Truncated {
            file: file.to_string(),
            expected: offset + 4,
            got: bytes.len(),
        })
}

fn check_magic(bytes: &[u8], expected: u32, file: &str) -> Result<(), DataError> {
    let got = read_u32(bytes, 0, file)?;
    if got != expected {
        return Err(DataError::InvalidMagic {
            file: file.to_string(),
            expected,
            got,
        });
    }
    Ok(())
}

fn parse_images(bytes: &[u8]) -> Result<(Vec<Vec<u8>>, usize, usize), DataError> {
    const FILE: &str = "images";
    check_magic(bytes, IMAGES_MAGIC, FILE)?;
    let count = read_u32(bytes, 4, FILE)? as usize;
    let rows = read_u32(bytes, 8, FILE)? as usize;
    let cols = read_u32(bytes, 12, FILE)? as usize;

    let pixels = &bytes[16..];
    let truncated = |expected| DataError::Truncated {
        file: FILE.to_string(),
        expected,
        got: bytes.len(),
    };
    let size = rows.checked_mul(cols).ok_or_else(|| truncated(usize::MAX))?;
    let needed = count
        .checked_mul(size)
        .and_then(|n| n.checked_add(16))
        .ok_or_else(|| truncated(usize::MAX))?;
    if bytes.len() < needed {
        return Err(truncated(needed));
    }

    let images = pixels
        .chunks_exact(size.max(1))
        .take(count)
        .map(<[u8]>::to_vec)
        .collect();
    Ok((images, rows, cols))
}

fn parse_labels(bytes: &[u8]) -> Result<Vec<u8>, DataError> {
    const FILE: &str = "labels";
    check_magic(bytes, LABELS_MAGIC, FILE)?;
    let count = read_u32(bytes, 4, FILE)? as usize;

    let labels = &bytes[8..];
    if labels.len() < count {
        return Err(DataError::Truncated {
            file: FILE.to_string(),
            expected: 8 + count,
            got: bytes.len(),
        });
    }
    Ok(labels[..count].to_vec())
}
