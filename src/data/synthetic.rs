use anyhow::{Context, Result};
use image::{DynamicImage, GrayImage};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::data::dataset::{ImageDataset, Sample};
use crate::data::transforms::Preprocessor;

const SIDE: u32 = 28;
const SQUARE: u32 = 6;
pub const NUM_CLASSES: usize = 10;

/// Digit-sized grayscale images with a bright square whose position encodes the class.
///
/// Fully determined by `(len, seed)`, so two instances with the same arguments
/// yield identical samples.
#[derive(Debug, Clone)]
pub struct SyntheticDataset {
    images: Vec<Vec<u8>>,
    labels: Vec<usize>,
    preprocessor: Preprocessor,
}

impl SyntheticDataset {
    pub fn new(len: usize, seed: u64, preprocessor: Preprocessor) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);

        let mut labels: Vec<usize> = (0..len).map(|i| i % NUM_CLASSES).collect();
        labels.shuffle(&mut rng);

        let images = labels
            .iter()
            .map(|&label| render(label, &mut rng))
            .collect();

        Self {
            images,
            labels,
            preprocessor,
        }
    }
}

fn render(label: usize, rng: &mut StdRng) -> Vec<u8> {
    let col = (label % 4) as u32;
    let row = (label / 4) as u32;
    let (x0, y0) = (1 + col * 7, 2 + row * 9);

    let mut pixels: Vec<u8> = (0..SIDE * SIDE).map(|_| rng.gen_range(0..48)).collect();
    for y in y0..y0 + SQUARE {
        for x in x0..x0 + SQUARE {
            pixels[(y * SIDE + x) as usize] = rng.gen_range(200..=255);
        }
    }
    pixels
}

impl ImageDataset for SyntheticDataset {
    fn len(&self) -> usize {
        self.images.len()
    }

    fn get(&self, index: usize) -> Result<Sample> {
        let pixels = self
            .images
            .get(index)
            .with_context(|| format!("index {} out of bounds for {} samples", index, self.len()))?;
        let gray = GrayImage::from_raw(SIDE, SIDE, pixels.clone())
            .context("synthetic image has the wrong size")?;

        Ok(Sample {
            image: self.preprocessor.apply(&DynamicImage::ImageLuma8(gray)),
            label: self.labels[index],
        })
    }

    fn num_classes(&self) -> usize {
        NUM_CLASSES
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::ImageSpec;

    fn preprocessor() -> Preprocessor {
        Preprocessor::new(ImageSpec::new(1, 28)).unwrap()
    }

    #[test]
    fn same_seed_same_samples() {
        let a = SyntheticDataset::new(12, 7, preprocessor());
        let b = SyntheticDataset::new(12, 7, preprocessor());

        for i in 0..12 {
            assert_eq!(a.get(i).unwrap(), b.get(i).unwrap());
        }
    }

    #[test]
    fn classes_are_balanced() {
        let ds = SyntheticDataset::new(30, 1, preprocessor());

        let mut counts = [0usize; NUM_CLASSES];
        for i in 0..ds.len() {
            counts[ds.get(i).unwrap().label] += 1;
        }

        assert!(counts.iter().all(|&c| c == 3));
    }

    #[test]
    fn square_sits_where_the_label_says() {
        let ds = SyntheticDataset::new(10, 3, preprocessor());

        for i in 0..ds.len() {
            let sample = ds.get(i).unwrap();
            let col = sample.label % 4;
            let row = sample.label / 4;
            let (x, y) = (1 + col * 7 + 2, 2 + row * 9 + 2);
            assert!(sample.image[y * 28 + x] > 0.5);
        }
    }

    #[test]
    fn out_of_range_index_fails() {
        let ds = SyntheticDataset::new(2, 0, preprocessor());
        assert!(ds.get(2).is_err());
    }
}
