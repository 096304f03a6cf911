use anyhow::Result;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

use crate::data::dataset::{DataError, ImageSpec};

const MEAN: f32 = 0.5;
const STD: f32 = 0.5;

/// Resizes, converts channels and normalizes images to what a model expects.
#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
    spec: ImageSpec,
}

impl Preprocessor {
    pub fn new(spec: ImageSpec) -> Result<Self> {
        if !matches!(spec.num_channels, 1 | 3) {
            return Err(DataError::UnsupportedChannels(spec.num_channels).into());
        }
        Ok(Self { spec })
    }

    pub fn spec(&self) -> ImageSpec {
        self.spec
    }

    /// CHW floats in `[-1, 1]`.
    pub fn apply(&self, img: &DynamicImage) -> Vec<f32> {
        let size = self.spec.image_size as u32;
        let resized;
        let img = if img.dimensions() == (size, size) {
            img
        } else {
            resized = img.resize_exact(size, size, FilterType::Triangle);
            &resized
        };

        let mut out = Vec::with_capacity(self.spec.numel());
        match self.spec.num_channels {
            1 => {
                let gray = img.to_luma8();
                out.extend(gray.pixels().map(|p| normalize(p[0])));
            }
            _ => {
                let rgb = img.to_rgb8();
                for c in 0..3 {
                    out.extend(rgb.pixels().map(|p| normalize(p[c])));
                }
            }
        }
        out
    }
}

fn normalize(value: u8) -> f32 {
    (value as f32 / 255.0 - MEAN) / STD
}
