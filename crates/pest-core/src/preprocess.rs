//! Image decoding and normalization
//!
//! Turns uploaded bytes into the `1x3xHxW` tensor the classifier was trained on:
//! decode to RGB, resize to the fixed target size, scale to [0, 1] and apply the
//! per-channel mean/std normalization. The constants come from the model
//! manifest so they always travel with the artifact they belong to.

use crate::error::{PestError, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tract_onnx::prelude::tract_ndarray::Array4;

/// Target height and width of the reference classifier
pub const TARGET_SIZE: u32 = 300;

/// ImageNet normalization mean values (RGB)
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet normalization std values (RGB)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Interpolation used when resizing to the target size
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    Nearest,
    /// Bilinear, widened on downscale like PIL's antialiased resize
    #[default]
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Preprocessing constants bound to a model artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessConfig {
    pub height: u32,
    pub width: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
    #[serde(default)]
    pub resize_filter: ResizeFilter,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self::reference()
    }
}

impl PreprocessConfig {
    /// Constants used when the reference classifier was trained
    pub fn reference() -> Self {
        Self {
            height: TARGET_SIZE,
            width: TARGET_SIZE,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
            resize_filter: ResizeFilter::Triangle,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.height == 0 || self.width == 0 {
            return Err(PestError::Config(format!(
                "target size {}x{} must be non-zero",
                self.height, self.width
            )));
        }
        if self.mean.iter().any(|m| !m.is_finite()) {
            return Err(PestError::Config("normalization mean must be finite".to_string()));
        }
        if self.std.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(PestError::Config(
                "normalization std must be finite and positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Batch-of-one NCHW shape produced by the preprocessor
    pub fn input_shape(&self) -> [usize; 4] {
        [1, 3, self.height as usize, self.width as usize]
    }
}

/// Normalized single-image batch in NCHW layout
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Array4<f32>,
}

impl ImageTensor {
    pub fn from_array(data: Array4<f32>) -> Self {
        Self { data }
    }

    pub fn shape(&self) -> [usize; 4] {
        let s = self.data.shape();
        [s[0], s[1], s[2], s[3]]
    }

    pub fn as_array(&self) -> &Array4<f32> {
        &self.data
    }
}

/// Decodes and normalizes images for the classifier
#[derive(Debug, Clone)]
pub struct Preprocessor {
    config: PreprocessConfig,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Decode arbitrary image bytes into an 8-bit RGB image
    pub fn decode(&self, bytes: &[u8]) -> Result<RgbImage> {
        if bytes.is_empty() {
            return Err(PestError::NoInput);
        }
        let image = image::load_from_memory(bytes)?;
        Ok(image.to_rgb8())
    }

    /// Resize to the target size and apply mean/std normalization
    pub fn normalize(&self, image: &RgbImage) -> ImageTensor {
        let PreprocessConfig {
            height,
            width,
            mean,
            std,
            resize_filter,
        } = self.config;

        let resized = if image.dimensions() == (width, height) {
            image.clone()
        } else {
            imageops::resize(image, width, height, resize_filter.into())
        };

        let data = Array4::from_shape_fn(
            (1, 3, height as usize, width as usize),
            |(_, c, y, x)| {
                let value = resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0;
                (value - mean[c]) / std[c]
            },
        );

        ImageTensor::from_array(data)
    }

    /// Decode then normalize
    pub fn prepare(&self, bytes: &[u8]) -> Result<ImageTensor> {
        let image = self.decode(bytes)?;
        Ok(self.normalize(&image))
    }
}
