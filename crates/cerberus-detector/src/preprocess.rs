//! Image preprocessing driven by `preprocessor_config.json`

use crate::classifier::FeatureExtractor;
use candle_core::{Device, Tensor};
use cerberus_core::Result;
use image::imageops::FilterType;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Target size as written by image processors: either a square edge
/// or explicit height/width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageSize {
    Square(u32),
    HeightWidth { height: u32, width: u32 },
    ShortestEdge { shortest_edge: u32 },
}

impl ImageSize {
    /// (height, width) in pixels
    pub fn dims(&self) -> (u32, u32) {
        match *self {
            Self::Square(edge) => (edge, edge),
            Self::HeightWidth { height, width } => (height, width),
            Self::ShortestEdge { shortest_edge } => (shortest_edge, shortest_edge),
        }
    }
}

/// Preprocessing parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessorConfig {
    #[serde(default = "default_true")]
    pub do_resize: bool,

    #[serde(default = "default_size")]
    pub size: ImageSize,

    /// PIL resampling filter id (0 nearest, 1 lanczos, 2 bilinear, 3 bicubic)
    #[serde(default = "default_resample")]
    pub resample: u8,

    #[serde(default = "default_true")]
    pub do_rescale: bool,

    #[serde(default = "default_rescale_factor")]
    pub rescale_factor: f32,

    #[serde(default = "default_true")]
    pub do_normalize: bool,

    #[serde(default = "default_image_mean")]
    pub image_mean: [f32; 3],

    #[serde(default = "default_image_std")]
    pub image_std: [f32; 3],
}

fn default_true() -> bool {
    true
}

fn default_size() -> ImageSize {
    ImageSize::HeightWidth {
        height: 224,
        width: 224,
    }
}

fn default_resample() -> u8 {
    2
}

fn default_rescale_factor() -> f32 {
    1.0 / 255.0
}

fn default_image_mean() -> [f32; 3] {
    [0.5, 0.5, 0.5]
}

fn default_image_std() -> [f32; 3] {
    [0.5, 0.5, 0.5]
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self {
            do_resize: default_true(),
            size: default_size(),
            resample: default_resample(),
            do_rescale: default_true(),
            rescale_factor: default_rescale_factor(),
            do_normalize: default_true(),
            image_mean: default_image_mean(),
            image_std: default_image_std(),
        }
    }
}

impl PreprocessorConfig {
    fn filter(&self) -> FilterType {
        match self.resample {
            0 => FilterType::Nearest,
            1 => FilterType::Lanczos3,
            3 => FilterType::CatmullRom,
            _ => FilterType::Triangle,
        }
    }
}

/// Resize, rescale and normalize an RGB image into a CHW tensor
#[derive(Debug, Clone, Default)]
pub struct ImageProcessor {
    config: PreprocessorConfig,
}

impl ImageProcessor {
    pub fn new(config: PreprocessorConfig) -> Self {
        Self { config }
    }

    /// Load from a `preprocessor_config.json` file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| cerberus_core::Error::io_at(path, e))?;
        let config: PreprocessorConfig = serde_json::from_str(&contents).map_err(|e| {
            tracing::warn!("Failed to parse preprocessor config {}: {}", path.display(), e);
            cerberus_core::Error::from(e)
        })?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &PreprocessorConfig {
        &self.config
    }

    fn pixel_values(&self, image: &DynamicImage) -> (Vec<f32>, usize, usize) {
        let rgb = if self.config.do_resize {
            let (height, width) = self.config.size.dims();
            image
                .resize_exact(width, height, self.config.filter())
                .to_rgb8()
        } else {
            image.to_rgb8()
        };

        let (width, height) = rgb.dimensions();
        let (width, height) = (width as usize, height as usize);
        let plane = width * height;
        let mut data = vec![0f32; 3 * plane];

        for (i, pixel) in rgb.pixels().enumerate() {
            for c in 0..3 {
                let mut value = pixel[c] as f32;
                if self.config.do_rescale {
                    value *= self.config.rescale_factor;
                }
                if self.config.do_normalize {
                    value = (value - self.config.image_mean[c]) / self.config.image_std[c];
                }
                // CHW layout
                data[c * plane + i] = value;
            }
        }

        (data, height, width)
    }
}

impl FeatureExtractor for ImageProcessor {
    fn transform(&self, image: &DynamicImage, device: &Device) -> Result<Tensor> {
        if image.width() == 0 || image.height() == 0 {
            return Err(cerberus_core::Error::image("image has zero width or height"));
        }

        let (data, height, width) = self.pixel_values(image);
        Tensor::from_vec(data, (1, 3, height, width), device).map_err(|e| {
            cerberus_core::Error::image(format!("Failed to create input tensor: {}", e))
        })
    }
}
