//! Cerberus Detector
//!
//! NSFW-risk image classification with a pretrained vision model and an
//! explicit resource lifecycle:
//!
//! - `is_downloaded()` / `download()` manage artifacts in a local Hugging Face cache
//! - `load()` builds the model from the cache only, preferring an accelerator over CPU
//! - `classify()` runs one image and returns label probabilities
//! - `unload()` drops the model and reclaims device memory
//!
//! ```no_run
//! use cerberus_detector::prelude::*;
//!
//! # fn main() -> cerberus_core::Result<()> {
//! let mut detector = Detector::new(DetectorConfig::new("./models/hf"));
//! if !detector.is_downloaded()? {
//!     detector.download()?;
//! }
//!
//! let result = detector
//!     .load()?
//!     .classify_path("photo.jpg", &ClassifyOptions::new().with_top_k(2))?;
//! for score in &result {
//!     println!("{}: {:.3}", score.label, score.score);
//! }
//! detector.unload();
//! # Ok(())
//! # }
//! ```

pub mod artifacts;
pub mod classifier;
pub mod config;
pub mod detector;
pub mod device;
pub mod model_loader;
pub mod postprocess;
pub mod preprocess;

pub use artifacts::{ArtifactError, ArtifactStore, HubArtifactStore, ModelArtifacts};
pub use classifier::{ClassificationResult, FeatureExtractor, ImageClassifier, LabelScore};
pub use config::{ClassifyOptions, DetectorConfig, DEFAULT_MODEL_ID};
pub use detector::Detector;
pub use device::{CandleCompute, ComputeBackend, DeviceSpec, DeviceType};
pub use model_loader::{ModelBackend, VitBackend, VitClassifier};
pub use postprocess::LABEL_PRIORITY;
pub use preprocess::{ImageProcessor, ImageSize, PreprocessorConfig};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classifier::{ClassificationResult, LabelScore};
    pub use crate::config::{ClassifyOptions, DetectorConfig};
    pub use crate::detector::Detector;
    pub use crate::device::{DeviceSpec, DeviceType};
}
