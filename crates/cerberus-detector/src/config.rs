//! Configuration for the detector and per-call classification options

use crate::device::DeviceSpec;
use cerberus_core::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Hugging Face repository of the default NSFW classifier.
///
/// Must be a ViT checkpoint (`ViTForImageClassification`); other
/// architectures are rejected at load time.
pub const DEFAULT_MODEL_ID: &str = "Falconsai/nsfw_image_detection";

/// Detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Hugging Face model repository
    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// Local artifact cache directory
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Device preference (auto, cpu, cuda, metal)
    #[serde(default)]
    pub device: DeviceSpec,

    /// Accelerator ordinal
    #[serde(default)]
    pub device_index: usize,

    /// Options used by `classify_with_defaults`
    #[serde(default)]
    pub defaults: ClassifyOptions,
}

fn default_model_id() -> String {
    DEFAULT_MODEL_ID.to_string()
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./models/hf")
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            cache_dir: default_cache_dir(),
            device: DeviceSpec::default(),
            device_index: 0,
            defaults: ClassifyOptions::default(),
        }
    }
}

impl DetectorConfig {
    /// Create a configuration rooted at `cache_dir`
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Default::default()
        }
    }

    /// Set the model repository
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// Set device preference
    pub fn with_device(mut self, device: DeviceSpec) -> Self {
        self.device = device;
        self
    }

    /// Set accelerator ordinal
    pub fn with_device_index(mut self, index: usize) -> Self {
        self.device_index = index;
        self
    }

    /// Set default classification options
    pub fn with_defaults(mut self, defaults: ClassifyOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Parse configuration from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: DetectorConfig = serde_yaml::from_str(yaml).map_err(|e| {
            cerberus_core::Error::config(format!("Failed to parse detector config: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| cerberus_core::Error::io_at(path, e))?;
        Self::from_yaml(&contents)
    }

    fn validate(&self) -> Result<()> {
        if self.model_id.trim().is_empty() {
            return Err(cerberus_core::Error::config("model_id must not be empty"));
        }
        if let Some(k) = self.defaults.top_k {
            if k < 1 {
                return Err(cerberus_core::Error::config(format!(
                    "defaults.top_k must be positive, got {}",
                    k
                )));
            }
        }
        Ok(())
    }
}

/// Options for a single `classify` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClassifyOptions {
    /// Return only the `top_k` best labels (must be in `1..=num_labels`)
    #[serde(default)]
    pub top_k: Option<i64>,

    /// Reorder by label priority (`high`, `medium`, `low`, `neutral`)
    #[serde(default)]
    pub sort: bool,

    /// Release cached accelerator memory after inference.
    /// Affects every user of the device.
    #[serde(default)]
    pub release_device_cache_after: bool,
}

impl ClassifyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit results to the `k` highest scores
    pub fn with_top_k(mut self, k: i64) -> Self {
        self.top_k = Some(k);
        self
    }

    /// Order results by label priority
    pub fn sorted(mut self) -> Self {
        self.sort = true;
        self
    }

    /// Set priority ordering explicitly
    pub fn with_sort(mut self, sort: bool) -> Self {
        self.sort = sort;
        self
    }

    /// Release accelerator cache after the call
    pub fn release_device_cache(mut self, enable: bool) -> Self {
        self.release_device_cache_after = enable;
        self
    }
}
