//! NSFW image detector with an explicit load/classify/unload lifecycle
//!
//! A [`Detector`] starts unloaded. `load()` resolves artifacts from the local
//! cache, picks a device, and builds the feature extractor and classifier.
//! `classify()` runs one image through the model, and `unload()` drops every
//! model resource and reclaims accelerator memory.

use crate::artifacts::{ArtifactError, ArtifactStore, HubArtifactStore};
use crate::classifier::{ClassificationResult, FeatureExtractor, ImageClassifier};
use crate::config::{ClassifyOptions, DetectorConfig};
use crate::device::{CandleCompute, ComputeBackend, DeviceType};
use crate::model_loader::{ModelBackend, VitBackend};
use crate::postprocess;
use candle_core::Device;
use cerberus_core::{Error, Result};
use image::DynamicImage;
use std::path::Path;
use std::time::Instant;

/// Model resources held while the detector is ready
struct LoadedModel {
    extractor: Box<dyn FeatureExtractor>,
    classifier: Box<dyn ImageClassifier>,
    device: Device,
    device_type: DeviceType,
}

impl LoadedModel {
    /// Run inference and post-processing.
    ///
    /// Every tensor created here is owned by this frame and dropped before
    /// it returns, whether or not an error occurred.
    fn infer(&self, image: &DynamicImage, options: &ClassifyOptions) -> Result<ClassificationResult> {
        let probs = {
            let input = self.extractor.transform(image, &self.device)?;
            let logits = self.classifier.forward(&input)?;
            postprocess::probabilities(&logits)?
        };

        let top_k = postprocess::validate_top_k(options.top_k, probs.len())?;
        let indices = postprocess::rank(&probs, top_k);
        let results = postprocess::build_results(&probs, &indices, self.classifier.labels());

        let scores = if options.sort {
            postprocess::order_by_priority(results)
        } else {
            results
        };

        Ok(ClassificationResult::new(scores))
    }
}

enum DetectorState {
    Unloaded,
    Ready(LoadedModel),
}

/// Lazily-loaded NSFW image classifier.
///
/// Not safe for concurrent classification: the detector is `Send` but not
/// `Sync`. Share it behind a `Mutex` or give each thread its own instance.
pub struct Detector {
    config: DetectorConfig,
    store: Box<dyn ArtifactStore>,
    backend: Box<dyn ModelBackend>,
    compute: Box<dyn ComputeBackend>,
    state: DetectorState,
}

impl Detector {
    /// Create an unloaded detector backed by the Hugging Face cache, the ViT
    /// backend and Candle devices
    pub fn new(config: DetectorConfig) -> Self {
        Self::with_components(
            config,
            Box::new(HubArtifactStore::new()),
            Box::new(VitBackend),
            Box::new(CandleCompute),
        )
    }

    /// Create an unloaded detector with explicit collaborators
    pub fn with_components(
        config: DetectorConfig,
        store: Box<dyn ArtifactStore>,
        backend: Box<dyn ModelBackend>,
        compute: Box<dyn ComputeBackend>,
    ) -> Self {
        Self {
            config,
            store,
            backend,
            compute,
            state: DetectorState::Unloaded,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn model_id(&self) -> &str {
        &self.config.model_id
    }

    pub fn cache_location(&self) -> &Path {
        &self.config.cache_dir
    }

    /// Whether `load()` has completed and `unload()` has not been called since
    pub fn is_loaded(&self) -> bool {
        matches!(self.state, DetectorState::Ready(_))
    }

    /// Active device, if loaded
    pub fn device(&self) -> Option<DeviceType> {
        match &self.state {
            DetectorState::Ready(model) => Some(model.device_type),
            DetectorState::Unloaded => None,
        }
    }

    /// Label taxonomy of the loaded classifier
    pub fn labels(&self) -> Option<&[String]> {
        match &self.state {
            DetectorState::Ready(model) => Some(model.classifier.labels()),
            DetectorState::Unloaded => None,
        }
    }

    /// Check whether the model artifacts are present in the local cache.
    ///
    /// Only absence maps to `false`; unreadable or inconsistent caches are
    /// reported as `Error::Artifact`.
    pub fn is_downloaded(&self) -> Result<bool> {
        match self
            .store
            .resolve_local(&self.config.model_id, &self.config.cache_dir)
        {
            Ok(_) => Ok(true),
            Err(ArtifactError::NotFound(_)) => Ok(false),
            Err(e) => Err(Error::artifact(e.to_string())),
        }
    }

    /// Download the model artifacts into the cache directory
    pub fn download(&self) -> Result<()> {
        self.store
            .fetch(&self.config.model_id, &self.config.cache_dir)
            .map_err(|e| Error::fetch(format!("{}: {}", self.config.model_id, e)))?;
        Ok(())
    }

    /// Load the model from the local cache onto the preferred device.
    ///
    /// Never touches the network. Reloads fully when already loaded; on
    /// failure the previous state is kept.
    pub fn load(&mut self) -> Result<&mut Self> {
        let start = Instant::now();
        tracing::info!(
            "Loading model '{}' from {}",
            self.config.model_id,
            self.config.cache_dir.display()
        );

        let artifacts = match self
            .store
            .resolve_local(&self.config.model_id, &self.config.cache_dir)
        {
            Ok(artifacts) => artifacts,
            Err(ArtifactError::NotFound(what)) => {
                return Err(Error::resource_unavailable(format!(
                    "{} is not in {}; call download() first",
                    what,
                    self.config.cache_dir.display()
                )));
            }
            Err(e) => return Err(Error::artifact(e.to_string())),
        };

        let device_type = self
            .config
            .device
            .resolve(self.config.device_index, self.compute.as_ref());
        let device = self.compute.create_device(device_type)?;

        let extractor = self.backend.load_extractor(&artifacts)?;
        let classifier = self.backend.load_classifier(&artifacts, &device)?;

        let previous = std::mem::replace(
            &mut self.state,
            DetectorState::Ready(LoadedModel {
                extractor,
                classifier,
                device,
                device_type,
            }),
        );
        drop(previous);

        metrics::counter!("cerberus_model_loads_total").increment(1);
        tracing::info!(
            "Model '{}' ready on {} in {}ms",
            self.config.model_id,
            device_type,
            start.elapsed().as_millis()
        );

        Ok(self)
    }

    /// Classify an image.
    ///
    /// Fails with `Error::NotLoaded` before `load()` and with
    /// `Error::InvalidArgument` when `top_k` is outside `1..=num_labels`.
    /// With `release_device_cache_after` on an accelerator, cached device
    /// memory is released after the intermediates are dropped; this affects
    /// every detector on that device.
    pub fn classify(
        &self,
        image: &DynamicImage,
        options: &ClassifyOptions,
    ) -> Result<ClassificationResult> {
        let model = match &self.state {
            DetectorState::Ready(model) => model,
            DetectorState::Unloaded => return Err(Error::NotLoaded),
        };

        let start = Instant::now();
        let outcome = model.infer(image, options);

        let released = if options.release_device_cache_after && model.device_type.is_accelerator()
        {
            self.compute.release_cached_memory(&model.device)
        } else {
            Ok(())
        };

        let mut result = outcome?;
        released?;

        result.latency_us = start.elapsed().as_micros() as u64;
        metrics::counter!("cerberus_classifications_total").increment(1);
        metrics::histogram!("cerberus_classify_latency_us").record(result.latency_us as f64);
        tracing::debug!(
            "Classified image in {}us: {:?}",
            result.latency_us,
            result.first()
        );

        Ok(result)
    }

    /// Classify using the options from the configuration
    pub fn classify_with_defaults(&self, image: &DynamicImage) -> Result<ClassificationResult> {
        let options = self.config.defaults;
        self.classify(image, &options)
    }

    /// Decode an image file and classify it
    pub fn classify_path(
        &self,
        path: impl AsRef<Path>,
        options: &ClassifyOptions,
    ) -> Result<ClassificationResult> {
        if !self.is_loaded() {
            return Err(Error::NotLoaded);
        }

        let path = path.as_ref();
        let image = image::open(path).map_err(|e| {
            Error::image(format!("Failed to open image {}: {}", path.display(), e))
        })?;
        self.classify(&image, options)
    }

    /// Drop the model and reclaim its memory. No-op when already unloaded.
    ///
    /// When an accelerator was in use its cached memory is released and
    /// shared handles are collected; this is device-wide.
    pub fn unload(&mut self) {
        let model = match std::mem::replace(&mut self.state, DetectorState::Unloaded) {
            DetectorState::Ready(model) => model,
            DetectorState::Unloaded => return,
        };

        let LoadedModel {
            extractor,
            classifier,
            device,
            device_type,
        } = model;
        drop(classifier);
        drop(extractor);

        if device_type.is_accelerator() {
            if let Err(e) = self.compute.release_cached_memory(&device) {
                tracing::warn!("Failed to release cached memory on {}: {}", device_type, e);
            }
            if let Err(e) = self.compute.collect_shared_handles(&device) {
                tracing::warn!("Failed to collect shared handles on {}: {}", device_type, e);
            }
        }
        drop(device);

        metrics::counter!("cerberus_model_unloads_total").increment(1);
        tracing::info!("Unloaded model '{}' from {}", self.config.model_id, device_type);
    }
}

impl Drop for Detector {
    fn drop(&mut self) {
        self.unload();
    }
}

impl std::fmt::Debug for Detector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detector")
            .field("model_id", &self.config.model_id)
            .field("cache_dir", &self.config.cache_dir)
            .field("device", &self.device())
            .finish()
    }
}
