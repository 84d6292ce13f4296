//! Mock collaborators for testing
//!
//! Configurable implementations of the artifact store, model backend and
//! compute backend so the detector lifecycle can be exercised without
//! model weights or an accelerator.

#![allow(dead_code)]

use candle_core::{DType, Device, DeviceLocation, Tensor};
use cerberus_core::Result;
use cerberus_detector::{
    ArtifactError, ArtifactStore, ComputeBackend, DeviceType, FeatureExtractor, ImageClassifier,
    ModelArtifacts, ModelBackend,
};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("cerberus=debug")
        .with_test_writer()
        .try_init();
}

pub fn test_image() -> DynamicImage {
    DynamicImage::new_rgb8(16, 16)
}

pub fn labels(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Logits whose softmax is exactly `probs`
pub fn logits_for(probs: &[f64]) -> Vec<f32> {
    probs.iter().map(|p| p.ln() as f32).collect()
}

/// What the mock store returns from `resolve_local`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Present,
    Missing,
    Unreadable,
}

/// Artifact store with a switchable cache state
pub struct MockStore {
    state: Arc<Mutex<CacheState>>,
    fetch_fails: bool,
    fetch_count: Arc<AtomicU32>,
}

impl MockStore {
    pub fn new(state: CacheState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            fetch_fails: false,
            fetch_count: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Make `fetch` fail as if offline
    pub fn offline(mut self) -> Self {
        self.fetch_fails = true;
        self
    }

    pub fn state_handle(&self) -> Arc<Mutex<CacheState>> {
        Arc::clone(&self.state)
    }

    pub fn fetch_counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.fetch_count)
    }

    fn artifacts(model_id: &str, cache_dir: &Path) -> ModelArtifacts {
        let root = cache_dir.join("snapshot");
        ModelArtifacts {
            model_id: model_id.to_string(),
            config: root.join("config.json"),
            preprocessor_config: Some(root.join("preprocessor_config.json")),
            weights: root.join("model.safetensors"),
        }
    }
}

impl ArtifactStore for MockStore {
    fn resolve_local(
        &self,
        model_id: &str,
        cache_dir: &Path,
    ) -> std::result::Result<ModelArtifacts, ArtifactError> {
        match *self.state.lock().unwrap() {
            CacheState::Present => Ok(Self::artifacts(model_id, cache_dir)),
            CacheState::Missing => Err(ArtifactError::NotFound(model_id.to_string())),
            CacheState::Unreadable => Err(ArtifactError::Io {
                path: PathBuf::from(cache_dir),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            }),
        }
    }

    fn fetch(
        &self,
        model_id: &str,
        cache_dir: &Path,
    ) -> std::result::Result<ModelArtifacts, ArtifactError> {
        self.fetch_count.fetch_add(1, Ordering::Relaxed);
        if self.fetch_fails {
            return Err(ArtifactError::Hub("network unreachable".to_string()));
        }
        *self.state.lock().unwrap() = CacheState::Present;
        Ok(Self::artifacts(model_id, cache_dir))
    }
}

/// Extractor producing a fixed-size zero tensor
pub struct MockExtractor;

impl FeatureExtractor for MockExtractor {
    fn transform(&self, _image: &DynamicImage, device: &Device) -> Result<Tensor> {
        Tensor::zeros((1, 3, 4, 4), DType::F32, device)
            .map_err(|e| cerberus_core::Error::image(e.to_string()))
    }
}

/// Classifier returning fixed logits
pub struct MockClassifier {
    logits: Vec<f32>,
    labels: Vec<String>,
    forward_count: Arc<AtomicU32>,
}

impl ImageClassifier for MockClassifier {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        self.forward_count.fetch_add(1, Ordering::Relaxed);
        Tensor::new(self.logits.as_slice(), input.device())
            .and_then(|t| t.unsqueeze(0))
            .map_err(|e| cerberus_core::Error::model(e.to_string()))
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }
}

/// Model backend handing out mock extractors and classifiers
pub struct MockBackend {
    logits: Arc<Mutex<Vec<f32>>>,
    labels: Vec<String>,
    fail_loads: Arc<AtomicBool>,
    load_count: Arc<AtomicU32>,
    forward_count: Arc<AtomicU32>,
    devices: Arc<Mutex<Vec<DeviceLocation>>>,
}

impl MockBackend {
    pub fn new(labels: Vec<String>, logits: Vec<f32>) -> Self {
        Self {
            logits: Arc::new(Mutex::new(logits)),
            labels,
            fail_loads: Arc::new(AtomicBool::new(false)),
            load_count: Arc::new(AtomicU32::new(0)),
            forward_count: Arc::new(AtomicU32::new(0)),
            devices: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Risk taxonomy with the given probabilities in label order
    pub fn risk_tiers(probs: &[f64]) -> Self {
        Self::new(
            labels(&["neutral", "low", "medium", "high"]),
            logits_for(probs),
        )
    }

    pub fn logits_handle(&self) -> Arc<Mutex<Vec<f32>>> {
        Arc::clone(&self.logits)
    }

    pub fn fail_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.fail_loads)
    }

    pub fn load_counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.load_count)
    }

    pub fn forward_counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.forward_count)
    }

    /// Devices handed to `load_classifier`, in call order
    pub fn device_handle(&self) -> Arc<Mutex<Vec<DeviceLocation>>> {
        Arc::clone(&self.devices)
    }
}

impl ModelBackend for MockBackend {
    fn load_extractor(&self, _artifacts: &ModelArtifacts) -> Result<Box<dyn FeatureExtractor>> {
        if self.fail_loads.load(Ordering::Relaxed) {
            return Err(cerberus_core::Error::model("corrupt preprocessor config"));
        }
        Ok(Box::new(MockExtractor))
    }

    fn load_classifier(
        &self,
        _artifacts: &ModelArtifacts,
        device: &Device,
    ) -> Result<Box<dyn ImageClassifier>> {
        if self.fail_loads.load(Ordering::Relaxed) {
            return Err(cerberus_core::Error::model("corrupt weights"));
        }
        self.devices.lock().unwrap().push(device.location());
        self.load_count.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MockClassifier {
            logits: self.logits.lock().unwrap().clone(),
            labels: self.labels.clone(),
            forward_count: Arc::clone(&self.forward_count),
        }))
    }
}

/// Compute backend that pretends an accelerator exists but runs on CPU
pub struct MockCompute {
    accelerator: Option<DeviceType>,
    release_count: Arc<AtomicU32>,
    collect_count: Arc<AtomicU32>,
    created: Arc<Mutex<Vec<DeviceType>>>,
}

impl MockCompute {
    pub fn cpu_only() -> Self {
        Self::with_accelerator(None)
    }

    pub fn with_gpu() -> Self {
        Self::with_accelerator(Some(DeviceType::Cuda(0)))
    }

    fn with_accelerator(accelerator: Option<DeviceType>) -> Self {
        Self {
            accelerator,
            release_count: Arc::new(AtomicU32::new(0)),
            collect_count: Arc::new(AtomicU32::new(0)),
            created: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn release_counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.release_count)
    }

    pub fn collect_counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.collect_count)
    }

    /// Device types requested from `create_device`, in call order
    pub fn created_handle(&self) -> Arc<Mutex<Vec<DeviceType>>> {
        Arc::clone(&self.created)
    }
}

impl ComputeBackend for MockCompute {
    fn probe_accelerator(&self, _index: usize) -> Option<DeviceType> {
        self.accelerator
    }

    fn create_device(&self, device_type: DeviceType) -> Result<Device> {
        self.created.lock().unwrap().push(device_type);
        Ok(Device::Cpu)
    }

    fn release_cached_memory(&self, _device: &Device) -> Result<()> {
        self.release_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn collect_shared_handles(&self, _device: &Device) -> Result<()> {
        self.collect_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
