//! Model loading for Candle-based image classifiers

use crate::artifacts::ModelArtifacts;
use crate::classifier::{FeatureExtractor, ImageClassifier};
use crate::preprocess::ImageProcessor;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::vit;
use cerberus_core::Result;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path;

/// Builds the feature extractor and classifier from resolved artifacts
pub trait ModelBackend: Send {
    /// Load the feature extractor
    fn load_extractor(&self, artifacts: &ModelArtifacts) -> Result<Box<dyn FeatureExtractor>>;

    /// Load the classifier with its weights placed on `device`
    fn load_classifier(
        &self,
        artifacts: &ModelArtifacts,
        device: &Device,
    ) -> Result<Box<dyn ImageClassifier>>;
}

/// Vision Transformer (`ViTForImageClassification`) backend
#[derive(Debug, Clone, Copy, Default)]
pub struct VitBackend;

impl ModelBackend for VitBackend {
    fn load_extractor(&self, artifacts: &ModelArtifacts) -> Result<Box<dyn FeatureExtractor>> {
        let processor = match &artifacts.preprocessor_config {
            Some(path) => ImageProcessor::from_file(path)?,
            None => {
                tracing::debug!(
                    "No preprocessor config for '{}', using ViT defaults",
                    artifacts.model_id
                );
                ImageProcessor::default()
            }
        };
        Ok(Box::new(processor))
    }

    fn load_classifier(
        &self,
        artifacts: &ModelArtifacts,
        device: &Device,
    ) -> Result<Box<dyn ImageClassifier>> {
        Ok(Box::new(VitClassifier::load(artifacts, device)?))
    }
}

/// ViT image classifier with its label taxonomy
pub struct VitClassifier {
    model: vit::Model,
    labels: Vec<String>,
}

impl VitClassifier {
    /// Load config, labels and weights.
    ///
    /// Fails with `Error::Model` when `config.json` describes another
    /// architecture. Weights are memory-mapped as constants; the model has no
    /// trainable variables and runs without dropout.
    pub fn load(artifacts: &ModelArtifacts, device: &Device) -> Result<Self> {
        let architecture: ArchitectureConfig = parse_json_config(&artifacts.config)?;
        architecture.ensure_vit(&artifacts.model_id)?;

        let vit_config: vit::Config = parse_json_config(&artifacts.config)?;
        let label_config: LabelConfig = parse_json_config(&artifacts.config)?;
        let labels = label_config.labels()?;

        let vb = load_var_builder(&artifacts.weights, device)?;
        let model = vit::Model::new(&vit_config, labels.len(), vb).map_err(|e| {
            cerberus_core::Error::model(format!("Failed to load ViT model: {}", e))
        })?;

        tracing::info!(
            "Loaded ViT classifier '{}' with {} labels: {:?}",
            artifacts.model_id,
            labels.len(),
            labels
        );

        Ok(Self { model, labels })
    }
}

impl ImageClassifier for VitClassifier {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        self.model.forward(input).map_err(|e| {
            cerberus_core::Error::model(format!("Model forward pass failed: {}", e))
        })
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }
}

/// Architecture fields of a Hugging Face `config.json`
#[derive(Debug, Clone, Default, serde::Deserialize)]
struct ArchitectureConfig {
    #[serde(default)]
    model_type: Option<String>,

    #[serde(default)]
    architectures: Vec<String>,
}

impl ArchitectureConfig {
    fn ensure_vit(&self, model_id: &str) -> Result<()> {
        let type_ok = self.model_type.as_deref().map_or(true, |t| t == "vit");
        let arch_ok = self.architectures.is_empty()
            || self.architectures.iter().any(|a| a.starts_with("ViT"));

        if type_ok && arch_ok {
            return Ok(());
        }

        let found = self
            .model_type
            .clone()
            .or_else(|| self.architectures.first().cloned())
            .unwrap_or_default();
        Err(cerberus_core::Error::model(format!(
            "unsupported architecture '{}' for {}: only ViT image classifiers can be loaded",
            found, model_id
        )))
    }
}

/// Label fields of a Hugging Face `config.json`
#[derive(Debug, Clone, Default, serde::Deserialize)]
struct LabelConfig {
    #[serde(default)]
    id2label: HashMap<String, String>,

    #[serde(default)]
    num_labels: Option<usize>,
}

impl LabelConfig {
    /// Labels ordered by output index
    fn labels(&self) -> Result<Vec<String>> {
        let mut indexed = Vec::with_capacity(self.id2label.len());
        for (idx, label) in &self.id2label {
            let idx: usize = idx.parse().map_err(|_| {
                cerberus_core::Error::model(format!("Invalid id2label index '{}'", idx))
            })?;
            indexed.push((idx, label.clone()));
        }
        indexed.sort_by_key(|(idx, _)| *idx);

        let num_labels = self
            .num_labels
            .unwrap_or(0)
            .max(indexed.last().map(|(idx, _)| idx + 1).unwrap_or(0));

        if num_labels == 0 {
            return Err(cerberus_core::Error::model(
                "Model config declares no labels (missing id2label)",
            ));
        }

        Ok(normalized_labels(num_labels, &indexed))
    }
}

/// Fill gaps in the taxonomy with `LABEL_{idx}` placeholders
fn normalized_labels(num_labels: usize, indexed: &[(usize, String)]) -> Vec<String> {
    let mut resolved: Vec<String> = (0..num_labels).map(|idx| format!("LABEL_{}", idx)).collect();
    for (idx, label) in indexed {
        if let Some(slot) = resolved.get_mut(*idx) {
            *slot = label.clone();
        }
    }
    resolved
}

fn parse_json_config<T: DeserializeOwned>(config_path: &Path) -> Result<T> {
    let config_str = std::fs::read_to_string(config_path)
        .map_err(|e| cerberus_core::Error::io_at(config_path, e))?;

    serde_json::from_str(&config_str).map_err(|e| {
        tracing::warn!("Failed to parse config {}: {}", config_path.display(), e);
        cerberus_core::Error::from(e)
    })
}

fn load_var_builder(weights_path: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    if !weights_path.exists() {
        return Err(cerberus_core::Error::model(format!(
            "{} not found",
            weights_path.display()
        )));
    }

    let vb = unsafe {
        VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, device).map_err(|e| {
            cerberus_core::Error::model(format!("Failed to load weights: {}", e))
        })?
    };

    Ok(vb)
}
