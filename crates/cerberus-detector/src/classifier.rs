//! Classifier capabilities and result types

use candle_core::{Device, Tensor};
use cerberus_core::Result;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Converts raw image data into the tensor layout a classifier expects.
pub trait FeatureExtractor: Send {
    /// Transform `image` into a `(1, C, H, W)` input tensor placed on `device`
    fn transform(&self, image: &DynamicImage, device: &Device) -> Result<Tensor>;
}

/// Maps input tensors to raw per-label scores.
///
/// Implementations are inference-only: weights are immutable constants and
/// no training-time layers (dropout) are active.
pub trait ImageClassifier: Send {
    /// Run a single forward pass, returning logits of shape `(1, num_labels)`
    fn forward(&self, input: &Tensor) -> Result<Tensor>;

    /// Label names ordered by output index
    fn labels(&self) -> &[String];

    /// Number of output labels
    fn num_labels(&self) -> usize {
        self.labels().len()
    }
}

/// A single label with its probability.
///
/// Serializes as a `[label, score]` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(String, f64)", into = "(String, f64)")]
pub struct LabelScore {
    /// Label name from the model's taxonomy
    pub label: String,

    /// Probability (0.0-1.0)
    pub score: f64,
}

impl LabelScore {
    /// Create a new label score
    pub fn new(label: impl Into<String>, score: f64) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

impl From<(String, f64)> for LabelScore {
    fn from((label, score): (String, f64)) -> Self {
        Self { label, score }
    }
}

impl From<LabelScore> for (String, f64) {
    fn from(score: LabelScore) -> Self {
        (score.label, score.score)
    }
}

/// Result of classifying one image.
///
/// Serializes as the ordered list of `[label, score]` pairs; latency is not
/// part of the serialized form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassificationResult {
    /// Ordered label scores
    pub scores: Vec<LabelScore>,

    /// Latency in microseconds
    #[serde(skip)]
    pub latency_us: u64,
}

impl ClassificationResult {
    /// Create a new classification result
    pub fn new(scores: Vec<LabelScore>) -> Self {
        Self {
            scores,
            latency_us: 0,
        }
    }

    /// First entry in result order
    pub fn first(&self) -> Option<&LabelScore> {
        self.scores.first()
    }

    /// Look up the score for a label
    pub fn score_of(&self, label: &str) -> Option<f64> {
        self.scores
            .iter()
            .find(|s| s.label == label)
            .map(|s| s.score)
    }

    /// Labels in result order
    pub fn labels(&self) -> Vec<&str> {
        self.scores.iter().map(|s| s.label.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LabelScore> {
        self.scores.iter()
    }
}

impl IntoIterator for ClassificationResult {
    type Item = LabelScore;
    type IntoIter = std::vec::IntoIter<LabelScore>;

    fn into_iter(self) -> Self::IntoIter {
        self.scores.into_iter()
    }
}

impl<'a> IntoIterator for &'a ClassificationResult {
    type Item = &'a LabelScore;
    type IntoIter = std::slice::Iter<'a, LabelScore>;

    fn into_iter(self) -> Self::IntoIter {
        self.scores.iter()
    }
}
