//! Model artifact resolution and download via the Hugging Face Hub cache

use hf_hub::api::sync::ApiBuilder;
use hf_hub::{Cache, Repo};
use std::io;
use std::path::{Path, PathBuf};

/// Model configuration (architecture and `id2label`)
pub const CONFIG_FILE: &str = "config.json";
/// Image preprocessing parameters (optional; defaults apply when absent)
pub const PREPROCESSOR_CONFIG_FILE: &str = "preprocessor_config.json";
/// Model weights
pub const WEIGHTS_FILE: &str = "model.safetensors";

/// Files that must be present for a model to load
pub const REQUIRED_FILES: [&str; 2] = [CONFIG_FILE, WEIGHTS_FILE];

/// Failure modes when resolving or fetching artifacts
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// Artifacts are absent from the local cache
    #[error("{0} not found in local cache")]
    NotFound(String),

    /// The cache exists but could not be read
    #[error("cache io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The cache layout is inconsistent (e.g. a dangling revision ref)
    #[error("corrupt cache: {0}")]
    Corrupt(String),

    /// Network or hub API failure during download
    #[error("hub error: {0}")]
    Hub(String),
}

/// Resolved on-disk locations of a model's artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelArtifacts {
    pub model_id: String,
    pub config: PathBuf,
    pub preprocessor_config: Option<PathBuf>,
    pub weights: PathBuf,
}

impl ModelArtifacts {
    /// Snapshot directory containing the artifacts
    pub fn root(&self) -> Option<&Path> {
        self.config.parent()
    }
}

/// Keyed store of model artifacts rooted at a cache location
pub trait ArtifactStore: Send {
    /// Resolve artifacts without touching the network
    fn resolve_local(&self, model_id: &str, cache_dir: &Path)
        -> Result<ModelArtifacts, ArtifactError>;

    /// Download artifacts into `cache_dir`
    fn fetch(&self, model_id: &str, cache_dir: &Path) -> Result<ModelArtifacts, ArtifactError>;
}

/// Artifact store backed by the Hugging Face Hub cache layout
/// (`models--{org}--{name}/refs/main`, `snapshots/{commit}/...`).
#[derive(Debug, Clone, Default)]
pub struct HubArtifactStore {
    progress: bool,
}

impl HubArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show download progress bars during `fetch`
    pub fn with_progress(mut self, enable: bool) -> Self {
        self.progress = enable;
        self
    }
}

impl ArtifactStore for HubArtifactStore {
    fn resolve_local(
        &self,
        model_id: &str,
        cache_dir: &Path,
    ) -> Result<ModelArtifacts, ArtifactError> {
        let repo = Repo::model(model_id.to_string());
        let repo_dir = cache_dir.join(repo.folder_name());

        match std::fs::metadata(&repo_dir) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ArtifactError::NotFound(model_id.to_string()));
            }
            Err(source) => {
                return Err(ArtifactError::Io {
                    path: repo_dir,
                    source,
                })
            }
        }

        let ref_path = repo_dir.join("refs").join(repo.revision());
        let commit = match std::fs::read_to_string(&ref_path) {
            Ok(commit) => commit,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ArtifactError::NotFound(format!(
                    "{} revision '{}'",
                    model_id,
                    repo.revision()
                )));
            }
            Err(source) => {
                return Err(ArtifactError::Io {
                    path: ref_path,
                    source,
                })
            }
        };

        if commit.trim().is_empty() {
            return Err(ArtifactError::Corrupt(format!(
                "empty revision ref {}",
                ref_path.display()
            )));
        }

        let cache_repo = Cache::new(cache_dir.to_path_buf()).repo(repo);
        let required = |file: &str| {
            cache_repo
                .get(file)
                .ok_or_else(|| ArtifactError::NotFound(format!("{}/{}", model_id, file)))
        };
        let config = required(CONFIG_FILE)?;
        let weights = required(WEIGHTS_FILE)?;
        let preprocessor_config = cache_repo.get(PREPROCESSOR_CONFIG_FILE);

        tracing::debug!("Resolved {} from local cache {}", model_id, cache_dir.display());

        Ok(ModelArtifacts {
            model_id: model_id.to_string(),
            config,
            preprocessor_config,
            weights,
        })
    }

    fn fetch(&self, model_id: &str, cache_dir: &Path) -> Result<ModelArtifacts, ArtifactError> {
        tracing::info!(
            "Downloading model from HuggingFace: {} into {}",
            model_id,
            cache_dir.display()
        );

        let api = ApiBuilder::new()
            .with_cache_dir(cache_dir.to_path_buf())
            .with_progress(self.progress)
            .build()
            .map_err(|e| {
                ArtifactError::Hub(format!("Failed to initialize HuggingFace API: {}", e))
            })?;

        let repo = api.repo(Repo::model(model_id.to_string()));
        let download = |file: &str| {
            tracing::debug!("Downloading {}", file);
            repo.get(file)
                .map_err(|e| ArtifactError::Hub(format!("Failed to download {}: {}", file, e)))
        };

        let config = download(CONFIG_FILE)?;
        let weights = download(WEIGHTS_FILE)?;
        let preprocessor_config = match download(PREPROCESSOR_CONFIG_FILE) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!("{}; using default preprocessing for {}", e, model_id);
                None
            }
        };

        tracing::info!("Model {} available in {}", model_id, cache_dir.display());

        Ok(ModelArtifacts {
            model_id: model_id.to_string(),
            config,
            preprocessor_config,
            weights,
        })
    }
}
