//! Error types for Cerberus

use std::path::Path;

/// Result type alias using Cerberus's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for detector operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Inference attempted before `load()` (or after `unload()`)
    #[error("detector is not loaded; call load() before classify()")]
    NotLoaded,

    /// Model artifacts could not be resolved from the local cache
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// Caller supplied an out-of-range argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Downloading or persisting model artifacts failed
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Local artifact resolution failed for a reason other than absence
    #[error("artifact error: {0}")]
    Artifact(String),

    /// Model loading or forward pass errors
    #[error("model error: {0}")]
    Model(String),

    /// Image decoding or preprocessing errors
    #[error("image error: {0}")]
    Image(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a new resource-unavailable error
    pub fn resource_unavailable(msg: impl Into<String>) -> Self {
        Self::ResourceUnavailable(msg.into())
    }

    /// Create a new invalid-argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a new fetch error
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    /// Create a new artifact error
    pub fn artifact(msg: impl Into<String>) -> Self {
        Self::Artifact(msg.into())
    }

    /// Create a new model error
    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new image error
    pub fn image(msg: impl Into<String>) -> Self {
        Self::Image(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Wrap a filesystem error with the path it occurred on
    pub fn io_at(path: &Path, source: std::io::Error) -> Self {
        Self::Io(std::io::Error::new(
            source.kind(),
            format!("{}: {}", path.display(), source),
        ))
    }

    /// Whether calling `load()` (after `download()` if needed) can recover from this error
    pub fn is_recoverable_by_load(&self) -> bool {
        matches!(self, Self::NotLoaded | Self::ResourceUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            Error::NotLoaded.to_string(),
            "detector is not loaded; call load() before classify()"
        );
        assert_eq!(
            Error::invalid_argument("top_k must be in 1..4, got 0").to_string(),
            "invalid argument: top_k must be in 1..4, got 0"
        );
    }

    #[test]
    fn test_io_at_keeps_kind_and_path() {
        let source = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = Error::io_at(Path::new("/models/config.json"), source);

        match &err {
            Error::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::PermissionDenied),
            other => panic!("expected io error, got {:?}", other),
        }
        assert_eq!(err.to_string(), "io error: /models/config.json: denied");
    }

    #[test]
    fn test_json_error_converts() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_recoverable_by_load() {
        assert!(Error::NotLoaded.is_recoverable_by_load());
        assert!(Error::resource_unavailable("missing").is_recoverable_by_load());
        assert!(!Error::fetch("offline").is_recoverable_by_load());
        assert!(!Error::invalid_argument("top_k").is_recoverable_by_load());
    }
}
