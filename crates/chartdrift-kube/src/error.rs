//! Error types for chartdrift-kube

use thiserror::Error;

/// Result type for chartdrift-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur while detecting drift
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Manifest parsing or filtering failed
    #[error(transparent)]
    Core(#[from] chartdrift_core::CoreError),

    /// Manifests could not be acquired (helm template, release lookup)
    #[error("fetching manifests for release '{release}' failed: {message}")]
    Acquisition { release: String, message: String },

    /// Release not found
    #[error("release '{name}' not found in namespace '{namespace}'")]
    ReleaseNotFound { name: String, namespace: String },

    /// Stored release could not be decoded
    #[error("decoding release '{name}' failed: {message}")]
    ReleaseDecode { name: String, message: String },

    /// Not every filtered manifest made it to disk
    #[error(
        "not all manifests were rendered to disk successfully, manifests failed to render:\n{}",
        .missing.join("\n")
    )]
    NotAllMaterialized { missing: Vec<String> },

    /// Two documents of a release map to the same manifest file
    #[error("resource '{resource}' is declared more than once")]
    DuplicateResource { resource: String },

    /// One release of a cluster scan failed
    #[error("release '{release}' in namespace '{namespace}' failed: {source}")]
    ReleaseFailed {
        release: String,
        namespace: String,
        source: Box<KubeError>,
    },

    /// The comparison tool failed (exit code other than 0 or 1)
    #[error(
        "running kubectl diff for '{kind}' '{name}' errored with exit code {code}, with message: {output}"
    )]
    DiffFailed {
        kind: String,
        name: String,
        code: String,
        output: String,
    },

    /// Autoscalers could not be listed, suppression cannot be decided
    #[error("listing horizontal pod autoscalers in namespace '{namespace}' failed: {message}")]
    AutoscalerLookup { namespace: String, message: String },

    /// A worker task panicked or was aborted
    #[error("worker task failed: {0}")]
    Task(String),

    /// Several failures collected from concurrent workers
    #[error("{}", .errors.join("\n"))]
    Aggregate { errors: Vec<String> },

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<tokio::task::JoinError> for KubeError {
    fn from(e: tokio::task::JoinError) -> Self {
        KubeError::Task(e.to_string())
    }
}

impl KubeError {
    /// Collapse collected failures into one error
    ///
    /// Returns `None` when nothing failed.
    pub fn aggregate(errors: Vec<KubeError>) -> Option<Self> {
        if errors.is_empty() {
            return None;
        }
        Some(KubeError::Aggregate {
            errors: errors.iter().map(|e| e.to_string()).collect(),
        })
    }
}
