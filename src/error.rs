use std::path::PathBuf;
use thiserror::Error;

/// Failures of a single extraction run. Every variant is fatal to the run.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The namespace or the sources behind it cannot be introspected.
    #[error("Cannot resolve namespace '{namespace}': {reason}")]
    NamespaceResolution { namespace: String, reason: String },

    #[error("Failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Failed to serialize metadata document: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration {path}: {reason}")]
    Config { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, ExtractError>;

impl ExtractError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn namespace(namespace: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NamespaceResolution {
            namespace: namespace.into(),
            reason: reason.into(),
        }
    }

    pub fn parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn is_namespace_resolution(&self) -> bool {
        matches!(self, Self::NamespaceResolution { .. })
    }

    pub fn is_serialization(&self) -> bool {
        matches!(self, Self::Serialization(_))
    }

    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

impl From<std::str::Utf8Error> for ExtractError {
    fn from(e: std::str::Utf8Error) -> Self {
        ExtractError::parse("<source>", format!("Invalid UTF-8 in syntax node: {}", e))
    }
}
