//! Unified error types for the delivery pipeline.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main pipeline error type
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Host error: {0}")]
    Host(#[from] HostError),

    #[error("Pipeline timed out after {0:?}")]
    Timeout(Duration),
}

impl PipelineError {
    /// Machine-readable detail string for results.
    ///
    /// Upstream stream errors carry the generation service's own detail
    /// verbatim; everything else uses the display text.
    pub fn detail(&self) -> String {
        match self {
            Self::Transfer(TransferError::Upstream(detail)) => detail.clone(),
            other => other.to_string(),
        }
    }

    /// Whether the caller can act on this error by changing its input
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            Self::Host(HostError::NamingConflict(_))
                | Self::Publish(PublishError::MissingCredential(_))
                | Self::Workspace(WorkspaceError::InvalidName(_))
        )
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
}

/// Staging directory setup errors
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Invalid project name: {0:?}")]
    InvalidName(String),

    #[error("Failed to create workspace {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to purge residue at {path}: {source}")]
    Purge {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Archive stream errors
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("{0}")]
    Upstream(String),

    #[error("Stream closed before end marker after {0} bytes")]
    Truncated(u64),

    #[error("Archive size mismatch: expected {expected} bytes, received {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("Archive checksum mismatch: expected {expected}, computed {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Failed to write archive {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Archive unpacking errors
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Failed to read archive {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to prepare destination {path}: {source}")]
    Destination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt archive: {0}")]
    Corrupt(String),

    #[error("Extraction cancelled")]
    Cancelled,

    #[error("Archive entry escapes destination: {0}")]
    UnsafePath(PathBuf),

    #[error("Extraction task failed: {0}")]
    Task(String),
}

/// Git publishing errors
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("No push credential stored for user: {0}")]
    MissingCredential(String),

    #[error("Authentication failed for repository: {0}")]
    Authentication(String),

    #[error("Repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("Push rejected by remote: {0}")]
    Rejected(String),

    #[error("Git {operation} failed: {detail}")]
    Git { operation: String, detail: String },

    #[error("Failed to overlay generated tree: {0}")]
    Overlay(#[from] std::io::Error),
}

/// Single-file fetch errors
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("File {path} not found in {repository}")]
    NotFound { repository: String, path: String },

    #[error("Failed to decode remote file: {0}")]
    Decode(String),

    #[error("Fetch failed: {0}")]
    Host(#[from] HostError),
}

/// Repository host API errors
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Repository name already taken: {0}")]
    NamingConflict(String),

    #[error("Unauthorized (status {0})")]
    Unauthorized(u16),

    #[error("Host API error (status {status}): {message}")]
    Status { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for HostError {
    fn from(err: reqwest::Error) -> Self {
        HostError::Network(err.to_string())
    }
}

/// Remote generation service errors
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation service unreachable: {0}")]
    Connection(String),

    #[error("Generation service error (status {status}): {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        GenerationError::Connection(err.to_string())
    }
}

/// Result type alias for the pipeline
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Result type alias for workspace operations
pub type WorkspaceResult<T> = std::result::Result<T, WorkspaceError>;

/// Result type alias for archive transfer
pub type TransferResult<T> = std::result::Result<T, TransferError>;

/// Result type alias for extraction
pub type ExtractionResult<T> = std::result::Result<T, ExtractionError>;

/// Result type alias for publishing
pub type PublishResult<T> = std::result::Result<T, PublishError>;

/// Result type alias for remote file fetches
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for host API calls
pub type HostResult<T> = std::result::Result<T, HostError>;

/// Result type alias for generation calls
pub type GenerationResult<T> = std::result::Result<T, GenerationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_detail_is_verbatim() {
        let err = PipelineError::from(TransferError::Upstream("node x: unsupported".into()));
        assert_eq!(err.detail(), "node x: unsupported");
    }

    #[test]
    fn test_sub_second_timeout_is_readable() {
        let err = PipelineError::Timeout(Duration::from_millis(400));
        assert_eq!(err.to_string(), "Pipeline timed out after 400ms");
    }

    #[test]
    fn test_naming_conflict_is_actionable() {
        let conflict = PipelineError::from(HostError::NamingConflict("demo".into()));
        let generic = PipelineError::from(HostError::Status {
            status: 500,
            message: "boom".into(),
        });
        let missing = PipelineError::from(PublishError::MissingCredential("alice".into()));
        assert!(conflict.is_user_actionable());
        assert!(missing.is_user_actionable());
        assert!(!generic.is_user_actionable());
    }
}
