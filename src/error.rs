//! Error taxonomy for the extraction and reconciliation pipeline.
//!
//! Argument drift between a template and the documentation is not an error;
//! it is reported through [`crate::reconcile::MismatchReport`].

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// A required input or output location is unusable. Fatal for the run.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("no documentation entry for function `{function}`")]
    DocumentationNotFound { function: String },

    #[error("invalid template {}: {reason}", path.display())]
    InvalidTemplate { path: PathBuf, reason: String },

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error must stop the whole batch regardless of policy.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::Configuration(_))
    }
}
