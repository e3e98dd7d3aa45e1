//! Typed failures of the ingestion and chat pipeline.
//!
//! File-level failures (`LoaderFailure`) are isolated per file by the
//! orchestrator; `UploadFailure` and `MissingConfiguration` are fatal for the
//! command that hits them. Hashing and state-store errors live next to their
//! operations in [`crate::state`].

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required credential or index name is absent.
    #[error("missing configuration: {0} is not set")]
    MissingConfiguration(String),

    /// One source file could not be parsed.
    #[error("failed to load {}: {reason}", path.display())]
    LoaderFailure { path: PathBuf, reason: String },

    /// A batch failed to reach the vector store.
    #[error("upload failed for chunks {start}..{end}: {reason}")]
    UploadFailure {
        start: usize,
        end: usize,
        reason: String,
    },
}

impl PipelineError {
    pub fn loader(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        PipelineError::LoaderFailure {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failure() {
        let err = PipelineError::MissingConfiguration("PINECONE_API_KEY".to_string());
        assert_eq!(
            err.to_string(),
            "missing configuration: PINECONE_API_KEY is not set"
        );

        let err = PipelineError::loader("data/bad.pdf", "invalid xref");
        assert!(err.to_string().contains("data/bad.pdf"));
        assert!(err.to_string().contains("invalid xref"));

        let err = PipelineError::UploadFailure {
            start: 50,
            end: 100,
            reason: "HTTP 503".to_string(),
        };
        assert_eq!(err.to_string(), "upload failed for chunks 50..100: HTTP 503");
    }
}
