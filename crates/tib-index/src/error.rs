//! Error types for tib-index.

use std::path::PathBuf;

/// Errors that can occur during indexing and retrieval.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// IO error reading source files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The repository root does not exist or is not a directory.
    #[error("repository path not found: {}", .0.display())]
    RepoNotFound(PathBuf),

    /// Vector store error.
    #[error("vector store error: {0}")]
    VectorStore(#[from] tib_store::VectorStoreError),

    /// Checkpoint store error.
    #[error("checkpoint store error: {0}")]
    Checkpoint(#[from] tib_store::StoreError),

    /// LLM provider error (embedding or generation).
    #[error("LLM error: {0}")]
    Llm(#[from] tib_llm::LlmError),

    /// Source control error.
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An operation did not finish within its time budget.
    #[error("{op} timed out after {secs}s")]
    Timeout { op: &'static str, secs: u64 },

    /// Every retry attempt failed.
    #[error("{op} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        op: &'static str,
        attempts: u32,
        last_error: String,
    },

    /// Integer conversion error.
    #[error("integer conversion failed: {0}")]
    IntConversion(#[from] std::num::TryFromIntError),

    /// Blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Generic catch-all error.
    #[error("{0}")]
    Other(String),
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
