//! Error types for the `plan-rag` crate.

use thiserror::Error;

/// Errors that can occur while building or querying a retrieval session.
///
/// The variants are deliberately coarse: callers need to tell apart
/// "the provider is unavailable, retry later" ([`Provider`](RetrievalError::Provider)),
/// "the index and query disagree on vector dimension"
/// ([`DimensionMismatch`](RetrievalError::DimensionMismatch)) and
/// "you forgot to build the session" ([`NotInitialized`](RetrievalError::NotInitialized)).
/// Cache corruption is not an error at all — the store reports such entries
/// as absent and the engine rebuilds.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The embedding/chat provider call failed or timed out.
    #[error("provider error ({provider}): {message}")]
    Provider {
        /// The provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The cache store could not persist or remove an entry.
    #[error("cache store error: {0}")]
    Cache(String),

    /// An I/O error outside the tolerated cache-read paths.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A query vector's dimension does not match the index it is run against.
    ///
    /// Typically caused by an embedding model change between build and query.
    /// The engine performs exactly one rebuild-and-retry when it sees this;
    /// a second occurrence is surfaced to the caller.
    #[error("dimension mismatch: index dimension {expected}, query dimension {actual}")]
    DimensionMismatch {
        /// The dimension the index was built with.
        expected: usize,
        /// The dimension of the offending query vector.
        actual: usize,
    },

    /// `search_similar_chunks` was called for a session that was never built.
    #[error("retrieval session not initialized; call build_or_load first")]
    NotInitialized,

    /// A configuration validation error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The vector index could not be built or deserialized.
    #[error("index error: {0}")]
    Index(String),

    /// A checklist record could not be parsed.
    #[error("checklist parse error: {0}")]
    Checklist(String),
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;
