//! In-memory retrieval sessions and the process-wide session registry.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::cache::CacheEntry;
use crate::document::CacheMetadata;
use crate::index::{EmbeddingMatrix, FlatL2Index};

/// The in-memory bundle for one loaded document: chunks, embedding matrix,
/// and vector index, plus the metadata they were built under.
///
/// Read-only after construction. Chunk order, matrix row order, and index
/// ordinal position are the same ordering; nothing may permute one without
/// the others.
#[derive(Debug, Clone)]
pub struct RetrievalSession {
    /// Chunk texts in document order.
    pub chunks: Vec<String>,
    /// Embedding matrix, row `i` belonging to `chunks[i]`.
    pub embeddings: EmbeddingMatrix,
    /// Vector index over the matrix.
    pub index: FlatL2Index,
    /// Metadata the session was built or loaded with.
    pub metadata: CacheMetadata,
}

impl From<CacheEntry> for RetrievalSession {
    fn from(entry: CacheEntry) -> Self {
        Self {
            chunks: entry.chunks,
            embeddings: entry.embeddings,
            index: entry.index,
            metadata: entry.metadata,
        }
    }
}

/// Process-wide map of cache key to loaded session.
///
/// Sessions are inserted when built or loaded and looked up on reuse. There
/// is no automatic eviction, so a long-lived process that loads many
/// documents grows until the caller imposes a policy via
/// [`remove`](SessionRegistry::remove).
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<RetrievalSession>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the session for `key`.
    pub async fn get(&self, key: &str) -> Option<Arc<RetrievalSession>> {
        let sessions = self.sessions.read().await;
        sessions.get(key).cloned()
    }

    /// Publish `session` under `key`, replacing any previous session
    /// atomically. Concurrent readers holding the old `Arc` keep a coherent
    /// (if stale) session; new lookups see the replacement.
    pub async fn insert(&self, key: impl Into<String>, session: Arc<RetrievalSession>) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(key.into(), session);
    }

    /// Remove the session for `key`, returning it if present.
    pub async fn remove(&self, key: &str) -> Option<Arc<RetrievalSession>> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(key)
    }

    /// Number of loaded sessions.
    pub async fn len(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }

    /// Whether no sessions are loaded.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
