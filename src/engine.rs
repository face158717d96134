//! Retrieval engine: orchestrates segment → embed → index → persist and
//! similarity search with cache reuse.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::config::EngineConfig;
use crate::document::{CacheMetadata, SearchResult};
use crate::error::{Result, RetrievalError};
use crate::index::FlatL2Index;
use crate::provider::Embedder;
use crate::segmenter;
use crate::session::{RetrievalSession, SessionRegistry};

/// The chunk-embed-index-retrieve engine.
///
/// One engine serves many documents. Per document, [`build_or_load`]
/// produces a session key; [`search_similar_chunks`] queries the session
/// behind that key. Sessions are read-only once published, so concurrent
/// searches against the same key are safe.
///
/// [`build_or_load`]: RetrievalEngine::build_or_load
/// [`search_similar_chunks`]: RetrievalEngine::search_similar_chunks
pub struct RetrievalEngine {
    config: EngineConfig,
    embedder: Arc<dyn Embedder>,
    cache: CacheStore,
    sessions: SessionRegistry,
}

impl RetrievalEngine {
    /// Open an engine with the given configuration, embedder, and cache root.
    pub async fn open(
        config: EngineConfig,
        embedder: Arc<dyn Embedder>,
        cache_root: impl Into<std::path::PathBuf>,
    ) -> Result<Self> {
        let cache = CacheStore::open(cache_root).await?;
        Ok(Self { config, embedder, cache, sessions: SessionRegistry::new() })
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The session registry (insert-on-build, lookup-on-reuse).
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// The on-disk cache store.
    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Build or load the retrieval session for a document, returning its
    /// session key.
    ///
    /// With `use_cache`, an already loaded session or a complete on-disk
    /// entry is reused — unless the entry was built with a different
    /// embedding model, in which case it is discarded and rebuilt. A cache
    /// miss (or `use_cache == false`) runs the full segment → embed → index →
    /// persist path. An embedding failure fails the whole build; nothing is
    /// persisted.
    pub async fn build_or_load(
        &self,
        source_id: &str,
        content: &str,
        use_cache: bool,
    ) -> Result<String> {
        let key = CacheStore::key_for(source_id, content);

        if use_cache {
            if self.sessions.get(&key).await.is_some() {
                debug!(key, "session already loaded");
                return Ok(key);
            }
            if let Some(entry) = self.cache.load(&key).await? {
                if entry.metadata.embedding_model == self.embedder.model_id() {
                    info!(key, chunk_count = entry.chunks.len(), "loaded session from cache");
                    self.sessions.insert(key.clone(), Arc::new(entry.into())).await;
                    return Ok(key);
                }
                warn!(
                    key,
                    cached_model = %entry.metadata.embedding_model,
                    requested_model = %self.embedder.model_id(),
                    "cache entry built with different embedding model; discarding"
                );
                self.cache.delete(&key).await?;
            }
        }

        let chunks = segmenter::split(content, self.config.max_chunk_len);
        info!(source_id, key, chunk_count = chunks.len(), "building session");

        let metadata =
            CacheMetadata::new(source_id, &key, content, chunks.len(), self.embedder.model_id());
        let session = self.build_session(&key, chunks, metadata).await?;
        self.sessions.insert(key.clone(), Arc::new(session)).await;
        Ok(key)
    }

    /// Embed `chunks`, build the index, persist the entry, and return the
    /// session. Shared by first builds and dimension-mismatch rebuilds.
    async fn build_session(
        &self,
        key: &str,
        chunks: Vec<String>,
        metadata: CacheMetadata,
    ) -> Result<RetrievalSession> {
        let embeddings = self.embedder.embed_batch(&chunks).await?;
        let index = FlatL2Index::build(embeddings.clone());

        self.cache.save(key, &chunks, &embeddings, &index, &metadata).await?;
        Ok(RetrievalSession { chunks, embeddings, index, metadata })
    }

    /// Search the session behind `key` for the `top_k` chunks most similar
    /// to `query`, nearest first. `None` uses [`EngineConfig::top_k`].
    ///
    /// Similarity is `1 / (1 + d)` over the squared L2 distance `d`, so
    /// scores lie in `(0, 1]` and decrease strictly with distance. The engine
    /// does not filter by threshold; callers truncate and filter as they
    /// aggregate evidence.
    ///
    /// # Errors
    ///
    /// - [`RetrievalError::NotInitialized`] if no session exists for `key`.
    /// - [`RetrievalError::Provider`] if embedding the query fails.
    /// - [`RetrievalError::DimensionMismatch`] if the query vector does not
    ///   match the index even after the one-shot rebuild described below.
    ///
    /// On a dimension mismatch — the index was built under one model, the
    /// query embedded under another — the engine discards the stale cache
    /// entry, rebuilds the session's chunks under the current model, swaps
    /// the new session in atomically, and retries the search once. A second
    /// mismatch is fatal for the request.
    pub async fn search_similar_chunks(
        &self,
        key: &str,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<SearchResult>> {
        let top_k = top_k.unwrap_or(self.config.top_k);
        let session = self.sessions.get(key).await.ok_or(RetrievalError::NotInitialized)?;
        let query_vec = self.embedder.embed(query).await?;

        match session.index.search(&query_vec, top_k) {
            Ok((distances, indices)) => Ok(to_results(&session, &distances, &indices)),
            Err(RetrievalError::DimensionMismatch { expected, actual }) => {
                warn!(
                    key,
                    index_dim = expected,
                    query_dim = actual,
                    "dimension mismatch; rebuilding session under current model"
                );
                let rebuilt = self.rebuild_session(key, &session).await?;
                let (distances, indices) = rebuilt.index.search(&query_vec, top_k)?;
                Ok(to_results(&rebuilt, &distances, &indices))
            }
            Err(e) => Err(e),
        }
    }

    /// Re-embed an existing session's chunks under the current model and
    /// publish the result, replacing the stale cache entry.
    async fn rebuild_session(
        &self,
        key: &str,
        stale: &RetrievalSession,
    ) -> Result<Arc<RetrievalSession>> {
        self.cache.delete(key).await?;

        let mut metadata = stale.metadata.clone();
        metadata.embedding_model = self.embedder.model_id().to_string();
        metadata.created_at = chrono::Utc::now();

        let session = self.build_session(key, stale.chunks.clone(), metadata).await?;
        let session = Arc::new(session);
        self.sessions.insert(key.to_string(), session.clone()).await;
        info!(key, model = %self.embedder.model_id(), "session rebuilt after dimension mismatch");
        Ok(session)
    }
}

fn to_results(
    session: &RetrievalSession,
    distances: &[f32],
    indices: &[usize],
) -> Vec<SearchResult> {
    distances
        .iter()
        .zip(indices.iter())
        .filter(|&(_, &idx)| idx < session.chunks.len())
        .map(|(&distance, &idx)| SearchResult {
            text: session.chunks[idx].clone(),
            index: idx,
            similarity: 1.0 / (1.0 + distance),
            distance,
        })
        .collect()
}
