//! `plan-rag` — chunk-embed-index-retrieve engine for checking
//! construction-plan documents against checklists.
//!
//! The crate ingests a document's plain text, splits it into bounded-length
//! chunks along sentence boundaries, embeds each chunk via an
//! OpenAI-compatible provider, indexes the vectors for exact
//! nearest-neighbor search, and persists the whole bundle in a
//! content-addressed on-disk cache so later requests skip the (expensive)
//! embedding step. Callers get back an opaque session key and a
//! `search(query, top_k)` operation returning chunks ranked by similarity.
//!
//! # Components
//!
//! - [`segmenter`] — deterministic sentence-boundary splitting with hard-slice
//!   and empty-document fallbacks.
//! - [`provider`] — [`Embedder`]/[`ChatModel`] traits and [`OpenAiProvider`].
//! - [`index`] — [`EmbeddingMatrix`] and the exact flat-L2 [`FlatL2Index`].
//! - [`cache`] — [`CacheStore`], content-addressed entry directories plus a
//!   listing registry.
//! - [`session`] — [`RetrievalSession`] bundles and the process-wide
//!   [`SessionRegistry`].
//! - [`engine`] — [`RetrievalEngine`], the orchestrator.
//! - [`checklist`] — bilingual optional-field checklist records.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use plan_rag::{EngineConfig, OpenAiProvider, ProviderConfig, RetrievalEngine};
//!
//! let provider = Arc::new(OpenAiProvider::new(
//!     ProviderConfig::new("http://localhost:11434/v1", "ollama")
//!         .with_embedding_model("nomic-embed-text"),
//! )?);
//! let engine =
//!     RetrievalEngine::open(EngineConfig::default(), provider, "./cache").await?;
//!
//! let key = engine.build_or_load("plan.docx", &document_text, true).await?;
//! let results = engine.search_similar_chunks(&key, "基坑支护设计", None).await?;
//! for r in &results {
//!     println!("{}", r.evidence_line());
//! }
//! ```

pub mod cache;
pub mod checklist;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod index;
pub mod provider;
pub mod segmenter;
pub mod session;

pub use cache::{CacheEntry, CacheStore};
pub use checklist::ChecklistItem;
pub use config::{EngineConfig, EngineConfigBuilder};
pub use document::{CacheMetadata, ChatMessage, SearchResult};
pub use engine::RetrievalEngine;
pub use error::{Result, RetrievalError};
pub use index::{EmbeddingMatrix, FlatL2Index};
pub use provider::{ChatModel, Embedder, OpenAiProvider, ProviderConfig, TokenStream};
pub use segmenter::EMPTY_DOC_SENTINEL;
pub use session::{RetrievalSession, SessionRegistry};
