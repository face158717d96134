//! Data types for search results, cache metadata, and chat messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of characters of document text kept in [`CacheMetadata::content_preview`].
const PREVIEW_CHARS: usize = 500;

/// A retrieved chunk paired with its similarity score.
///
/// Results are ordered nearest-first: ascending [`distance`](SearchResult::distance),
/// descending [`similarity`](SearchResult::similarity). The similarity is
/// `1 / (1 + distance)` and therefore always in `(0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The retrieved chunk text.
    pub text: String,
    /// The chunk's ordinal position within its document.
    pub index: usize,
    /// Similarity score in `(0, 1]`, monotonically decreasing in distance.
    pub similarity: f32,
    /// Raw (squared) L2 distance between query and chunk embeddings.
    pub distance: f32,
}

impl SearchResult {
    /// Format this result as an evidence line for LLM context assembly,
    /// the way the checking layer concatenates retrieved chunks.
    pub fn evidence_line(&self) -> String {
        format!("相关度{:.3}: {}", self.similarity, self.text)
    }
}

/// Metadata describing one persisted cache entry.
///
/// Written as `metadata.json` inside the entry directory and mirrored in the
/// store-wide registry file for listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheMetadata {
    /// The caller-supplied logical source identifier (usually the original filename).
    pub source_filename: String,
    /// The cache key this entry is stored under.
    pub key: String,
    /// When this entry was built.
    pub created_at: DateTime<Utc>,
    /// Length of the source document text in characters.
    pub text_length: usize,
    /// Number of chunks the document was split into.
    pub chunk_count: usize,
    /// Identifier of the embedding model the entry was built with.
    pub embedding_model: String,
    /// The first few hundred characters of the document text.
    pub content_preview: String,
}

impl CacheMetadata {
    /// Build metadata for a freshly built entry, deriving the preview and
    /// text length from `content`.
    pub fn new(
        source_filename: impl Into<String>,
        key: impl Into<String>,
        content: &str,
        chunk_count: usize,
        embedding_model: impl Into<String>,
    ) -> Self {
        let text_length = content.chars().count();
        let content_preview = if text_length > PREVIEW_CHARS {
            let head: String = content.chars().take(PREVIEW_CHARS).collect();
            format!("{head}...")
        } else {
            content.to_string()
        };

        Self {
            source_filename: source_filename.into(),
            key: key.into(),
            created_at: Utc::now(),
            text_length,
            chunk_count,
            embedding_model: embedding_model.into(),
            content_preview,
        }
    }
}

/// A single message in a chat-completion conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// The message role (`system`, `user`, or `assistant`).
    pub role: String,
    /// The message content.
    pub content: String,
}

impl ChatMessage {
    /// Create a `system` message.
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }

    /// Create a `user` message.
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }

    /// Create an `assistant` message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".into(), content: content.into() }
    }
}
