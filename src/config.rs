//! Configuration for the retrieval engine.

use serde::{Deserialize, Serialize};

use crate::error::{Result, RetrievalError};

/// Configuration parameters for the retrieval engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Maximum chunk length in characters (not bytes — CJK documents are the
    /// primary input).
    pub max_chunk_len: usize,
    /// Number of results a search returns when the caller does not pass an
    /// explicit `top_k`.
    pub top_k: usize,
    /// Similarity floor callers typically apply when aggregating evidence.
    ///
    /// The engine itself never filters; the threshold lives here so the
    /// checking layer and its tests share one configurable constant instead
    /// of a hard-coded `0.1`.
    pub similarity_threshold: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_chunk_len: 300, top_k: 5, similarity_threshold: 0.1 }
    }
}

impl EngineConfig {
    /// Create a new builder for constructing an [`EngineConfig`].
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }
}

/// Builder for constructing a validated [`EngineConfig`].
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Set the maximum chunk length in characters.
    pub fn max_chunk_len(mut self, len: usize) -> Self {
        self.config.max_chunk_len = len;
        self
    }

    /// Set the default number of top results for searches.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the similarity threshold carried for callers.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = threshold;
        self
    }

    /// Build the [`EngineConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Config`] if:
    /// - `max_chunk_len == 0`
    /// - `top_k == 0`
    /// - `similarity_threshold` is not a finite value in `[0, 1]`
    pub fn build(self) -> Result<EngineConfig> {
        if self.config.max_chunk_len == 0 {
            return Err(RetrievalError::Config(
                "max_chunk_len must be greater than zero".to_string(),
            ));
        }
        if self.config.top_k == 0 {
            return Err(RetrievalError::Config("top_k must be greater than zero".to_string()));
        }
        let t = self.config.similarity_threshold;
        if !t.is_finite() || !(0.0..=1.0).contains(&t) {
            return Err(RetrievalError::Config(format!(
                "similarity_threshold ({t}) must be a finite value in [0, 1]"
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = EngineConfig::default();
        assert_eq!(config.max_chunk_len, 300);
        assert_eq!(config.top_k, 5);
        assert_eq!(config.similarity_threshold, 0.1);
    }

    #[test]
    fn builder_rejects_zero_chunk_len() {
        let err = EngineConfig::builder().max_chunk_len(0).build().unwrap_err();
        assert!(matches!(err, RetrievalError::Config(_)));
    }

    #[test]
    fn builder_rejects_out_of_range_threshold() {
        assert!(EngineConfig::builder().similarity_threshold(1.5).build().is_err());
        assert!(EngineConfig::builder().similarity_threshold(f32::NAN).build().is_err());
        assert!(EngineConfig::builder().similarity_threshold(0.0).build().is_ok());
    }
}
