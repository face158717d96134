//! Shared test fixtures: a deterministic mock embedder and log setup.

use std::sync::Once;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use plan_rag::{Embedder, Result, RetrievalError};

static TRACING: Once = Once::new();

/// Install a fmt subscriber once so engine logs show up in test output.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

/// Deterministic embedder for tests.
///
/// The first three dimensions count occurrences of the probe keywords
/// `safety` / `quality` / `empty`, the fourth is a lexical fingerprint, and
/// remaining dimensions are zero. Texts sharing a keyword land close in L2;
/// the fingerprint keeps distinct texts from colliding exactly. The output
/// dimension can be switched at runtime to simulate an embedding model
/// change, and the embedder can be told to fail to simulate a provider
/// outage.
pub struct MockEmbedder {
    model: String,
    dim: AtomicUsize,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl MockEmbedder {
    pub fn new(model: &str, dim: usize) -> Self {
        assert!(dim >= 4, "mock embedder needs at least 4 dimensions");
        Self {
            model: model.to_string(),
            dim: AtomicUsize::new(dim),
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    /// Switch the output dimension, simulating a model swap mid-process.
    pub fn set_dim(&self, dim: usize) {
        assert!(dim >= 4);
        self.dim.store(dim, Ordering::SeqCst);
    }

    /// While set, every `embed` call fails with a provider error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `embed` calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let dim = self.dim.load(Ordering::SeqCst);
        let lower = text.to_lowercase();
        let mut v = vec![0.0f32; dim];
        for (i, keyword) in ["safety", "quality", "empty"].iter().enumerate() {
            v[i] = lower.matches(keyword).count() as f32;
        }
        let fingerprint: u32 = lower.bytes().map(u32::from).sum::<u32>() % 97;
        v[3] = fingerprint as f32 / 97.0;
        v
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(RetrievalError::Provider {
                provider: "mock".to_string(),
                message: "simulated provider outage".to_string(),
            });
        }
        Ok(self.vector(text))
    }
}
