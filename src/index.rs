//! Flat exact-L2 vector index and its binary serialization.
//!
//! The index is a dense row-major matrix scanned exhaustively per query.
//! Exact search is deliberate: at sub-100k-chunk scale, correctness beats
//! recall/speed tradeoffs. Distances are *squared* L2; downstream similarity
//! is `1 / (1 + d)` over the squared value, and persisted entries depend on
//! that convention staying fixed.

use crate::error::{Result, RetrievalError};

/// Artifact header magic for a serialized [`EmbeddingMatrix`].
const MATRIX_MAGIC: [u8; 4] = *b"PRM1";
/// Artifact header magic for a serialized [`FlatL2Index`].
const INDEX_MAGIC: [u8; 4] = *b"PRX1";

/// A dense N×D matrix of `f32` embeddings, one row per chunk.
///
/// Row order is chunk order and must never be permuted: the row ordinal is
/// the chunk's identity within a session.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    data: Vec<f32>,
    rows: usize,
    dim: usize,
}

impl EmbeddingMatrix {
    /// Build a matrix from per-chunk embedding rows.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Index`] if `rows` is empty, any row is
    /// empty, or the rows disagree on dimension. Dimension mismatches are a
    /// hard failure here, at build time, not at query time.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let dim = match rows.first() {
            Some(first) if !first.is_empty() => first.len(),
            Some(_) => {
                return Err(RetrievalError::Index("embedding rows must not be empty".to_string()));
            }
            None => {
                return Err(RetrievalError::Index(
                    "cannot build a matrix from zero rows".to_string(),
                ));
            }
        };

        let mut data = Vec::with_capacity(rows.len() * dim);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != dim {
                return Err(RetrievalError::Index(format!(
                    "row {i} has dimension {}, expected {dim}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }

        Ok(Self { data, rows: rows.len(), dim })
    }

    /// Number of rows (chunks).
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Embedding dimension D.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Borrow row `i`. Panics if `i >= rows()`.
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    /// Serialize as `magic | rows(u32) | dim(u32) | payload`.
    pub fn to_bytes(&self) -> Vec<u8> {
        serialize(&MATRIX_MAGIC, self)
    }

    /// Deserialize a matrix written by [`to_bytes`](EmbeddingMatrix::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        deserialize(&MATRIX_MAGIC, bytes)
    }
}

fn serialize(magic: &[u8; 4], matrix: &EmbeddingMatrix) -> Vec<u8> {
    let payload: &[u8] = bytemuck::cast_slice(&matrix.data);
    let mut out = Vec::with_capacity(12 + payload.len());
    out.extend_from_slice(magic);
    out.extend_from_slice(&(matrix.rows as u32).to_le_bytes());
    out.extend_from_slice(&(matrix.dim as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

fn deserialize(magic: &[u8; 4], bytes: &[u8]) -> Result<EmbeddingMatrix> {
    if bytes.len() < 12 || &bytes[..4] != magic {
        return Err(RetrievalError::Index("unrecognized artifact header".to_string()));
    }
    let rows = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    let dim = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;

    let payload = &bytes[12..];
    let expected = rows
        .checked_mul(dim)
        .and_then(|n| n.checked_mul(std::mem::size_of::<f32>()))
        .ok_or_else(|| RetrievalError::Index("artifact header overflow".to_string()))?;
    if payload.len() != expected || rows == 0 || dim == 0 {
        return Err(RetrievalError::Index(format!(
            "artifact payload is {} bytes, expected {expected} for {rows}x{dim}",
            payload.len()
        )));
    }

    let data: Vec<f32> = bytemuck::pod_collect_to_vec(payload);

    Ok(EmbeddingMatrix { data, rows, dim })
}

/// An exact nearest-neighbor index over an [`EmbeddingMatrix`] (flat L2).
///
/// Immutable after [`build`](FlatL2Index::build); concurrent searches are
/// pure reads. A reloaded index reproduces identical search behavior to a
/// freshly built one over the same matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatL2Index {
    matrix: EmbeddingMatrix,
}

impl FlatL2Index {
    /// Build an index over `matrix`. Row dimension consistency was already
    /// enforced when the matrix was constructed.
    pub fn build(matrix: EmbeddingMatrix) -> Self {
        Self { matrix }
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        self.matrix.rows()
    }

    /// Whether the index holds no vectors. Always false for a built index,
    /// since matrices cannot be empty.
    pub fn is_empty(&self) -> bool {
        self.matrix.rows() == 0
    }

    /// Dimension D the index was built with.
    pub fn dim(&self) -> usize {
        self.matrix.dim()
    }

    /// Find the `k` nearest vectors to `query`, returning parallel vectors of
    /// squared L2 distances (ascending) and row indices.
    ///
    /// If `k` exceeds the number of indexed vectors, all vectors are returned.
    /// Ties break on the lower row index, keeping results deterministic.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::DimensionMismatch`] if `query` does not have
    /// dimension D.
    pub fn search(&self, query: &[f32], k: usize) -> Result<(Vec<f32>, Vec<usize>)> {
        if query.len() != self.matrix.dim() {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.matrix.dim(),
                actual: query.len(),
            });
        }

        let mut scored: Vec<(f32, usize)> = (0..self.matrix.rows())
            .map(|i| (squared_l2(self.matrix.row(i), query), i))
            .collect();
        scored.sort_by(|a, b| {
            a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal).then(a.1.cmp(&b.1))
        });
        scored.truncate(k.min(self.matrix.rows()));

        let (distances, indices) = scored.into_iter().unzip();
        Ok((distances, indices))
    }

    /// Borrow the underlying matrix.
    pub fn matrix(&self) -> &EmbeddingMatrix {
        &self.matrix
    }

    /// Serialize the index in its native binary format.
    pub fn to_bytes(&self) -> Vec<u8> {
        serialize(&INDEX_MAGIC, &self.matrix)
    }

    /// Deserialize an index written by [`to_bytes`](FlatL2Index::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        deserialize(&INDEX_MAGIC, bytes).map(Self::build)
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}
