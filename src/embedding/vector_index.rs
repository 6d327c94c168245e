/// HNSW vector index for similarity search
use hnsw_rs::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

/// hnsw_rs caps the layer count at 16
const MAX_LAYERS: usize = 16;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Index initialization failed: {0}")]
    InitializationError(String),

    #[error("Insert failed: {0}")]
    InsertError(String),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },
}

/// Nearest-neighbour hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorHit {
    /// Slot the vector was inserted under
    pub slot: usize,
    /// Cosine similarity (higher is more similar)
    pub score: f32,
}

/// HNSW vector index wrapper
///
/// Slots are dense positions assigned by the caller; the index knows nothing about documents.
pub struct VectorIndex {
    index: Hnsw<'static, f32, DistCosine>,
    dimension: usize,
    capacity: usize,
    count: AtomicUsize,
}

impl VectorIndex {
    /// Create an empty index
    ///
    /// # Arguments
    /// * `dimension` - Vector dimension (must match embedding dimension)
    /// * `capacity` - Expected number of vectors
    /// * `ef_construction` - HNSW construction parameter (higher = better recall, slower build)
    /// * `m` - HNSW M parameter (number of connections per layer)
    pub fn new(
        dimension: usize,
        capacity: usize,
        ef_construction: usize,
        m: usize,
    ) -> Result<Self, VectorIndexError> {
        if dimension == 0 {
            return Err(VectorIndexError::InitializationError(
                "Dimension must be greater than 0".to_string(),
            ));
        }
        if m == 0 || ef_construction == 0 {
            return Err(VectorIndexError::InitializationError(
                "HNSW parameters must be greater than 0".to_string(),
            ));
        }

        let capacity = capacity.max(1);
        let index = Hnsw::<f32, DistCosine>::new(m, capacity, MAX_LAYERS, ef_construction, DistCosine);

        Ok(Self {
            index,
            dimension,
            capacity,
            count: AtomicUsize::new(0),
        })
    }

    /// Insert a vector under `slot`
    pub fn insert(&self, slot: usize, vector: &[f32]) -> Result<(), VectorIndexError> {
        if vector.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        if slot >= self.capacity {
            return Err(VectorIndexError::InsertError(format!(
                "Slot {} exceeds capacity {}",
                slot, self.capacity
            )));
        }
        if vector.iter().all(|v| *v == 0.0) {
            // Cosine distance is undefined for the zero vector
            return Err(VectorIndexError::InsertError(format!(
                "Zero vector for slot {}",
                slot
            )));
        }

        self.index.insert((vector, slot));
        self.count.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }

    /// Search for the k nearest neighbours, most similar first
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        ef_search: usize,
    ) -> Result<Vec<VectorHit>, VectorIndexError> {
        if query.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<VectorHit> = self
            .index
            .search(query, k, ef_search.max(k))
            .into_iter()
            .map(|neighbour| VectorHit {
                slot: neighbour.d_id,
                score: 1.0 - neighbour.distance,
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.slot.cmp(&b.slot)));
        hits.truncate(k);
        Ok(hits)
    }

    /// Get the number of vectors in the index
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    /// Check if index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get vector dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }
}
