//! In-memory vector index with brute-force inner-product search.
//!
//! `FlatIndex` is built once at startup from catalog embeddings and then
//! shared read-only. Search is O(n) per query, which is acceptable for
//! catalog-sized datasets.

use vitrine_core::error::VitrineError;

/// A single hit returned from a vector search.
///
/// `position` is the insertion-order row of the matching vector. A negative
/// position is a sentinel for "no entry in this slot" and must be skipped
/// by callers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexHit {
    pub position: i64,
    /// Inner-product similarity against the query.
    pub distance: f32,
}

/// Nearest-neighbour lookup over catalog embeddings.
///
/// Implementations may return fewer than `k` hits and may include
/// sentinel slots; callers filter. No retries.
pub trait VectorIndex: Send + Sync {
    /// Find the k most similar vectors to the query.
    ///
    /// Results are sorted by descending similarity.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<IndexHit>, VitrineError>;

    /// Number of vectors stored in the index.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Brute-force flat index over L2-normalized vectors.
///
/// Rows are normalized on insertion, so the inner product against a
/// normalized query equals cosine similarity.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimensions: usize,
    rows: Vec<Vec<f32>>,
}

impl FlatIndex {
    /// Create an empty index for vectors of the given dimensionality.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            rows: Vec::new(),
        }
    }

    /// Append a vector. Its position is the number of rows already stored.
    pub fn push(&mut self, mut embedding: Vec<f32>) -> Result<(), VitrineError> {
        if embedding.len() != self.dimensions {
            return Err(VitrineError::Index(format!(
                "Expected {} dimensions, got {}",
                self.dimensions,
                embedding.len()
            )));
        }
        l2_normalize(&mut embedding);
        self.rows.push(embedding);
        Ok(())
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }
}

impl VectorIndex for FlatIndex {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<IndexHit>, VitrineError> {
        if query.len() != self.dimensions {
            return Err(VitrineError::Index(format!(
                "Query has {} dimensions, index expects {}",
                query.len(),
                self.dimensions
            )));
        }

        let mut scored: Vec<IndexHit> = self
            .rows
            .iter()
            .enumerate()
            .map(|(position, row)| IndexHit {
                position: position as i64,
                distance: dot(query, row),
            })
            .collect();

        // Sort by descending similarity.
        scored.sort_by(|a, b| {
            b.distance
                .partial_cmp(&a.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);

        // Pad to exactly k slots with sentinel positions.
        while scored.len() < k {
            scored.push(IndexHit {
                position: -1,
                distance: 0.0,
            });
        }

        Ok(scored)
    }

    fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Scale a vector to unit length. Zero vectors are left unchanged.
pub(crate) fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for val in v.iter_mut() {
            *val /= norm;
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
