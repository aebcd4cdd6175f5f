//! Construction-time parameters for a [`crate::Hnsw`] index.

use crate::select::DelaunayType;

/// Tunables fixed at index construction.
///
/// Mirrors the shape of the reference config struct, minus the
/// `extend_candidates` flag (this index always runs the heuristic's plain
/// candidate-pool pass, never extends it by walking neighbors-of-neighbors)
/// and `keep_pruned_connections` (this index always backfills from
/// discarded candidates when the diverse pass comes up short, per the
/// selection algorithm in [`crate::select`]).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct IndexParams {
    /// Max out-degree per node above layer 0.
    pub m: u64,
    /// Max out-degree per node at layer 0. Conventionally `2 * m`.
    pub m0: u64,
    /// Beam width used while inserting.
    pub ef_construction: u64,
    /// Which neighbor-reduction policy to use.
    pub delaunay_type: DelaunayType,
}

impl IndexParams {
    pub fn new(m: u64, ef_construction: u64) -> Self {
        Self {
            m,
            m0: m * 2,
            ef_construction,
            delaunay_type: DelaunayType::Heuristic,
        }
    }

    pub fn with_m0(mut self, m0: u64) -> Self {
        self.m0 = m0;
        self
    }

    pub fn with_delaunay_type(mut self, delaunay_type: DelaunayType) -> Self {
        self.delaunay_type = delaunay_type;
        self
    }

    /// `level_mult = 1 / ln(M)`, the scale factor for random level draws.
    pub fn level_mult(&self) -> f64 {
        1.0 / (self.m as f64).ln()
    }

    /// Small graphs, fast builds, lower recall. Good for quick iteration.
    pub fn fast() -> Self {
        Self::new(12, 100)
    }

    /// A reasonable default for medium-sized datasets.
    pub fn balanced() -> Self {
        Self::new(16, 200)
    }

    /// Larger graphs, slower builds, higher recall.
    pub fn high_quality() -> Self {
        Self::new(32, 400)
    }
}

impl Default for IndexParams {
    fn default() -> Self {
        Self::balanced()
    }
}
