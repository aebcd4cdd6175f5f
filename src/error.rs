use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("vector has {found} dimensions, expected {expected}")]
    DimensionMisMatch { expected: usize, found: usize },

    #[error("no node with id {0} in the index")]
    UnknownNode(u64),

    #[error("ef ({ef}) must be >= k ({k})")]
    EfLessThanK { ef: u64, k: u64 },

    #[error("M must be >= 2, got {0}")]
    InvalidM(u64),
}
