use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    #[error("invalid cache state: cannot keep {requested} positions (valid length {valid_len}, new total {new_total})")]
    InvalidCacheState {
        requested: usize,
        valid_len: usize,
        new_total: usize,
    },
    #[error("cache capacity exceeded: {required} positions required, capacity is {capacity}")]
    CapacityExceeded { required: usize, capacity: usize },
    #[error("shape mismatch: expected a multiple of kv_dim {kv_dim}, got keys={keys} values={values}")]
    ShapeMismatch {
        kv_dim: usize,
        keys: usize,
        values: usize,
    },
    #[error("layer caches disagree on valid length: {0:?}")]
    LayerLengthMismatch(Vec<usize>),
}

pub type Result<T> = std::result::Result<T, CacheError>;
