use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("cache error: {0}")]
    Cache(#[from] dr_cache::CacheError),
    #[error("token id {token} exceeds vocab size {vocab}")]
    InvalidToken { token: u32, vocab: usize },
    #[error("no tokens to process")]
    EmptyInput,
    #[error("cache set has {got} layers, model expects {expected}")]
    CacheLayout { expected: usize, got: usize },
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
