use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SamplerError {
    #[error("invalid sampler config: {0}")]
    InvalidSamplerConfig(String),
    #[error("cannot sample from empty logits")]
    EmptyLogits,
    #[error("no token has a finite log-probability")]
    InvalidDistribution,
}

pub type Result<T> = std::result::Result<T, SamplerError>;
