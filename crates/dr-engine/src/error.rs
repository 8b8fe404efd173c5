use dr_cache::CacheError;
use dr_model::ModelError;
use dr_sampler::SamplerError;
use thiserror::Error;

use crate::constraint::ConstraintError;

/// Everything a decode call can fail with.
///
/// Collaborator errors are wrapped unchanged; the loop never retries them.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Sampler(#[from] SamplerError),
    #[error("model error: {0}")]
    Model(#[from] ModelError),
    #[error("constraint error: {0}")]
    Constraint(#[from] ConstraintError),
    #[error("prompt must contain at least one token")]
    EmptyPrompt,
    #[error("forward worker is unavailable")]
    WorkerUnavailable,
    #[error("failed to start forward worker: {0}")]
    Spawn(#[from] std::io::Error),
}

impl DecodeError {
    /// The context no longer fits in the allocated caches, whichever layer noticed.
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(
            self,
            DecodeError::Cache(CacheError::CapacityExceeded { .. })
                | DecodeError::Model(ModelError::Cache(CacheError::CapacityExceeded { .. }))
        )
    }

    pub fn is_invalid_cache_state(&self) -> bool {
        matches!(
            self,
            DecodeError::Cache(CacheError::InvalidCacheState { .. })
                | DecodeError::Model(ModelError::Cache(CacheError::InvalidCacheState { .. }))
        )
    }

    pub fn is_invalid_sampler_config(&self) -> bool {
        matches!(
            self,
            DecodeError::Sampler(SamplerError::InvalidSamplerConfig(_))
                | DecodeError::Constraint(ConstraintError::Sampler(
                    SamplerError::InvalidSamplerConfig(_)
                ))
        )
    }
}

pub type Result<T> = std::result::Result<T, DecodeError>;
