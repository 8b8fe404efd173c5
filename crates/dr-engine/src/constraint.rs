use dr_sampler::{SamplerConfig, SamplerError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConstraintError {
    #[error("step rejected: {0}")]
    Rejected(String),
    #[error("constraint produced no tokens")]
    NoTokens,
    #[error("sampler error: {0}")]
    Sampler(#[from] SamplerError),
    #[error("{0}")]
    Other(String),
}

/// The plain sampler, as handed to a `ConstraintAdapter`.
///
/// Draws one token from log-probabilities under the given config, using the
/// decode loop's generator.
pub type SampleFn<'a> = dyn FnMut(&[f32], &SamplerConfig) -> dr_sampler::Result<u32> + 'a;

/// Boundary to an external structured-generation engine.
///
/// An adapter sees every step's logits before sampling and has the final say
/// on which tokens are emitted. Its grammar or schema state is its own
/// business; the loop only calls these three methods, in this order, once per
/// step.
pub trait ConstraintAdapter: Send {
    /// Mask or reshape raw logits, typically by setting disallowed tokens to
    /// negative infinity.
    fn transform(&mut self, logits: Vec<f32>) -> Result<Vec<f32>, ConstraintError>;

    /// Choose the tokens to emit. `sampler` may be called any number of
    /// times; whatever this returns is emitted, even when it differs from
    /// what `sampler` picked.
    fn sample(
        &mut self,
        logprobs: &[f32],
        sampler: &mut SampleFn<'_>,
        config: &SamplerConfig,
    ) -> Result<Vec<u32>, ConstraintError>;

    /// Whether the output so far sits inside a structurally valid region.
    fn is_within_value(&self) -> bool;
}

/// How a decode loop selects tokens. Fixed at construction.
pub enum Structuring {
    /// Sample straight from the model distribution.
    Plain,
    /// Route every step through a constraint adapter.
    Constrained(Box<dyn ConstraintAdapter>),
}

impl Structuring {
    pub fn is_constrained(&self) -> bool {
        matches!(self, Structuring::Constrained(_))
    }
}

impl std::fmt::Debug for Structuring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Structuring::Plain => f.write_str("Plain"),
            Structuring::Constrained(_) => f.write_str("Constrained(..)"),
        }
    }
}
