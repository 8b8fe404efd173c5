use rand::RngCore;

use crate::config::SamplerConfig;
use crate::error::{Result, SamplerError};
use crate::greedy::{CategoricalSampler, GreedySampler};
use crate::min_p::MinPSampler;
use crate::temperature::TemperatureSampler;

/// A token ID paired with its logit value.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenLogit {
    pub token_id: u32,
    pub logit: f32,
}

/// Trait for samplers that modify or select from a set of token logits.
pub trait Sampler: Send + Sync {
    /// Returns the name of this sampler.
    fn name(&self) -> &str;

    /// Modify logits in-place (filtering, scaling, selecting).
    ///
    /// Stages that draw randomly take their randomness from `rng` only.
    fn apply(&self, logits: &mut Vec<TokenLogit>, rng: &mut dyn RngCore) -> Result<()>;
}

/// Composes multiple samplers into a pipeline.
/// The last sampler in the chain should be a selector (greedy or categorical).
pub struct SamplerChain {
    samplers: Vec<Box<dyn Sampler>>,
}

impl SamplerChain {
    /// Create a new empty sampler chain.
    pub fn new() -> Self {
        Self {
            samplers: Vec::new(),
        }
    }

    /// Add a sampler to the end of the chain. Returns self for builder-style usage.
    pub fn with(mut self, sampler: Box<dyn Sampler>) -> Self {
        self.samplers.push(sampler);
        self
    }

    /// Build the chain a `SamplerConfig` describes.
    ///
    /// - `min_p > 0`: temperature scaling (when sampling), min-p filtering,
    ///   then a categorical draw (argmax otherwise).
    /// - sampling: temperature scaling and a categorical draw.
    /// - otherwise: argmax.
    ///
    /// Sampling means `1 / temperature` is finite. Temperatures too small for
    /// that behave like temperature 0.
    pub fn for_config(config: &SamplerConfig) -> Result<Self> {
        config.validate()?;

        let sampling = config.temperature > 0.0 && config.temperature.recip().is_finite();
        let mut chain = SamplerChain::new();
        if sampling {
            chain = chain.with(Box::new(TemperatureSampler::new(config.temperature)));
        }
        if config.min_p > 0.0 {
            chain = chain.with(Box::new(MinPSampler::new(
                config.min_p,
                config.min_tokens_to_keep,
            )));
        }
        if sampling {
            chain = chain.with(Box::new(CategoricalSampler::new()));
        } else {
            chain = chain.with(Box::new(GreedySampler::new()));
        }
        Ok(chain)
    }

    /// Names of the stages, in order.
    pub fn names(&self) -> Vec<&str> {
        self.samplers.iter().map(|s| s.name()).collect()
    }

    /// Run all samplers in order on log-probabilities, return the selected token ID.
    ///
    /// 1. Converts `logprobs` into `Vec<TokenLogit>` (token_id = index).
    /// 2. Applies each sampler in sequence.
    /// 3. Returns the first remaining token's id.
    pub fn sample(&self, logprobs: &[f32], rng: &mut dyn RngCore) -> Result<u32> {
        if logprobs.is_empty() {
            return Err(SamplerError::EmptyLogits);
        }
        if !logprobs.iter().any(|&l| l > f32::NEG_INFINITY) {
            return Err(SamplerError::InvalidDistribution);
        }

        let mut token_logits: Vec<TokenLogit> = logprobs
            .iter()
            .enumerate()
            .map(|(i, &logit)| TokenLogit {
                token_id: i as u32,
                logit,
            })
            .collect();

        for sampler in &self.samplers {
            sampler.apply(&mut token_logits, rng)?;
        }

        token_logits
            .first()
            .map(|t| t.token_id)
            .ok_or(SamplerError::InvalidDistribution)
    }
}

impl Default for SamplerChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalise raw logits into log-probabilities: `logits - logsumexp(logits)`.
///
/// A vector with no finite entry is returned unchanged.
pub fn log_softmax(logits: &[f32]) -> Vec<f32> {
    let max_logit = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max_logit.is_finite() {
        return logits.to_vec();
    }
    let sum: f32 = logits.iter().map(|&l| (l - max_logit).exp()).sum();
    let lse = max_logit + sum.ln();
    logits.iter().map(|&l| l - lse).collect()
}
