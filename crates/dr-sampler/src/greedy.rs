use rand::distributions::{Distribution, WeightedIndex};
use rand::RngCore;

use crate::error::{Result, SamplerError};
use crate::sampler::{Sampler, TokenLogit};

/// Greedy sampler: selects the single token with the highest logit.
///
/// Ties go to the lowest token id.
pub struct GreedySampler;

impl GreedySampler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GreedySampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for GreedySampler {
    fn name(&self) -> &str {
        "greedy"
    }

    fn apply(&self, logits: &mut Vec<TokenLogit>, _rng: &mut dyn RngCore) -> Result<()> {
        if logits.is_empty() {
            return Ok(());
        }

        let mut best = 0;
        for (i, token) in logits.iter().enumerate().skip(1) {
            let current = &logits[best];
            if token.logit > current.logit
                || (token.logit == current.logit && token.token_id < current.token_id)
            {
                best = i;
            }
        }

        let selected = logits.swap_remove(best);
        logits.clear();
        logits.push(selected);
        Ok(())
    }
}

/// Categorical sampler: converts logits to probabilities via softmax,
/// then draws from the resulting distribution with the caller's generator.
pub struct CategoricalSampler;

impl CategoricalSampler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CategoricalSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for CategoricalSampler {
    fn name(&self) -> &str {
        "categorical"
    }

    fn apply(&self, logits: &mut Vec<TokenLogit>, rng: &mut dyn RngCore) -> Result<()> {
        if logits.is_empty() {
            return Ok(());
        }

        // Compute softmax probabilities.
        let max_logit = logits
            .iter()
            .map(|t| t.logit)
            .fold(f32::NEG_INFINITY, f32::max);

        let exps: Vec<f32> = logits.iter().map(|t| (t.logit - max_logit).exp()).collect();
        let sum: f32 = exps.iter().sum();
        let probs: Vec<f32> = exps.iter().map(|e| e / sum).collect();

        let dist = WeightedIndex::new(&probs).map_err(|_| SamplerError::InvalidDistribution)?;

        let selected = logits.swap_remove(dist.sample(rng));
        logits.clear();
        logits.push(selected);
        Ok(())
    }
}
