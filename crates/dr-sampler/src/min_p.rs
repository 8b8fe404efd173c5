use rand::RngCore;

use crate::error::Result;
use crate::sampler::{Sampler, TokenLogit};

/// Min-p filtering: keeps tokens whose probability is at least `min_p` times
/// the probability of the most likely token.
///
/// The kept set never shrinks below `min_tokens_to_keep`; when the threshold
/// would leave fewer, the next most likely tokens are kept as well. Survivors
/// are left sorted by descending logit.
pub struct MinPSampler {
    min_p: f32,
    min_tokens_to_keep: usize,
}

impl MinPSampler {
    pub fn new(min_p: f32, min_tokens_to_keep: usize) -> Self {
        Self {
            min_p,
            min_tokens_to_keep,
        }
    }
}

impl Sampler for MinPSampler {
    fn name(&self) -> &str {
        "min_p"
    }

    fn apply(&self, logits: &mut Vec<TokenLogit>, _rng: &mut dyn RngCore) -> Result<()> {
        if logits.is_empty() {
            return Ok(());
        }

        // Stable sort: equal logits keep ascending token order.
        logits.sort_by(|a, b| b.logit.partial_cmp(&a.logit).unwrap_or(std::cmp::Ordering::Equal));

        // p_i / p_max == exp(logit_i - logit_max), so the softmax normaliser
        // cancels out of the threshold test.
        let max_logit = logits[0].logit;
        let passing = logits
            .iter()
            .take_while(|t| (t.logit - max_logit).exp() >= self.min_p)
            .count();

        let keep = passing.max(self.min_tokens_to_keep).min(logits.len());
        logits.truncate(keep);
        Ok(())
    }
}
