use rand::RngCore;

use crate::error::Result;
use crate::sampler::{Sampler, TokenLogit};

/// Divides every logit by the temperature.
///
/// Only built for a temperature whose reciprocal is finite; smaller
/// temperatures select the greedy path instead of scaling.
pub struct TemperatureSampler {
    temperature: f32,
}

impl TemperatureSampler {
    pub fn new(temperature: f32) -> Self {
        debug_assert!(temperature > 0.0);
        Self { temperature }
    }
}

impl Sampler for TemperatureSampler {
    fn name(&self) -> &str {
        "temperature"
    }

    fn apply(&self, logits: &mut Vec<TokenLogit>, _rng: &mut dyn RngCore) -> Result<()> {
        logits
            .iter_mut()
            .for_each(|t| t.logit /= self.temperature);
        Ok(())
    }
}
