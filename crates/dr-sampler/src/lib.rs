pub mod config;
pub mod error;
pub mod greedy;
pub mod min_p;
pub mod sampler;
pub mod temperature;

pub use config::SamplerConfig;
pub use error::{Result, SamplerError};
pub use greedy::{CategoricalSampler, GreedySampler};
pub use min_p::MinPSampler;
pub use sampler::{log_softmax, Sampler, SamplerChain, TokenLogit};
pub use temperature::TemperatureSampler;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// Select one token from `logprobs` according to `config`.
///
/// Fails with `InvalidSamplerConfig` before looking at the logits if the
/// config is out of range. The only randomness used is drawn from `rng`.
pub fn sample(logprobs: &[f32], config: &SamplerConfig, rng: &mut dyn RngCore) -> Result<u32> {
    SamplerChain::for_config(config)?.sample(logprobs, rng)
}

/// Owns the random generator a decode loop samples with.
///
/// The chain for the most recent config is kept, so consecutive steps under
/// the same config neither rebuild nor re-validate it.
pub struct TokenSampler {
    rng: StdRng,
    chain: Option<(SamplerConfig, SamplerChain)>,
}

impl TokenSampler {
    /// Seeded generator when `seed` is given, entropy-seeded otherwise.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng, chain: None }
    }

    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Config of the cached chain, if any config has been sampled with yet.
    pub fn cached_config(&self) -> Option<&SamplerConfig> {
        self.chain.as_ref().map(|(config, _)| config)
    }

    pub fn sample(&mut self, logprobs: &[f32], config: &SamplerConfig) -> Result<u32> {
        if let Some((cached, chain)) = &self.chain {
            if cached == config {
                return chain.sample(logprobs, &mut self.rng);
            }
        }

        let chain = SamplerChain::for_config(config)?;
        let token = chain.sample(logprobs, &mut self.rng);
        self.chain = Some((config.clone(), chain));
        token
    }
}
