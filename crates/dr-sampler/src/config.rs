use crate::error::{Result, SamplerError};

/// Per-call sampling parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerConfig {
    /// Sampling sharpness; 0 selects the argmax.
    pub temperature: f32,
    /// Keep only tokens whose probability is at least `min_p` times the
    /// probability of the most likely token. 0 disables the filter.
    pub min_p: f32,
    /// Lower bound on the candidate pool left by the min-p filter.
    pub min_tokens_to_keep: usize,
    /// Re-seed the generator before sampling, for reproducible output.
    pub seed: Option<u64>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            min_p: 0.0,
            min_tokens_to_keep: 1,
            seed: None,
        }
    }
}

impl SamplerConfig {
    /// Deterministic argmax decoding.
    pub fn greedy() -> Self {
        Self {
            temperature: 0.0,
            ..Self::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_min_p(mut self, min_p: f32, min_tokens_to_keep: usize) -> Self {
        self.min_p = min_p;
        self.min_tokens_to_keep = min_tokens_to_keep;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check value ranges. NaN is rejected everywhere.
    pub fn validate(&self) -> Result<()> {
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(SamplerError::InvalidSamplerConfig(format!(
                "temperature must be a finite value >= 0, got {}",
                self.temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.min_p) {
            return Err(SamplerError::InvalidSamplerConfig(format!(
                "min_p must be in [0, 1], got {}",
                self.min_p
            )));
        }
        if self.min_tokens_to_keep == 0 {
            return Err(SamplerError::InvalidSamplerConfig(
                "min_tokens_to_keep must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = SamplerConfig::default();
        assert_eq!(config.temperature, 1.0);
        assert_eq!(config.min_p, 0.0);
        assert_eq!(config.min_tokens_to_keep, 1);
        assert!(config.validate().is_ok());
        assert!(SamplerConfig::greedy().validate().is_ok());
    }

    #[test]
    fn test_rejects_negative_temperature() {
        let config = SamplerConfig::default().with_temperature(-0.5);
        assert!(matches!(
            config.validate(),
            Err(SamplerError::InvalidSamplerConfig(_))
        ));
        let config = SamplerConfig::default().with_temperature(f32::NAN);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_min_p_out_of_range() {
        assert!(SamplerConfig::default().with_min_p(1.5, 1).validate().is_err());
        assert!(SamplerConfig::default().with_min_p(-0.1, 1).validate().is_err());
        assert!(SamplerConfig::default().with_min_p(f32::NAN, 1).validate().is_err());
        assert!(SamplerConfig::default().with_min_p(1.0, 1).validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_keep() {
        let config = SamplerConfig::default().with_min_p(0.1, 0);
        assert!(config.validate().is_err());
    }
}
