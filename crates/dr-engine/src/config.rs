use dr_sampler::SamplerConfig;

/// Options a decode loop is constructed with.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecodeConfig {
    /// Sampling parameters used when a call does not supply its own.
    pub sampler: SamplerConfig,
    /// Step budget for callers that consume through `DecodeStream::budgeted`.
    /// The loop itself never stops on it.
    pub max_tokens: Option<usize>,
}

impl DecodeConfig {
    pub fn new(sampler: SamplerConfig) -> Self {
        Self {
            sampler,
            max_tokens: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}
