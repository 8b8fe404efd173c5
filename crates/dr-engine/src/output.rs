use std::time::Duration;

/// Latencies of one decode step, each measured on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepTimings {
    /// Model forward pass, measured on the worker thread.
    pub forward: Duration,
    /// Constraint adapter `transform`; zero without an adapter.
    pub constraint: Duration,
    /// Log-probability normalisation plus token selection.
    pub sampling: Duration,
}

/// Result of one decode step.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    /// Tokens emitted by this step; one unless a constraint adapter emitted more.
    pub tokens: Vec<u32>,
    /// Log-probabilities over the vocabulary the tokens were chosen from.
    pub logprobs: Vec<f32>,
    /// Whether the constraint adapter reports the output as inside a valid
    /// structured region. Always false without an adapter.
    pub within_value: bool,
    pub timings: StepTimings,
}

impl ModelOutput {
    /// First emitted token, `None` only for an output built without tokens.
    pub fn token(&self) -> Option<u32> {
        self.tokens.first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_first_emitted() {
        let mut output = ModelOutput {
            tokens: vec![7, 3],
            logprobs: vec![0.0; 8],
            within_value: true,
            timings: StepTimings::default(),
        };
        assert_eq!(output.token(), Some(7));

        output.tokens.clear();
        assert_eq!(output.token(), None);
    }
}
