use std::time::{Duration, Instant};

use dr_cache::{CacheError, PromptCacheReuser, ReusePlan};
use dr_model::Model;
use dr_sampler::{log_softmax, SamplerConfig, TokenSampler};

use crate::config::DecodeConfig;
use crate::constraint::{ConstraintAdapter, ConstraintError, Structuring};
use crate::error::{DecodeError, Result};
use crate::output::{ModelOutput, StepTimings};
use crate::worker::{ForwardWorker, PendingForward};

/// Where a decode loop is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Nothing primed yet, or reset since.
    Idle,
    /// A prompt suffix has been dispatched; no output produced yet.
    Priming,
    /// Producing one output per step, with the next step in flight.
    Stepping,
    /// The last stream was dropped or failed. Cached state stays valid for
    /// the next prime.
    Stopped,
}

/// Incremental autoregressive decoder with prompt cache reuse.
///
/// Owns the model (on a worker thread), its layer caches, the computed
/// token history, and the sampling generator. Each call to `inference`
/// trims the caches to the prefix the new prompt shares with the history,
/// forwards only the remainder, and returns a lazy, unbounded stream of
/// step results.
pub struct DecodeLoop {
    worker: ForwardWorker,
    structuring: Structuring,
    sampler: TokenSampler,
    reuser: PromptCacheReuser,
    config: DecodeConfig,
    history: Vec<u32>,
    state: LoopState,
}

impl DecodeLoop {
    /// Decode by sampling straight from the model distribution.
    pub fn new<M: Model + 'static>(model: M, config: DecodeConfig) -> Result<Self> {
        Self::with_structuring(model, Structuring::Plain, config)
    }

    /// Decode with every step routed through `adapter`.
    pub fn constrained<M: Model + 'static>(
        model: M,
        adapter: Box<dyn ConstraintAdapter>,
        config: DecodeConfig,
    ) -> Result<Self> {
        Self::with_structuring(model, Structuring::Constrained(adapter), config)
    }

    pub fn with_structuring<M: Model + 'static>(
        model: M,
        structuring: Structuring,
        config: DecodeConfig,
    ) -> Result<Self> {
        config.sampler.validate()?;
        let worker = ForwardWorker::spawn(model)?;
        log::info!(
            "Decode loop ready: context={}, vocab={}, structuring={:?}",
            worker.capacity(),
            worker.vocab_size(),
            structuring
        );

        Ok(DecodeLoop {
            worker,
            structuring,
            sampler: TokenSampler::new(config.sampler.seed),
            reuser: PromptCacheReuser::new(),
            config,
            history: Vec::new(),
            state: LoopState::Idle,
        })
    }

    /// Start generating from `prompt` with the loop's sampler config.
    pub fn inference(&mut self, prompt: &[u32]) -> Result<DecodeStream<'_>> {
        let config = self.config.sampler.clone();
        self.prime(prompt, config)
    }

    /// Start generating from `prompt` with a per-call sampler config.
    pub fn inference_with(
        &mut self,
        prompt: &[u32],
        config: &SamplerConfig,
    ) -> Result<DecodeStream<'_>> {
        self.prime(prompt, config.clone())
    }

    /// Tokens whose keys and values are currently held by the caches.
    pub fn history(&self) -> &[u32] {
        &self.history
    }

    /// Valid length reported by the layer caches themselves.
    pub fn cache_len(&self) -> Result<usize> {
        self.worker.cache_len()
    }

    pub fn capacity(&self) -> usize {
        self.worker.capacity()
    }

    pub fn vocab_size(&self) -> usize {
        self.worker.vocab_size()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn config(&self) -> &DecodeConfig {
        &self.config
    }

    pub fn is_constrained(&self) -> bool {
        self.structuring.is_constrained()
    }

    /// Forget all cached state.
    pub fn reset(&mut self) -> Result<()> {
        self.worker.reset()?;
        self.history.clear();
        self.state = LoopState::Idle;
        log::info!("Decode loop reset");
        Ok(())
    }

    fn prime(&mut self, prompt: &[u32], config: SamplerConfig) -> Result<DecodeStream<'_>> {
        // Every check that can fail without touching the caches runs first.
        config.validate()?;
        if prompt.is_empty() {
            return Err(DecodeError::EmptyPrompt);
        }
        if prompt.len() > self.worker.capacity() {
            return Err(CacheError::CapacityExceeded {
                required: prompt.len(),
                capacity: self.worker.capacity(),
            }
            .into());
        }
        if let Some(seed) = config.seed {
            self.sampler.reseed(seed);
        }

        self.state = LoopState::Priming;
        let tic = Instant::now();
        let plan = self.reuser.plan(&self.history, prompt);
        if let Err(e) = self.worker.reuse(plan) {
            self.state = LoopState::Stopped;
            return Err(e);
        }
        self.history.truncate(plan.shared);
        log::debug!(
            "Reusing KV cache for {}/{} tokens, reuse time: {:.4}s",
            plan.shared,
            plan.total,
            tic.elapsed().as_secs_f64()
        );

        let pending = match self.worker.dispatch(plan.suffix(prompt).to_vec()) {
            Ok(pending) => pending,
            Err(e) => {
                self.state = LoopState::Stopped;
                return Err(e);
            }
        };

        Ok(DecodeStream {
            engine: self,
            config,
            plan,
            pending: Some(pending),
            deferred: None,
        })
    }

    /// Dispatch a forward pass over `tokens`, checking capacity first so a
    /// step that cannot fit never reaches the model.
    fn dispatch(&self, tokens: &[u32]) -> Result<PendingForward> {
        let required = self.history.len() + tokens.len();
        if required > self.worker.capacity() {
            return Err(CacheError::CapacityExceeded {
                required,
                capacity: self.worker.capacity(),
            }
            .into());
        }
        self.worker.dispatch(tokens.to_vec())
    }

    /// Collect a forward pass, commit its tokens, and pick the next tokens.
    fn advance(&mut self, pending: PendingForward, config: &SamplerConfig) -> Result<ModelOutput> {
        let done = pending.wait()?;
        self.history.extend_from_slice(&done.tokens);
        log::debug!("Model inference time: {:.4}s", done.elapsed.as_secs_f64());
        self.select(done.logits, done.elapsed, config)
    }

    fn select(
        &mut self,
        logits: Vec<f32>,
        forward: Duration,
        config: &SamplerConfig,
    ) -> Result<ModelOutput> {
        let mut constraint = Duration::ZERO;
        let logits = match &mut self.structuring {
            Structuring::Plain => logits,
            Structuring::Constrained(adapter) => {
                let tic = Instant::now();
                let masked = adapter.transform(logits)?;
                constraint = tic.elapsed();
                log::debug!("Engine time: {:.4}s", constraint.as_secs_f64());
                masked
            }
        };

        let tic = Instant::now();
        let logprobs = log_softmax(&logits);
        let sampler = &mut self.sampler;
        let tokens = match &mut self.structuring {
            Structuring::Plain => vec![sampler.sample(&logprobs, config)?],
            Structuring::Constrained(adapter) => {
                adapter.sample(&logprobs, &mut |lp, cfg| sampler.sample(lp, cfg), config)?
            }
        };
        let sampling = tic.elapsed();
        log::debug!("Sampling time: {:.4}s", sampling.as_secs_f64());

        if tokens.is_empty() {
            return Err(ConstraintError::NoTokens.into());
        }

        let within_value = match &self.structuring {
            Structuring::Plain => false,
            Structuring::Constrained(adapter) => adapter.is_within_value(),
        };

        Ok(ModelOutput {
            tokens,
            logprobs,
            within_value,
            timings: StepTimings {
                forward,
                constraint,
                sampling,
            },
        })
    }

    /// Wait out an abandoned forward pass so the history matches the caches.
    fn settle(&mut self, pending: PendingForward) {
        match pending.wait() {
            Ok(done) => self.history.extend_from_slice(&done.tokens),
            Err(e) => log::warn!("Discarding in-flight step after cancellation: {}", e),
        }
    }
}

/// Lazy, unbounded sequence of decode steps.
///
/// Each `next` collects the forward pass for the current step, samples from
/// it, and dispatches the forward pass for the following step before
/// returning, so the model computes step n+1 while the caller handles step n.
/// The stream only ends after an error has been yielded; stopping is the
/// caller's decision. Dropping the stream waits for the in-flight forward
/// pass and commits it, leaving the loop ready for the next prime.
pub struct DecodeStream<'a> {
    engine: &'a mut DecodeLoop,
    config: SamplerConfig,
    plan: ReusePlan,
    pending: Option<PendingForward>,
    deferred: Option<DecodeError>,
}

impl<'a> DecodeStream<'a> {
    /// How the prompt was split between cache and forward pass.
    pub fn reused(&self) -> ReusePlan {
        self.plan
    }

    pub fn sampler_config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Lifecycle state of the loop this stream drives.
    pub fn state(&self) -> LoopState {
        self.engine.state
    }

    /// Stop after the loop's configured `max_tokens`, if any.
    pub fn budgeted(self) -> std::iter::Take<Self> {
        let budget = self.engine.config.max_tokens.unwrap_or(usize::MAX);
        self.take(budget)
    }

    fn fail(&mut self, e: DecodeError) -> Option<Result<ModelOutput>> {
        self.engine.state = LoopState::Stopped;
        Some(Err(e))
    }
}

impl Iterator for DecodeStream<'_> {
    type Item = Result<ModelOutput>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.deferred.take() {
            return self.fail(e);
        }
        let pending = self.pending.take()?;

        let output = match self.engine.advance(pending, &self.config) {
            Ok(output) => output,
            Err(e) => return self.fail(e),
        };

        // Step n+1 starts computing before step n is handed out. If it cannot
        // be dispatched, step n is still valid and the error surfaces on the
        // following call.
        match self.engine.dispatch(&output.tokens) {
            Ok(next) => self.pending = Some(next),
            Err(e) => self.deferred = Some(e),
        }
        self.engine.state = LoopState::Stepping;
        Some(Ok(output))
    }
}

impl Drop for DecodeStream<'_> {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.engine.settle(pending);
        }
        self.engine.state = LoopState::Stopped;
    }
}
