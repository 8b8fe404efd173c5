//! `dr-engine` - Incremental autoregressive decoding for decode-runtime.
//!
//! A `DecodeLoop` owns a model and its layer caches, reuses whatever prefix
//! a new prompt shares with the tokens it has already computed, and yields a
//! lazy stream of sampled tokens. The forward pass for the next step runs on
//! a worker thread while the caller handles the current one.

pub mod config;
pub mod constraint;
pub mod decode;
pub mod error;
pub mod output;
pub mod worker;

pub use config::DecodeConfig;
pub use constraint::{ConstraintAdapter, ConstraintError, SampleFn, Structuring};
pub use decode::{DecodeLoop, DecodeStream, LoopState};
pub use error::{DecodeError, Result};
pub use output::{ModelOutput, StepTimings};
pub use worker::{ForwardDone, ForwardWorker, PendingForward};

pub use dr_cache::ReusePlan;
pub use dr_sampler::SamplerConfig;
