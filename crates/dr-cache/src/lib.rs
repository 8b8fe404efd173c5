//! `dr-cache` - Key/value attention caches with prompt prefix reuse for decode-runtime.
//!
//! This crate provides:
//! - `LayerCache`, the per-layer key/value accumulator
//! - `CacheSet`, the owned collection of one model's LayerCaches
//! - `PromptCacheReuser`, which trims a CacheSet to the prefix a new prompt
//!   shares with the previously computed tokens

pub mod error;
pub mod layer;
pub mod reuse;
pub mod set;

pub use error::{CacheError, Result};
pub use layer::LayerCache;
pub use reuse::{shared_prefix_length, PromptCacheReuser, ReusePlan};
pub use set::{CacheLayout, CacheSet};
