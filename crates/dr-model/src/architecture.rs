use dr_cache::{CacheLayout, CacheSet};

/// Trait for models that can drive incremental autoregressive decoding.
///
/// Implementations hold weights only; attention state lives in the
/// `CacheSet` the caller passes to every forward call, one LayerCache per
/// attention layer.
pub trait Model: Send {
    /// Run the forward pass for a batch of new tokens.
    ///
    /// The tokens continue the sequence already held in `caches`: the first
    /// token sits at position `caches.valid_len()`. Implementations append
    /// one key/value row per token to every layer and return the logits over
    /// the vocabulary for the last token.
    fn forward(&mut self, tokens: &[u32], caches: &mut CacheSet) -> crate::Result<Vec<f32>>;

    /// Returns the vocabulary size (number of output logits).
    fn vocab_size(&self) -> usize;

    /// Shape of the caches this model reads and writes.
    fn cache_layout(&self) -> CacheLayout;

    /// Build the caches used with this model. Models with special cache
    /// needs override this; the default allocates one LayerCache per layer
    /// from `cache_layout`.
    fn make_caches(&self) -> CacheSet {
        CacheSet::for_layout(self.cache_layout())
    }
}

impl<M: Model + ?Sized> Model for Box<M> {
    fn forward(&mut self, tokens: &[u32], caches: &mut CacheSet) -> crate::Result<Vec<f32>> {
        (**self).forward(tokens, caches)
    }

    fn vocab_size(&self) -> usize {
        (**self).vocab_size()
    }

    fn cache_layout(&self) -> CacheLayout {
        (**self).cache_layout()
    }

    fn make_caches(&self) -> CacheSet {
        (**self).make_caches()
    }
}
