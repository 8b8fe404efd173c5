use crate::error::{CacheError, Result};
use crate::layer::LayerCache;

/// Shape of the per-layer caches a model needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLayout {
    /// Number of attention layers (one LayerCache each).
    pub n_layers: usize,
    /// Width of one key (or value) row: n_kv_heads * head_dim.
    pub kv_dim: usize,
    /// Maximum context length; every layer is allocated this many positions.
    pub max_seq_len: usize,
}

/// The LayerCaches of one model instance, addressed by layer index.
///
/// Layers are always mutated together: every layer must hold the same number
/// of positions between forward passes.
#[derive(Debug, Clone)]
pub struct CacheSet {
    layers: Vec<LayerCache>,
}

impl CacheSet {
    pub fn new(layers: Vec<LayerCache>) -> Self {
        CacheSet { layers }
    }

    /// Allocate empty caches for every layer of `layout`.
    pub fn for_layout(layout: CacheLayout) -> Self {
        let layers = (0..layout.n_layers)
            .map(|_| LayerCache::new(layout.kv_dim, layout.max_seq_len))
            .collect();
        CacheSet { layers }
    }

    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn layer(&self, idx: usize) -> Option<&LayerCache> {
        self.layers.get(idx)
    }

    pub fn layer_mut(&mut self, idx: usize) -> Option<&mut LayerCache> {
        self.layers.get_mut(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LayerCache> {
        self.layers.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut LayerCache> {
        self.layers.iter_mut()
    }

    /// Smallest capacity across layers; zero for a set with no layers.
    pub fn capacity(&self) -> usize {
        self.layers.iter().map(LayerCache::capacity).min().unwrap_or(0)
    }

    /// Common valid length of all layers.
    ///
    /// Fails with `LayerLengthMismatch` if the layers have drifted apart, which
    /// only happens when a model writes to some layers and not others.
    pub fn valid_len(&self) -> Result<usize> {
        let first = match self.layers.first() {
            Some(layer) => layer.len(),
            None => return Ok(0),
        };
        if self.layers.iter().all(|layer| layer.len() == first) {
            Ok(first)
        } else {
            Err(CacheError::LayerLengthMismatch(
                self.layers.iter().map(LayerCache::len).collect(),
            ))
        }
    }

    /// Apply `reuse(new_total_len, shared_prefix_len)` to every layer.
    ///
    /// All layers are validated before any of them is trimmed, so a failure
    /// leaves the set unchanged.
    pub fn reuse(&mut self, new_total_len: usize, shared_prefix_len: usize) -> Result<()> {
        let valid_len = self.valid_len()?;
        if shared_prefix_len > valid_len || shared_prefix_len > new_total_len {
            return Err(CacheError::InvalidCacheState {
                requested: shared_prefix_len,
                valid_len,
                new_total: new_total_len,
            });
        }
        if new_total_len > self.capacity() {
            return Err(CacheError::CapacityExceeded {
                required: new_total_len,
                capacity: self.capacity(),
            });
        }
        for layer in &mut self.layers {
            layer.reuse(new_total_len, shared_prefix_len)?;
        }
        Ok(())
    }

    /// Roll every layer back to `len` positions, tolerating layers that never
    /// reached it.
    pub fn rollback(&mut self, len: usize) {
        for layer in &mut self.layers {
            if layer.len() > len {
                // len < layer.len() <= capacity, so truncate cannot fail here.
                let _ = layer.truncate(len);
            }
        }
    }

    pub fn reset(&mut self) {
        for layer in &mut self.layers {
            layer.reset();
        }
    }
}
