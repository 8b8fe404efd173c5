use crate::error::{CacheError, Result};

/// Key/value accumulator for a single attention layer.
///
/// Keys and values are stored as flat row-major arrays of shape
/// `[capacity, kv_dim]`. Only the first `len` rows are meaningful; rows past
/// `len` are scratch space that the next `append` overwrites.
#[derive(Debug, Clone)]
pub struct LayerCache {
    keys: Vec<f32>,
    values: Vec<f32>,
    kv_dim: usize,
    capacity: usize,
    len: usize,
    offset: usize,
}

impl LayerCache {
    /// Allocate a zeroed cache able to hold `capacity` positions of width `kv_dim`.
    pub fn new(kv_dim: usize, capacity: usize) -> Self {
        LayerCache {
            keys: vec![0.0f32; kv_dim * capacity],
            values: vec![0.0f32; kv_dim * capacity],
            kv_dim,
            capacity,
            len: 0,
            offset: 0,
        }
    }

    /// Number of populated positions.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn kv_dim(&self) -> usize {
        self.kv_dim
    }

    /// Leading positions dropped by eviction. This cache never evicts, so the
    /// offset stays at zero.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Append keys and values for one or more new positions.
    ///
    /// `keys` and `values` must both hold `n * kv_dim` elements. Returns the
    /// position of the first appended row.
    pub fn append(&mut self, keys: &[f32], values: &[f32]) -> Result<usize> {
        if self.kv_dim == 0 || keys.len() != values.len() || keys.len() % self.kv_dim != 0 {
            return Err(CacheError::ShapeMismatch {
                kv_dim: self.kv_dim,
                keys: keys.len(),
                values: values.len(),
            });
        }

        let n_new = keys.len() / self.kv_dim;
        let end = self.len + n_new;
        if end > self.capacity {
            return Err(CacheError::CapacityExceeded {
                required: end,
                capacity: self.capacity,
            });
        }

        let start = self.len;
        let (lo, hi) = (start * self.kv_dim, end * self.kv_dim);
        self.keys[lo..hi].copy_from_slice(keys);
        self.values[lo..hi].copy_from_slice(values);
        self.len = end;
        Ok(start)
    }

    /// Keep only the first `shared_prefix_len` positions in preparation for a
    /// prompt of `new_total_len` tokens.
    ///
    /// Subsequent appends start writing at `shared_prefix_len`.
    pub fn reuse(&mut self, new_total_len: usize, shared_prefix_len: usize) -> Result<()> {
        if shared_prefix_len > self.len || shared_prefix_len > new_total_len {
            return Err(CacheError::InvalidCacheState {
                requested: shared_prefix_len,
                valid_len: self.len,
                new_total: new_total_len,
            });
        }
        if new_total_len > self.capacity {
            return Err(CacheError::CapacityExceeded {
                required: new_total_len,
                capacity: self.capacity,
            });
        }
        self.len = shared_prefix_len;
        Ok(())
    }

    /// Drop every position past `len`.
    pub fn truncate(&mut self, len: usize) -> Result<()> {
        self.reuse(len, len)
    }

    /// Forget all positions. The backing storage is kept and zeroed.
    pub fn reset(&mut self) {
        self.keys.fill(0.0);
        self.values.fill(0.0);
        self.len = 0;
        self.offset = 0;
    }

    /// Keys for positions `0..len`, shape `[len, kv_dim]`.
    pub fn keys(&self) -> &[f32] {
        &self.keys[..self.len * self.kv_dim]
    }

    /// Values for positions `0..len`, shape `[len, kv_dim]`.
    pub fn values(&self) -> &[f32] {
        &self.values[..self.len * self.kv_dim]
    }

    /// Key row at `pos`, if populated.
    pub fn key_at(&self, pos: usize) -> Option<&[f32]> {
        (pos < self.len).then(|| &self.keys[pos * self.kv_dim..(pos + 1) * self.kv_dim])
    }

    /// Value row at `pos`, if populated.
    pub fn value_at(&self, pos: usize) -> Option<&[f32]> {
        (pos < self.len).then(|| &self.values[pos * self.kv_dim..(pos + 1) * self.kv_dim])
    }
}
