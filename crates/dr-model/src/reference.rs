use dr_cache::{CacheError, CacheLayout, CacheSet};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::architecture::Model;
use crate::error::{ModelError, Result};

/// Configuration for the reference attention model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceConfig {
    /// Vocabulary size (number of token embeddings and output logits).
    pub n_vocab: usize,
    /// Embedding dimension; also the key/value row width (single head).
    pub n_embd: usize,
    /// Number of attention layers.
    pub n_layers: usize,
    /// Maximum sequence length / context window size.
    pub max_seq_len: usize,
    /// Seed for the synthetic weights.
    pub seed: u64,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            n_vocab: 32,
            n_embd: 16,
            n_layers: 2,
            max_seq_len: 64,
            seed: 0,
        }
    }
}

struct ReferenceLayer {
    wq: Vec<f32>,
    wk: Vec<f32>,
    wv: Vec<f32>,
    wo: Vec<f32>,
}

/// A small single-head causal attention model with seeded random weights.
///
/// It has no learned behaviour, but its output depends on every cached
/// key/value row, so any cache corruption or missed position changes the
/// logits. Weight matrices are stored in [out_dim, in_dim] row-major layout.
pub struct ReferenceModel {
    config: ReferenceConfig,
    token_embd: Vec<f32>,
    layers: Vec<ReferenceLayer>,
    output: Vec<f32>,
}

impl ReferenceModel {
    pub fn new(config: ReferenceConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let d = config.n_embd;
        let scale = 1.0 / (d.max(1) as f32).sqrt();
        let mut init = |n: usize| -> Vec<f32> {
            (0..n).map(|_| rng.gen_range(-scale..=scale)).collect()
        };

        let token_embd = init(config.n_vocab * d);
        let layers = (0..config.n_layers)
            .map(|_| ReferenceLayer {
                wq: init(d * d),
                wk: init(d * d),
                wv: init(d * d),
                wo: init(d * d),
            })
            .collect();
        let output = init(config.n_vocab * d);

        log::info!(
            "Built reference model: {} layers, n_embd={}, n_vocab={}, context={}",
            config.n_layers,
            config.n_embd,
            config.n_vocab,
            config.max_seq_len
        );

        ReferenceModel {
            config,
            token_embd,
            layers,
            output,
        }
    }

    pub fn config(&self) -> &ReferenceConfig {
        &self.config
    }

    fn embed(&self, token: u32, pos: usize) -> Vec<f32> {
        let d = self.config.n_embd;
        let offset = token as usize * d;
        self.token_embd[offset..offset + d]
            .iter()
            .enumerate()
            .map(|(i, &e)| {
                let angle = pos as f32 / 10000f32.powf((i & !1) as f32 / d as f32);
                e + if i % 2 == 0 { angle.sin() } else { angle.cos() }
            })
            .collect()
    }
}

impl Model for ReferenceModel {
    fn forward(&mut self, tokens: &[u32], caches: &mut CacheSet) -> Result<Vec<f32>> {
        let cfg = self.config;
        let d = cfg.n_embd;

        if tokens.is_empty() {
            return Err(ModelError::EmptyInput);
        }
        if caches.n_layers() != cfg.n_layers {
            return Err(ModelError::CacheLayout {
                expected: cfg.n_layers,
                got: caches.n_layers(),
            });
        }
        if let Some(&token) = tokens.iter().find(|&&t| t as usize >= cfg.n_vocab) {
            return Err(ModelError::InvalidToken {
                token,
                vocab: cfg.n_vocab,
            });
        }

        // Validate capacity before any layer is written.
        let start_pos = caches.valid_len()?;
        let required = start_pos + tokens.len();
        if required > caches.capacity() {
            return Err(CacheError::CapacityExceeded {
                required,
                capacity: caches.capacity(),
            }
            .into());
        }

        let scale = 1.0 / (d as f32).sqrt();
        let mut last_hidden = None;

        for (t_idx, &token) in tokens.iter().enumerate() {
            let mut hidden = self.embed(token, start_pos + t_idx);

            for (layer_idx, layer) in self.layers.iter().enumerate() {
                let q = matvec(&layer.wq, &hidden, d, d);
                let k = matvec(&layer.wk, &hidden, d, d);
                let v = matvec(&layer.wv, &hidden, d, d);

                let cache = caches.layer_mut(layer_idx).ok_or(ModelError::CacheLayout {
                    expected: cfg.n_layers,
                    got: layer_idx,
                })?;
                cache.append(&k, &v)?;

                // Causal masking is implicit: the cache only holds positions
                // up to and including the current one.
                let seq_len = cache.len();
                let cached_k = cache.keys();
                let cached_v = cache.values();

                let scores: Vec<f32> = (0..seq_len)
                    .map(|s| dot(&q, &cached_k[s * d..(s + 1) * d]) * scale)
                    .collect();
                let max_score = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                let exps: Vec<f32> = scores.iter().map(|s| (s - max_score).exp()).collect();
                let exp_sum: f32 = exps.iter().sum();

                let mut attn = vec![0.0f32; d];
                for (s, e) in exps.iter().enumerate() {
                    let p = e / exp_sum;
                    for (a, &val) in attn.iter_mut().zip(&cached_v[s * d..(s + 1) * d]) {
                        *a += p * val;
                    }
                }

                let proj = matvec(&layer.wo, &attn, d, d);
                for (h, p) in hidden.iter_mut().zip(&proj) {
                    *h += p;
                }
            }
            last_hidden = Some(hidden);
        }

        let hidden = last_hidden.ok_or(ModelError::EmptyInput)?;
        Ok(matvec(&self.output, &hidden, cfg.n_vocab, d))
    }

    fn vocab_size(&self) -> usize {
        self.config.n_vocab
    }

    fn cache_layout(&self) -> CacheLayout {
        CacheLayout {
            n_layers: self.config.n_layers,
            kv_dim: self.config.n_embd,
            max_seq_len: self.config.max_seq_len,
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn matvec(w: &[f32], x: &[f32], out_dim: usize, in_dim: usize) -> Vec<f32> {
    (0..out_dim)
        .map(|row| dot(&w[row * in_dim..(row + 1) * in_dim], x))
        .collect()
}
