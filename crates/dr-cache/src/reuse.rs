use crate::error::Result;
use crate::set::CacheSet;

/// Number of leading positions at which `previous` and `next` hold equal tokens.
pub fn shared_prefix_length(previous: &[u32], next: &[u32]) -> usize {
    previous
        .iter()
        .zip(next)
        .take_while(|(a, b)| a == b)
        .count()
}

/// How much of a new prompt can be served from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReusePlan {
    /// Leading tokens kept in the cache.
    pub shared: usize,
    /// Length of the new prompt.
    pub total: usize,
}

impl ReusePlan {
    /// Tokens that still have to go through the forward pass.
    pub fn suffix<'a>(&self, prompt: &'a [u32]) -> &'a [u32] {
        &prompt[self.shared..]
    }

    /// Number of tokens that still have to go through the forward pass.
    pub fn recompute_len(&self) -> usize {
        self.total - self.shared
    }

    /// Trim every layer of `caches` to the shared prefix.
    pub fn apply(&self, caches: &mut CacheSet) -> Result<()> {
        caches.reuse(self.total, self.shared)
    }
}

/// Trims caches to the longest prefix a new prompt shares with the tokens
/// already computed.
///
/// The last prompt token is never taken from the cache: the forward pass
/// always has at least one token to produce next-token logits from.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptCacheReuser;

impl PromptCacheReuser {
    pub fn new() -> Self {
        PromptCacheReuser
    }

    /// Compute the reuse plan for `next` given the computed history.
    pub fn plan(&self, previous: &[u32], next: &[u32]) -> ReusePlan {
        let max_useful = next.len().saturating_sub(1);
        ReusePlan {
            shared: shared_prefix_length(previous, next).min(max_useful),
            total: next.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::set::CacheLayout;
    use proptest::prelude::*;

    fn primed(tokens: usize) -> CacheSet {
        let mut set = CacheSet::for_layout(CacheLayout {
            n_layers: 2,
            kv_dim: 1,
            max_seq_len: 16,
        });
        let row = vec![0.5f32; tokens];
        for layer in set.iter_mut() {
            layer.append(&row, &row).unwrap();
        }
        set
    }

    #[test]
    fn test_shared_prefix_length_basic() {
        assert_eq!(shared_prefix_length(&[1, 2, 3], &[1, 2, 4]), 2);
        assert_eq!(shared_prefix_length(&[1, 2, 3], &[9, 2, 3]), 0);
        assert_eq!(shared_prefix_length(&[1, 2], &[1, 2, 3, 4]), 2);
        assert_eq!(shared_prefix_length(&[], &[1]), 0);
    }

    #[test]
    fn test_plan_extension() {
        let plan = PromptCacheReuser::new().plan(&[1, 2, 3, 4], &[1, 2, 3, 4, 5, 6]);
        assert_eq!(plan, ReusePlan { shared: 4, total: 6 });
        assert_eq!(plan.suffix(&[1, 2, 3, 4, 5, 6]), &[5, 6]);
    }

    #[test]
    fn test_plan_divergent() {
        let plan = PromptCacheReuser::new().plan(&[1, 2, 3], &[1, 9, 3]);
        assert_eq!(plan.shared, 1);
        assert_eq!(plan.suffix(&[1, 9, 3]), &[9, 3]);
    }

    #[test]
    fn test_plan_identical_keeps_last_token() {
        let plan = PromptCacheReuser::new().plan(&[1, 2, 3], &[1, 2, 3]);
        assert_eq!(plan.shared, 2);
        assert_eq!(plan.recompute_len(), 1);
    }

    #[test]
    fn test_plan_shorter_prompt() {
        let plan = PromptCacheReuser::new().plan(&[1, 2, 3, 4, 5], &[1, 2]);
        assert_eq!(plan.shared, 1);
        assert_eq!(plan.suffix(&[1, 2]), &[2]);
    }

    #[test]
    fn test_plan_empty_prompt() {
        let plan = PromptCacheReuser::new().plan(&[1, 2], &[]);
        assert_eq!(plan, ReusePlan { shared: 0, total: 0 });
    }

    #[test]
    fn test_apply_extension_trims_nothing() {
        let mut caches = primed(4);
        let plan = PromptCacheReuser::new().plan(&[1, 2, 3, 4], &[1, 2, 3, 4, 5, 6]);
        plan.apply(&mut caches).unwrap();
        assert_eq!(plan.shared, 4);
        assert_eq!(caches.valid_len().unwrap(), 4);
    }

    #[test]
    fn test_apply_divergent_trims() {
        let mut caches = primed(3);
        let plan = PromptCacheReuser::new().plan(&[1, 2, 3], &[1, 9, 3]);
        plan.apply(&mut caches).unwrap();
        assert_eq!(caches.valid_len().unwrap(), 1);
    }

    proptest! {
        #[test]
        fn prop_shared_prefix_symmetric(
            a in proptest::collection::vec(0u32..4, 0..24),
            b in proptest::collection::vec(0u32..4, 0..24),
        ) {
            prop_assert_eq!(shared_prefix_length(&a, &b), shared_prefix_length(&b, &a));
        }

        #[test]
        fn prop_shared_prefix_counts_equal_leading(
            a in proptest::collection::vec(0u32..4, 0..24),
            b in proptest::collection::vec(0u32..4, 0..24),
        ) {
            let k = shared_prefix_length(&a, &b);
            prop_assert!(k <= a.len().min(b.len()));
            prop_assert_eq!(&a[..k], &b[..k]);
            if k < a.len().min(b.len()) {
                prop_assert_ne!(a[k], b[k]);
            }
        }

        #[test]
        fn prop_self_prefix_is_clamped(a in proptest::collection::vec(0u32..8, 1..24)) {
            prop_assert_eq!(shared_prefix_length(&a, &a), a.len());
            prop_assert_eq!(PromptCacheReuser::new().plan(&a, &a).shared, a.len() - 1);
        }
    }
}
