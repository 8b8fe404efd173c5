use approx::assert_abs_diff_eq;
use dr_engine::{
    ConstraintAdapter, ConstraintError, DecodeConfig, DecodeLoop, LoopState, ReusePlan,
    SampleFn, SamplerConfig,
};
use dr_model::{ReferenceConfig, ReferenceModel};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn model(max_seq_len: usize) -> ReferenceModel {
    ReferenceModel::new(ReferenceConfig {
        max_seq_len,
        seed: 7,
        ..ReferenceConfig::default()
    })
}

fn greedy(max_seq_len: usize) -> DecodeLoop {
    DecodeLoop::new(model(max_seq_len), DecodeConfig::new(SamplerConfig::greedy())).unwrap()
}

fn first_logprobs(engine: &mut DecodeLoop, prompt: &[u32]) -> Vec<f32> {
    engine.inference(prompt).unwrap().next().unwrap().unwrap().logprobs
}

fn take_tokens(engine: &mut DecodeLoop, prompt: &[u32], config: &SamplerConfig, n: usize) -> Vec<u32> {
    engine
        .inference_with(prompt, config)
        .unwrap()
        .take(n)
        .filter_map(|step| step.unwrap().token())
        .collect()
}

#[test]
fn test_reused_prefix_matches_cold_run() {
    init_logging();
    let prompt = [3, 14, 15, 9, 2, 6];

    let mut cold = greedy(64);
    let expected = first_logprobs(&mut cold, &prompt);

    let mut warm = greedy(64);
    drop(warm.inference(&prompt[..4]).unwrap());
    let mut stream = warm.inference(&prompt).unwrap();
    assert_eq!(stream.reused(), ReusePlan { shared: 4, total: 6 });
    let got = stream.next().unwrap().unwrap().logprobs;

    assert_eq!(got.len(), expected.len());
    for (g, e) in got.iter().zip(&expected) {
        assert_abs_diff_eq!(g, e, epsilon = 1e-4);
    }
}

#[test]
fn test_extension_reuses_whole_history() {
    let mut engine = greedy(64);
    drop(engine.inference(&[1, 2, 3, 4]).unwrap());
    assert_eq!(engine.history(), &[1, 2, 3, 4]);
    assert_eq!(engine.cache_len().unwrap(), 4);

    let stream = engine.inference(&[1, 2, 3, 4, 5, 6]).unwrap();
    let plan = stream.reused();
    assert_eq!(plan.shared, 4);
    assert_eq!(plan.suffix(&[1, 2, 3, 4, 5, 6]), &[5, 6]);
}

#[test]
fn test_divergent_prompt_trims_then_regrows() {
    let mut engine = greedy(64);
    drop(engine.inference(&[1, 2, 3]).unwrap());

    let stream = engine.inference(&[1, 9, 3]).unwrap();
    assert_eq!(stream.reused().shared, 1);
    drop(stream);

    assert_eq!(engine.history(), &[1, 9, 3]);
    assert_eq!(engine.cache_len().unwrap(), 3);
}

#[test]
fn test_identical_prompt_recomputes_last_token() {
    let mut engine = greedy(64);
    let prompt = [5, 6, 7];
    let before = first_logprobs(&mut engine, &prompt);

    let stream = engine.inference(&prompt).unwrap();
    assert_eq!(stream.reused(), ReusePlan { shared: 2, total: 3 });
    drop(stream);

    let again = first_logprobs(&mut engine, &prompt);
    for (a, b) in again.iter().zip(&before) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-4);
    }
}

#[test]
fn test_cache_grows_by_one_per_step() {
    let mut engine = greedy(64);
    let prompt = [8, 1, 8];
    let steps = 5;
    {
        let mut stream = engine.inference(&prompt).unwrap();
        for _ in 0..steps {
            stream.next().unwrap().unwrap();
        }
    }
    // Dropping the stream commits the step that was already in flight.
    assert_eq!(engine.history().len(), prompt.len() + steps);
    assert_eq!(engine.cache_len().unwrap(), prompt.len() + steps);
    assert_eq!(engine.state(), LoopState::Stopped);
}

#[test]
fn test_cancellation_leaves_loop_reusable() {
    init_logging();
    let prompt = [4, 4, 2, 19];
    let config = SamplerConfig::greedy();

    let mut engine = greedy(64);
    let partial = take_tokens(&mut engine, &prompt, &config, 3);

    // Re-prime with the same prompt after abandoning mid-stream.
    let resumed = take_tokens(&mut engine, &prompt, &config, 6);

    let mut cold = greedy(64);
    let reference = take_tokens(&mut cold, &prompt, &config, 6);

    assert_eq!(resumed, reference);
    assert_eq!(&reference[..3], partial.as_slice());
}

#[test]
fn test_greedy_is_deterministic() {
    let config = SamplerConfig::greedy();
    let a = take_tokens(&mut greedy(64), &[1, 2, 3], &config, 8);
    let b = take_tokens(&mut greedy(64), &[1, 2, 3], &config, 8);
    assert_eq!(a, b);
}

#[test]
fn test_seed_reproduces_sampled_tokens() {
    let config = SamplerConfig::default().with_temperature(1.5).with_seed(42);
    let mut engine = greedy(64);
    let first = take_tokens(&mut engine, &[10, 11], &config, 8);

    engine.reset().unwrap();
    let second = take_tokens(&mut engine, &[10, 11], &config, 8);
    assert_eq!(first, second);
}

#[test]
fn test_invalid_sampler_config_leaves_cache_alone() {
    let mut engine = greedy(64);
    drop(engine.inference(&[1, 2, 3]).unwrap());

    let bad = SamplerConfig::default().with_min_p(1.5, 1);
    let err = engine.inference_with(&[9, 9], &bad).err().unwrap();
    assert!(err.is_invalid_sampler_config());
    assert_eq!(engine.history(), &[1, 2, 3]);
    assert_eq!(engine.cache_len().unwrap(), 3);
}

#[test]
fn test_invalid_default_config_rejected_at_construction() {
    let config = DecodeConfig::new(SamplerConfig::default().with_temperature(f32::NAN));
    let err = DecodeLoop::new(model(16), config).err().unwrap();
    assert!(err.is_invalid_sampler_config());
}

#[test]
fn test_capacity_exceeded() {
    let mut engine = greedy(6);
    let err = engine.inference(&[1, 2, 3, 4, 5, 6, 7]).err().unwrap();
    assert!(err.is_capacity_exceeded());
    assert_eq!(engine.cache_len().unwrap(), 0);

    let steps: Vec<_> = engine.inference(&[1, 2, 3, 4]).unwrap().collect();
    // Four prompt positions leave room for two fed-back tokens. The third
    // output's token no longer fits, and the next call reports it.
    assert_eq!(steps.len(), 4);
    assert!(steps[..3].iter().all(|s| s.is_ok()));
    assert!(steps[3].as_ref().unwrap_err().is_capacity_exceeded());
    assert_eq!(engine.cache_len().unwrap(), 6);
}

/// Restricts output to tokens below `limit` and reports being inside a value
/// once `open` tokens have been emitted.
struct Below {
    limit: usize,
    open: usize,
    emitted: usize,
}

impl ConstraintAdapter for Below {
    fn transform(&mut self, mut logits: Vec<f32>) -> Result<Vec<f32>, ConstraintError> {
        for l in logits.iter_mut().skip(self.limit) {
            *l = f32::NEG_INFINITY;
        }
        Ok(logits)
    }

    fn sample(
        &mut self,
        logprobs: &[f32],
        sampler: &mut SampleFn<'_>,
        config: &SamplerConfig,
    ) -> Result<Vec<u32>, ConstraintError> {
        let token = sampler(logprobs, config)?;
        self.emitted += 1;
        Ok(vec![token])
    }

    fn is_within_value(&self) -> bool {
        self.emitted >= self.open
    }
}

#[test]
fn test_constrained_decoding() {
    init_logging();
    let adapter = Below {
        limit: 4,
        open: 2,
        emitted: 0,
    };
    let config = DecodeConfig::new(SamplerConfig::default().with_seed(3));
    let mut engine = DecodeLoop::constrained(model(64), Box::new(adapter), config).unwrap();

    let steps: Vec<_> = engine
        .inference(&[20, 21, 22])
        .unwrap()
        .take(5)
        .map(|s| s.unwrap())
        .collect();

    for step in &steps {
        assert!(step.token().unwrap() < 4);
        assert!(step.logprobs[4..].iter().all(|&l| l == f32::NEG_INFINITY));
        let mass: f32 = step.logprobs[..4].iter().map(|l| l.exp()).sum();
        assert_abs_diff_eq!(mass, 1.0, epsilon = 1e-4);
    }
    let within: Vec<bool> = steps.iter().map(|s| s.within_value).collect();
    assert_eq!(within, vec![false, true, true, true, true]);
}
