use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use dr_cache::{CacheError, CacheSet, ReusePlan};
use dr_model::{Model, ModelError};

use crate::error::{DecodeError, Result};

enum Command {
    Reuse {
        plan: ReusePlan,
        reply: Sender<std::result::Result<(), CacheError>>,
    },
    Forward {
        tokens: Vec<u32>,
        reply: Sender<Forwarded>,
    },
    CacheLen {
        reply: Sender<std::result::Result<usize, CacheError>>,
    },
    Reset {
        reply: Sender<()>,
    },
}

struct Forwarded {
    logits: std::result::Result<Vec<f32>, ModelError>,
    elapsed: Duration,
}

/// A forward pass that has been dispatched but not yet collected.
#[must_use = "a dispatched forward pass must be waited on to commit its tokens"]
pub struct PendingForward {
    tokens: Vec<u32>,
    reply: Receiver<Forwarded>,
}

/// Outcome of a completed forward pass.
pub struct ForwardDone {
    /// Tokens that went through the model and are now held by every layer cache.
    pub tokens: Vec<u32>,
    /// Logits for the last of `tokens`.
    pub logits: Vec<f32>,
    pub elapsed: Duration,
}

impl PendingForward {
    /// Tokens this forward pass consumes.
    pub fn tokens(&self) -> &[u32] {
        &self.tokens
    }

    /// Block until the worker finishes.
    ///
    /// On failure the worker has already rolled every layer back to its
    /// length before the call.
    pub fn wait(self) -> Result<ForwardDone> {
        let done = self.reply.recv().map_err(|_| DecodeError::WorkerUnavailable)?;
        let logits = done.logits?;
        Ok(ForwardDone {
            tokens: self.tokens,
            logits,
            elapsed: done.elapsed,
        })
    }
}

/// Owns the model and its caches on a dedicated thread.
///
/// Forward passes are dispatched without blocking; cache maintenance
/// commands are synchronous. Commands run strictly in the order they were
/// sent, so a forward pass always sees every earlier reuse or reset.
pub struct ForwardWorker {
    commands: Option<Sender<Command>>,
    handle: Option<JoinHandle<()>>,
    capacity: usize,
    vocab_size: usize,
}

impl ForwardWorker {
    pub fn spawn<M: Model + 'static>(model: M) -> Result<Self> {
        let caches = model.make_caches();
        let capacity = caches.capacity();
        let vocab_size = model.vocab_size();

        let (tx, rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("dr-forward".to_string())
            .spawn(move || run(model, caches, rx))?;

        Ok(ForwardWorker {
            commands: Some(tx),
            handle: Some(handle),
            capacity,
            vocab_size,
        })
    }

    /// Number of positions the caches can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// Queue a forward pass over `tokens` and return immediately.
    pub fn dispatch(&self, tokens: Vec<u32>) -> Result<PendingForward> {
        let (reply, rx) = mpsc::channel();
        self.send(Command::Forward {
            tokens: tokens.clone(),
            reply,
        })?;
        Ok(PendingForward { tokens, reply: rx })
    }

    /// Trim every layer cache according to `plan`.
    pub fn reuse(&self, plan: ReusePlan) -> Result<()> {
        Ok(self.request(|reply| Command::Reuse { plan, reply })??)
    }

    /// Common valid length of the layer caches.
    pub fn cache_len(&self) -> Result<usize> {
        Ok(self.request(|reply| Command::CacheLen { reply })??)
    }

    pub fn reset(&self) -> Result<()> {
        self.request(|reply| Command::Reset { reply })
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .as_ref()
            .ok_or(DecodeError::WorkerUnavailable)?
            .send(command)
            .map_err(|_| DecodeError::WorkerUnavailable)
    }

    fn request<T>(&self, make: impl FnOnce(Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = mpsc::channel();
        self.send(make(reply))?;
        rx.recv().map_err(|_| DecodeError::WorkerUnavailable)
    }
}

impl Drop for ForwardWorker {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop.
        self.commands.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Forward worker panicked");
            }
        }
    }
}

fn run<M: Model>(mut model: M, mut caches: CacheSet, commands: Receiver<Command>) {
    for command in commands {
        match command {
            Command::Reuse { plan, reply } => {
                let _ = reply.send(plan.apply(&mut caches));
            }
            Command::Forward { tokens, reply } => {
                let before = caches.valid_len();
                let tic = Instant::now();
                let logits = model.forward(&tokens, &mut caches);
                let elapsed = tic.elapsed();
                if logits.is_err() {
                    if let Ok(len) = before {
                        caches.rollback(len);
                    }
                }
                let _ = reply.send(Forwarded { logits, elapsed });
            }
            Command::CacheLen { reply } => {
                let _ = reply.send(caches.valid_len());
            }
            Command::Reset { reply } => {
                caches.reset();
                let _ = reply.send(());
            }
        }
    }
}
