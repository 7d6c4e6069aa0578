//! Fixed-batch pacing for the exact-match phase.
//!
//! After every `batch` calls the pacer blocks for `pause` before letting
//! the next call through. A run of `n` calls therefore pauses
//! `(n - 1) / batch` times: no pause trails the final call.

use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingPolicy {
    /// Calls per batch. `0` disables pacing.
    pub batch: usize,
    pub pause: Duration,
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self {
            batch: 50,
            pause: Duration::from_secs(1),
        }
    }
}

impl PacingPolicy {
    pub fn disabled() -> Self {
        Self {
            batch: 0,
            pause: Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.batch > 0 && !self.pause.is_zero()
    }
}

/// How a pause is carried out. Tests substitute a recorder.
pub trait Pause {
    fn pause(&mut self, duration: Duration);
}

/// Blocking sleep on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleep;

impl Pause for ThreadSleep {
    fn pause(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[derive(Debug)]
pub struct Pacer<P = ThreadSleep> {
    policy: PacingPolicy,
    calls: usize,
    pauses: usize,
    sleeper: P,
}

impl Pacer<ThreadSleep> {
    pub fn new(policy: PacingPolicy) -> Self {
        Self::with_pause(policy, ThreadSleep)
    }
}

impl<P: Pause> Pacer<P> {
    pub fn with_pause(policy: PacingPolicy, sleeper: P) -> Self {
        Self {
            policy,
            calls: 0,
            pauses: 0,
            sleeper,
        }
    }

    /// Call immediately before each paced request.
    pub fn before_call(&mut self) {
        if self.policy.is_enabled() && self.calls > 0 && self.calls % self.policy.batch == 0 {
            tracing::debug!(
                calls = self.calls,
                pause_ms = self.policy.pause.as_millis() as u64,
                "pacing pause"
            );
            self.sleeper.pause(self.policy.pause);
            self.pauses += 1;
        }
        self.calls += 1;
    }

    /// Start a new batch count. The next call never pauses.
    pub fn reset_batch(&mut self) {
        self.calls = 0;
    }

    pub fn calls(&self) -> usize {
        self.calls
    }

    pub fn pauses(&self) -> usize {
        self.pauses
    }

    pub fn sleeper(&self) -> &P {
        &self.sleeper
    }
}
