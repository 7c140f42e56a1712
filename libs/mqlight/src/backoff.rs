//! Retry policy: failure classification and exponential backoff
//!
//! A failed endpoint lookup is first classified. Retryable failures wait
//! `delay[n] = min(initial * multiplier^(n-1), max)`, shortened by a random
//! jitter fraction, before the next lookup. Fatal failures stop the client.

use std::fmt;
use std::time::Duration;

use rand::Rng;

use crate::error::ClientError;

/// What to do about a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Back off and try again
    Retry,
    /// Give up and stop the client
    Fatal,
}

/// Decides whether a failure cause is worth retrying
pub trait FailureClassifier: Send + Sync + fmt::Debug {
    fn classify(&self, cause: &ClientError) -> Recovery;
}

/// Retries network failures; everything else, including causes it does not
/// recognise, is fatal.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultClassifier;

impl FailureClassifier for DefaultClassifier {
    fn classify(&self, cause: &ClientError) -> Recovery {
        match cause {
            ClientError::Network(_) => Recovery::Retry,
            _ => Recovery::Fatal,
        }
    }
}

/// Exponential backoff controller
#[derive(Debug, Clone)]
pub struct Backoff {
    initial_delay: Duration,
    current_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    /// Fraction of each delay that may be randomly removed (0.0..=1.0)
    jitter: f64,
    attempt: u32,
    max_attempts: Option<u32>,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            initial_delay: initial,
            current_delay: initial,
            max_delay: max,
            multiplier: multiplier.max(1.0),
            jitter: 0.0,
            attempt: 0,
            max_attempts: None,
        }
    }

    /// Set the jitter fraction, clamped to `0.0..=1.0`.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Give up after `max` retries.
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = Some(max);
        self
    }

    /// Back to the initial delay; called once the client has started.
    pub fn reset(&mut self) {
        self.current_delay = self.initial_delay;
        self.attempt = 0;
    }

    /// The next delay, or `None` once the attempt limit is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if self.attempt >= max {
                return None;
            }
        }
        self.attempt += 1;

        let delay = self.current_delay;
        let next = self.current_delay.as_secs_f64() * self.multiplier;
        self.current_delay = Duration::from_secs_f64(next.min(self.max_delay.as_secs_f64()));

        if self.jitter > 0.0 {
            let cut = rand::thread_rng().gen_range(0.0..self.jitter);
            Some(delay.mul_f64(1.0 - cut))
        } else {
            Some(delay)
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }
}

impl Default for Backoff {
    /// 1s doubling to a 60s cap, up to 25% jitter, retries forever.
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60), 2.0).with_jitter(0.25)
    }
}
