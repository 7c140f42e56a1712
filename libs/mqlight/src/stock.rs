//! Ready-made collaborators
//!
//! Enough to run a client without an event loop of your own. Requires the
//! `stock-services` feature (on by default).

use std::thread;
use std::time::Duration;

use crate::error::ClientError;
use crate::promise::Promise;
use crate::services::{CallbackService, Endpoint, EndpointService, OrderingContext, TimerService, Work};

/// Runs work inline on the submitting thread.
///
/// Honours the ordering contract as long as callers do not submit work for
/// the same context from several threads at once.
#[derive(Debug, Default, Clone, Copy)]
pub struct SameThreadCallbackService;

impl CallbackService for SameThreadCallbackService {
    fn run(&self, work: Work, _ordering: &OrderingContext, promise: Promise<()>) {
        work();
        promise.complete(());
    }
}

/// Always resolves to the same endpoint
#[derive(Debug, Clone)]
pub struct SingleEndpointService {
    endpoint: Endpoint,
}

impl SingleEndpointService {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    /// Build from an `amqp://` or `amqps://` URI
    pub fn from_uri(uri: &str) -> Result<Self, ClientError> {
        Endpoint::parse(uri).map(Self::new)
    }
}

impl EndpointService for SingleEndpointService {
    fn lookup(&self, promise: Promise<Endpoint>) {
        promise.complete(self.endpoint.clone());
    }
}

/// One sleeping thread per scheduled promise.
///
/// Cancelling fails the promise with `ClientError::Stopped`; the sleeper's
/// later completion attempt is then a no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadTimerService;

impl TimerService for ThreadTimerService {
    fn schedule(&self, delay: Duration, promise: Promise<()>) {
        let spawned = thread::Builder::new()
            .name("mqlight-timer".into())
            .spawn({
                let promise = promise.clone();
                move || {
                    thread::sleep(delay);
                    promise.complete(());
                }
            });
        if let Err(e) = spawned {
            log::error!("MQLight: failed to spawn timer thread: {}", e);
            promise.fail(ClientError::Other(format!("timer thread: {}", e)));
        }
    }

    fn cancel(&self, promise: &Promise<()>) {
        promise.fail(ClientError::Stopped);
    }
}
