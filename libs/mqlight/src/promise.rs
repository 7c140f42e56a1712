//! Single-assignment completion handle
//!
//! Every asynchronous result in the client is reported through a [`Promise`].
//! The first `complete` or `fail` wins; later attempts are ignored, which
//! lets a timer firing race an explicit cancel without harm.

use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

use crate::error::ClientError;
use crate::services::{CallbackService, OrderingContext};

type Listener<T> = Box<dyn FnOnce(Result<&T, &ClientError>) + Send>;

struct Dispatch {
    callbacks: Arc<dyn CallbackService>,
    ordering: OrderingContext,
}

struct Shared<T> {
    outcome: OnceLock<Result<T, ClientError>>,
    listener: Mutex<Option<Listener<T>>>,
    dispatch: Option<Dispatch>,
}

/// Handle to the outcome of one asynchronous operation.
///
/// Cloning the handle shares the underlying state.
pub struct Promise<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Promise<T> {
    /// Whether the promise has been completed or failed
    pub fn is_done(&self) -> bool {
        self.shared.outcome.get().is_some()
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("done", &self.is_done())
            .finish()
    }
}

impl<T: Send + Sync + 'static> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> Promise<T> {
    /// Create a promise whose listener runs on the completing thread.
    pub fn new() -> Self {
        Self::with_dispatch(None)
    }

    /// Create a promise whose listener is always handed to `callbacks`
    /// under `ordering`, never run directly by the completing or
    /// registering thread.
    pub fn dispatched(callbacks: Arc<dyn CallbackService>, ordering: OrderingContext) -> Self {
        Self::with_dispatch(Some(Dispatch { callbacks, ordering }))
    }

    fn with_dispatch(dispatch: Option<Dispatch>) -> Self {
        Self {
            shared: Arc::new(Shared {
                outcome: OnceLock::new(),
                listener: Mutex::new(None),
                dispatch,
            }),
        }
    }

    /// Record success. Returns `false` if the promise was already done.
    pub fn complete(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Record failure. Returns `false` if the promise was already done.
    pub fn fail(&self, cause: ClientError) -> bool {
        self.settle(Err(cause))
    }

    /// Register the listener.
    ///
    /// Fires once: when the promise completes, or straight away if it already
    /// has. Only one listener is kept; a second registration while the first
    /// is still pending is dropped.
    pub fn on_complete<F>(&self, listener: F)
    where
        F: FnOnce(Result<&T, &ClientError>) + Send + 'static,
    {
        let mut slot = lock(&self.shared.listener);
        if self.shared.outcome.get().is_none() {
            if slot.is_some() {
                log::warn!("MQLight: promise already has a listener, ignoring another");
                return;
            }
            *slot = Some(Box::new(listener));
            return;
        }
        drop(slot);
        self.notify(Box::new(listener));
    }

    /// Snapshot of the outcome, if any
    pub fn result(&self) -> Option<Result<T, ClientError>>
    where
        T: Clone,
    {
        self.shared.outcome.get().cloned()
    }

    fn settle(&self, outcome: Result<T, ClientError>) -> bool {
        let mut slot = lock(&self.shared.listener);
        if self.shared.outcome.set(outcome).is_err() {
            return false;
        }
        let listener = slot.take();
        drop(slot);
        if let Some(listener) = listener {
            self.notify(listener);
        }
        true
    }

    fn notify(&self, listener: Listener<T>) {
        match &self.shared.dispatch {
            None => self.invoke(listener),
            Some(dispatch) => {
                let promise = self.clone();
                dispatch.callbacks.run(
                    Box::new(move || promise.invoke(listener)),
                    &dispatch.ordering,
                    Promise::new(),
                );
            }
        }
    }

    fn invoke(&self, listener: Listener<T>) {
        if let Some(outcome) = self.shared.outcome.get() {
            listener(outcome.as_ref());
        }
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
