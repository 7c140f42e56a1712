//! Non-blocking MQ Light client
//!
//! Lifecycle: `Starting -> Started <-> Retrying -> Stopping -> Stopped`.
//!
//! All state changes happen in [`Inner::dispatch`], on whichever thread raised
//! the event. A small mailbox lets only one thread drain events at a time;
//! anything raised meanwhile (a collaborator that completes a promise inline,
//! another thread calling `send`) queues behind the event being handled, so
//! events are processed strictly in arrival order. Side effects are collected
//! while the machine lock is held and performed after it is released.
//!
//! Application code (client listener notices, message deliveries, promise
//! listeners) only ever runs on the callback service under the client's
//! ordering context.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use rand::Rng;

use crate::backoff::{Backoff, FailureClassifier, Recovery};
use crate::error::ClientError;
use crate::listener::{
    ClientListener, CompletionListener, Delivery, DestinationListener, ListenerContext, Payload,
    Properties, Subscription,
};
use crate::options::{ClientOptions, SendOptions, SubscribeOptions};
use crate::promise::{lock, Promise};
use crate::services::{
    CallbackService, Endpoint, EndpointService, OrderingContext, ProtocolEngine, TimerService,
};
use crate::topic::{encode_topic, subscription_address};
use crate::{validate, AUTO_ID_PREFIX};

/// Client lifecycle state
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Starting = 0,
    Started = 1,
    Retrying = 2,
    Stopping = 3,
    Stopped = 4,
}

impl ClientState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Starting,
            1 => Self::Started,
            2 => Self::Retrying,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Retrying => "retrying",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

type Key = (String, Option<String>);

// ============================================================================
// Internal messages
// ============================================================================

/// An application request waiting to reach the engine
enum Operation {
    Send {
        topic: String,
        payload: Payload,
        properties: Properties,
        options: SendOptions,
        promise: Promise<()>,
    },
    Subscribe {
        key: Key,
        options: SubscribeOptions,
        destination: Arc<dyn DestinationListener>,
        context: Option<ListenerContext>,
        promise: Promise<()>,
    },
    Unsubscribe {
        key: Key,
        promise: Promise<()>,
    },
}

impl Operation {
    fn into_promise(self) -> Promise<()> {
        match self {
            Operation::Send { promise, .. }
            | Operation::Subscribe { promise, .. }
            | Operation::Unsubscribe { promise, .. } => promise,
        }
    }
}

/// What an engine call was for, so its completion can be booked
enum Done {
    Sent(Promise<()>),
    Subscribed(Key, Promise<()>),
    Resubscribed(Key),
    Unsubscribed(Key, Promise<()>),
}

/// Engine request, addresses already encoded
enum Call {
    Send {
        address: String,
        payload: Payload,
        properties: Properties,
        options: SendOptions,
    },
    Subscribe {
        address: String,
        options: SubscribeOptions,
        sink: DeliverySink,
    },
    Unsubscribe {
        address: String,
    },
}

enum Event {
    LookupDone {
        generation: u64,
        outcome: Result<Endpoint, ClientError>,
    },
    RetryTimerFired {
        generation: u64,
    },
    Submit(Operation),
    EngineDone {
        generation: u64,
        done: Done,
        outcome: Result<(), ClientError>,
    },
    Deliver(Key, Delivery),
    Stop(Promise<()>),
}

enum Notice {
    Started,
    Restarted,
    Retrying(ClientError),
    Stopped(Option<ClientError>),
}

enum Effect {
    Lookup(u64),
    Schedule(Duration, Promise<()>, u64),
    CancelTimer(Promise<()>),
    Connected(Endpoint),
    Execute {
        endpoint: Endpoint,
        call: Call,
        done: Done,
        generation: u64,
    },
    Complete(Promise<()>),
    Fail(Promise<()>, ClientError),
    Notify(Notice),
    Deliver(Arc<dyn DestinationListener>, Option<ListenerContext>, Delivery),
    Unsubscribed(Arc<dyn DestinationListener>, Option<ListenerContext>, Key),
}

// ============================================================================
// State
// ============================================================================

struct Active {
    options: SubscribeOptions,
    destination: Arc<dyn DestinationListener>,
    context: Option<ListenerContext>,
    /// The broker has accepted the link
    confirmed: bool,
}

struct Machine {
    state: ClientState,
    endpoint: Option<Endpoint>,
    pending: VecDeque<Operation>,
    subscriptions: HashMap<Key, Active>,
    backoff: Backoff,
    retry_timer: Option<Promise<()>>,
    has_started: bool,
    /// Bumped whenever in-flight lookups, timers and engine calls go stale
    generation: u64,
}

#[derive(Default)]
struct Mailbox {
    events: VecDeque<Event>,
    busy: bool,
}

struct Inner {
    id: String,
    ordering: OrderingContext,
    state: AtomicU8,
    endpoints: Arc<dyn EndpointService>,
    callbacks: Arc<dyn CallbackService>,
    engine: Arc<dyn ProtocolEngine>,
    timers: Arc<dyn TimerService>,
    classifier: Arc<dyn FailureClassifier>,
    /// Client-wide credentials, used when a resolved endpoint carries none
    credentials: Option<(String, String)>,
    listener: Option<Arc<dyn ClientListener>>,
    context: Option<ListenerContext>,
    machine: Mutex<Machine>,
    mailbox: Mutex<Mailbox>,
}

// ============================================================================
// Public handle
// ============================================================================

/// Handle to a client. Clones share the same client.
#[derive(Clone)]
pub struct NonBlockingClient {
    inner: Arc<Inner>,
}

impl fmt::Debug for NonBlockingClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NonBlockingClient")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}

impl NonBlockingClient {
    /// Create a client and start looking for a broker.
    ///
    /// The four services are required; options, listener and context are not.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        endpoint_service: Option<Arc<dyn EndpointService>>,
        callback_service: Option<Arc<dyn CallbackService>>,
        engine: Option<Arc<dyn ProtocolEngine>>,
        timer_service: Option<Arc<dyn TimerService>>,
        options: Option<ClientOptions>,
        listener: Option<Arc<dyn ClientListener>>,
        context: Option<ListenerContext>,
    ) -> Result<Self, ClientError> {
        let endpoints = validate::required("endpoint service", endpoint_service)?;
        let callbacks = validate::required("callback service", callback_service)?;
        let engine = validate::required("protocol engine", engine)?;
        let timers = validate::required("timer service", timer_service)?;
        let options = options.unwrap_or_default();

        let id = match options.id() {
            Some(id) => id.to_string(),
            None => generate_id(),
        };

        let inner = Arc::new(Inner {
            ordering: OrderingContext::new(&id),
            state: AtomicU8::new(ClientState::Starting as u8),
            endpoints,
            callbacks,
            engine,
            timers,
            classifier: options.classifier().clone(),
            credentials: options
                .user()
                .zip(options.password())
                .map(|(user, password)| (user.to_string(), password.to_string())),
            listener,
            context,
            machine: Mutex::new(Machine {
                state: ClientState::Starting,
                endpoint: None,
                pending: VecDeque::new(),
                subscriptions: HashMap::new(),
                backoff: options.backoff().clone(),
                retry_timer: None,
                has_started: false,
                generation: 0,
            }),
            mailbox: Mutex::new(Mailbox::default()),
            id,
        });

        log::info!("MQLight: client {} starting", inner.id);
        inner.apply(Effect::Lookup(0));

        Ok(Self { inner })
    }

    /// Client identifier
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Current lifecycle state. Never blocks.
    pub fn state(&self) -> ClientState {
        ClientState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// Endpoint the client is currently started on
    pub fn endpoint(&self) -> Option<Endpoint> {
        lock(&self.inner.machine).endpoint.clone()
    }

    /// Subscriptions the broker has accepted
    pub fn subscriptions(&self) -> Vec<Subscription> {
        let machine = lock(&self.inner.machine);
        machine
            .subscriptions
            .iter()
            .filter(|(_, active)| active.confirmed)
            .map(|((topic_pattern, share), active)| Subscription {
                topic_pattern: topic_pattern.clone(),
                share: share.clone(),
                options: active.options.clone(),
            })
            .collect()
    }

    /// Send a message to `topic`.
    ///
    /// Runs straight away when started, otherwise queued until the client
    /// starts.
    ///
    /// A promise keeps a single listener. When `listener` is given it takes
    /// that slot, and a [`Promise::on_complete`] registered on the returned
    /// promise while the send is in flight is ignored. Pass `None` to attach
    /// your own closure instead.
    pub fn send(
        &self,
        topic: Option<&str>,
        data: Option<Payload>,
        properties: Option<Properties>,
        options: Option<SendOptions>,
        listener: Option<Arc<dyn CompletionListener>>,
        context: Option<ListenerContext>,
    ) -> Result<Promise<()>, ClientError> {
        let topic = validate::required("topic", topic)?;
        let payload = validate::required("data", data)?;

        let promise = self.completion(listener, context);
        log::debug!("MQLight: {} send to {} ({} bytes)", self.inner.id, topic, payload.len());
        self.inner.dispatch(Event::Submit(Operation::Send {
            topic: topic.to_string(),
            payload,
            properties: properties.unwrap_or_default(),
            options: options.unwrap_or_default(),
            promise: promise.clone(),
        }));
        Ok(promise)
    }

    /// Subscribe to `topic_pattern`, optionally as part of `share`.
    ///
    /// Messages go to `destination`; `context` is handed to both listeners.
    /// As with [`send`](Self::send), a supplied `listener` occupies the
    /// returned promise's only listener slot.
    pub fn subscribe(
        &self,
        topic_pattern: Option<&str>,
        share: Option<&str>,
        options: Option<SubscribeOptions>,
        destination: Option<Arc<dyn DestinationListener>>,
        listener: Option<Arc<dyn CompletionListener>>,
        context: Option<ListenerContext>,
    ) -> Result<Promise<()>, ClientError> {
        let topic_pattern = validate::required("topic pattern", topic_pattern)?;
        let destination = validate::required("destination listener", destination)?;
        validate::share(share)?;

        let promise = self.completion(listener, context.clone());
        log::debug!("MQLight: {} subscribe to {} (share: {:?})", self.inner.id, topic_pattern, share);
        self.inner.dispatch(Event::Submit(Operation::Subscribe {
            key: (topic_pattern.to_string(), share.map(str::to_string)),
            options: options.unwrap_or_default(),
            destination,
            context,
            promise: promise.clone(),
        }));
        Ok(promise)
    }

    /// Remove a subscription. `ttl`, when given, must be zero.
    ///
    /// A supplied `listener` occupies the returned promise's only listener
    /// slot.
    pub fn unsubscribe(
        &self,
        topic_pattern: Option<&str>,
        share: Option<&str>,
        ttl: Option<i64>,
        listener: Option<Arc<dyn CompletionListener>>,
        context: Option<ListenerContext>,
    ) -> Result<Promise<()>, ClientError> {
        let topic_pattern = validate::required("topic pattern", topic_pattern)?;
        validate::share(share)?;
        validate::unsubscribe_ttl(ttl)?;

        let promise = self.completion(listener, context);
        log::debug!("MQLight: {} unsubscribe from {} (share: {:?})", self.inner.id, topic_pattern, share);
        self.inner.dispatch(Event::Submit(Operation::Unsubscribe {
            key: (topic_pattern.to_string(), share.map(str::to_string)),
            promise: promise.clone(),
        }));
        Ok(promise)
    }

    /// Stop the client. Pending operations fail with `ClientError::Stopped`.
    ///
    /// A supplied `listener` occupies the returned promise's only listener
    /// slot.
    pub fn stop(
        &self,
        listener: Option<Arc<dyn CompletionListener>>,
        context: Option<ListenerContext>,
    ) -> Promise<()> {
        let promise = self.completion(listener, context);
        self.inner.dispatch(Event::Stop(promise.clone()));
        promise
    }

    fn completion(
        &self,
        listener: Option<Arc<dyn CompletionListener>>,
        context: Option<ListenerContext>,
    ) -> Promise<()> {
        let promise = Promise::dispatched(self.inner.callbacks.clone(), self.inner.ordering.clone());
        if let Some(listener) = listener {
            let weak = Arc::downgrade(&self.inner);
            promise.on_complete(move |outcome| {
                let Some(inner) = weak.upgrade() else { return };
                let client = NonBlockingClient { inner };
                match outcome {
                    Ok(()) => listener.on_success(&client, context.as_ref()),
                    Err(cause) => listener.on_error(&client, context.as_ref(), cause),
                }
            });
        }
        promise
    }
}

fn generate_id() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..0x1000_0000);
    format!("{}{:07x}", AUTO_ID_PREFIX, suffix)
}

/// Where a protocol engine hands inbound messages for one subscription
#[derive(Debug, Clone)]
pub struct DeliverySink {
    inner: Weak<Inner>,
    key: Key,
}

impl DeliverySink {
    /// Queue a message for the subscription's destination listener.
    /// Returns `false` once the client is gone.
    pub fn deliver(
        &self,
        topic: impl Into<String>,
        payload: Payload,
        properties: Properties,
        ttl: Option<u64>,
    ) -> bool {
        let Some(inner) = self.inner.upgrade() else {
            return false;
        };
        let delivery = Delivery {
            topic: topic.into(),
            topic_pattern: self.key.0.clone(),
            share: self.key.1.clone(),
            payload,
            properties,
            ttl,
        };
        inner.dispatch(Event::Deliver(self.key.clone(), delivery));
        true
    }
}

// ============================================================================
// State machine
// ============================================================================

impl Inner {
    /// Run application code on the callback service under the client's
    /// ordering context.
    fn callback<F>(self: &Arc<Self>, work: F)
    where
        F: FnOnce(&NonBlockingClient) + Send + 'static,
    {
        let client = NonBlockingClient { inner: self.clone() };
        let ran = Promise::new();
        ran.on_complete(|outcome| {
            if let Err(cause) = outcome {
                log::error!("MQLight: callback service failed to run client work: {}", cause);
            }
        });
        self.callbacks.run(Box::new(move || work(&client)), &self.ordering, ran);
    }

    /// Feed an event to the state machine. Drains on this thread unless
    /// another thread (or an outer frame of this one) is already draining.
    fn dispatch(self: &Arc<Self>, event: Event) {
        {
            let mut mailbox = lock(&self.mailbox);
            mailbox.events.push_back(event);
            if mailbox.busy {
                return;
            }
            mailbox.busy = true;
        }
        loop {
            let event = {
                let mut mailbox = lock(&self.mailbox);
                match mailbox.events.pop_front() {
                    Some(event) => event,
                    None => {
                        mailbox.busy = false;
                        return;
                    }
                }
            };
            let effects = {
                let mut machine = lock(&self.machine);
                let mut effects = Vec::new();
                self.handle(&mut machine, event, &mut effects);
                effects
            };
            for effect in effects {
                self.apply(effect);
            }
        }
    }

    fn handle(self: &Arc<Self>, m: &mut Machine, event: Event, fx: &mut Vec<Effect>) {
        match event {
            Event::LookupDone { generation, outcome } => {
                if generation != m.generation
                    || !matches!(m.state, ClientState::Starting | ClientState::Retrying)
                {
                    log::debug!("MQLight: {} ignoring stale endpoint lookup", self.id);
                    return;
                }
                match outcome {
                    Ok(endpoint) => self.started(m, endpoint, fx),
                    Err(cause) => self.failed(m, cause, fx),
                }
            }
            Event::RetryTimerFired { generation } => {
                if generation == m.generation && m.state == ClientState::Retrying {
                    m.retry_timer = None;
                    fx.push(Effect::Lookup(m.generation));
                }
            }
            Event::Submit(op) => match m.state {
                ClientState::Started => self.execute(m, op, fx),
                ClientState::Starting | ClientState::Retrying => {
                    log::debug!("MQLight: {} queueing operation while {}", self.id, m.state);
                    m.pending.push_back(op);
                }
                ClientState::Stopping | ClientState::Stopped => {
                    fx.push(Effect::Fail(op.into_promise(), ClientError::Stopped));
                }
            },
            Event::EngineDone { generation, done, outcome } => {
                self.engine_done(m, done, &outcome, fx);
                if let Err(cause) = outcome {
                    if generation == m.generation
                        && m.state == ClientState::Started
                        && self.classifier.classify(&cause) == Recovery::Retry
                    {
                        log::warn!("MQLight: {} lost connection: {}", self.id, cause);
                        self.failed(m, cause, fx);
                    }
                }
            }
            Event::Deliver(key, delivery) => {
                match m.subscriptions.get(&key) {
                    Some(active) if active.confirmed && m.state == ClientState::Started => {
                        fx.push(Effect::Deliver(
                            active.destination.clone(),
                            active.context.clone(),
                            delivery,
                        ));
                    }
                    _ => log::debug!(
                        "MQLight: {} dropping message for inactive subscription {}",
                        self.id,
                        key.0
                    ),
                }
            }
            Event::Stop(promise) => {
                if m.state != ClientState::Stopped {
                    self.shutdown(m, None, fx);
                }
                fx.push(Effect::Complete(promise));
            }
        }
    }

    fn transition(&self, m: &mut Machine, to: ClientState) {
        log::debug!("MQLight: {} {} -> {}", self.id, m.state, to);
        m.state = to;
        self.state.store(to as u8, Ordering::Release);
    }

    fn started(self: &Arc<Self>, m: &mut Machine, endpoint: Endpoint, fx: &mut Vec<Effect>) {
        let endpoint = self.with_credentials(endpoint);
        let restarted = m.has_started;
        m.has_started = true;
        log::info!("MQLight: client {} started on {}", self.id, endpoint);
        m.backoff.reset();
        m.endpoint = Some(endpoint.clone());
        self.transition(m, ClientState::Started);
        fx.push(Effect::Connected(endpoint.clone()));
        fx.push(Effect::Notify(if restarted {
            Notice::Restarted
        } else {
            Notice::Started
        }));

        if restarted {
            for (key, active) in m.subscriptions.iter().filter(|(_, a)| a.confirmed) {
                fx.push(Effect::Execute {
                    endpoint: endpoint.clone(),
                    call: Call::Subscribe {
                        address: subscription_address(&key.0, key.1.as_deref()),
                        options: active.options.clone(),
                        sink: self.sink(key),
                    },
                    done: Done::Resubscribed(key.clone()),
                    generation: m.generation,
                });
            }
        }

        if !m.pending.is_empty() {
            log::debug!("MQLight: {} draining {} queued operations", self.id, m.pending.len());
        }
        while let Some(op) = m.pending.pop_front() {
            self.execute(m, op, fx);
        }
    }

    fn with_credentials(&self, mut endpoint: Endpoint) -> Endpoint {
        if endpoint.user.is_none() {
            if let Some((user, password)) = &self.credentials {
                endpoint.user = Some(user.clone());
                endpoint.password = Some(password.clone());
            }
        }
        endpoint
    }

    fn failed(self: &Arc<Self>, m: &mut Machine, cause: ClientError, fx: &mut Vec<Effect>) {
        if self.classifier.classify(&cause) == Recovery::Retry {
            if let Some(delay) = m.backoff.next_delay() {
                log::warn!(
                    "MQLight: client {} retrying in {:?} (attempt {}): {}",
                    self.id,
                    delay,
                    m.backoff.attempt(),
                    cause
                );
                m.generation += 1;
                m.endpoint = None;
                self.transition(m, ClientState::Retrying);
                let timer = Promise::new();
                m.retry_timer = Some(timer.clone());
                fx.push(Effect::Notify(Notice::Retrying(cause)));
                fx.push(Effect::Schedule(delay, timer, m.generation));
                return;
            }
            log::error!("MQLight: client {} out of retry attempts", self.id);
        }
        self.shutdown(m, Some(cause), fx);
    }

    fn shutdown(&self, m: &mut Machine, cause: Option<ClientError>, fx: &mut Vec<Effect>) {
        match &cause {
            Some(cause) => log::error!("MQLight: client {} stopping: {}", self.id, cause),
            None => log::info!("MQLight: client {} stopping", self.id),
        }
        self.transition(m, ClientState::Stopping);
        m.generation += 1;
        m.endpoint = None;
        if let Some(timer) = m.retry_timer.take() {
            fx.push(Effect::CancelTimer(timer));
        }
        for op in m.pending.drain(..) {
            fx.push(Effect::Fail(op.into_promise(), ClientError::Stopped));
        }
        m.subscriptions.clear();
        self.transition(m, ClientState::Stopped);
        fx.push(Effect::Notify(Notice::Stopped(cause)));
    }

    fn execute(self: &Arc<Self>, m: &mut Machine, op: Operation, fx: &mut Vec<Effect>) {
        let Some(endpoint) = m.endpoint.clone() else {
            m.pending.push_back(op);
            return;
        };
        let (call, done) = match op {
            Operation::Send {
                topic,
                payload,
                properties,
                options,
                promise,
            } => (
                Call::Send {
                    address: encode_topic(&topic),
                    payload,
                    properties,
                    options,
                },
                Done::Sent(promise),
            ),
            Operation::Subscribe {
                key,
                options,
                destination,
                context,
                promise,
            } => {
                if m.subscriptions.contains_key(&key) {
                    let (topic_pattern, share) = key;
                    fx.push(Effect::Fail(
                        promise,
                        ClientError::Subscribed { topic_pattern, share },
                    ));
                    return;
                }
                let call = Call::Subscribe {
                    address: subscription_address(&key.0, key.1.as_deref()),
                    options: options.clone(),
                    sink: self.sink(&key),
                };
                m.subscriptions.insert(
                    key.clone(),
                    Active {
                        options,
                        destination,
                        context,
                        confirmed: false,
                    },
                );
                (call, Done::Subscribed(key, promise))
            }
            Operation::Unsubscribe { key, promise } => {
                if !m.subscriptions.contains_key(&key) {
                    let (topic_pattern, share) = key;
                    fx.push(Effect::Fail(
                        promise,
                        ClientError::NotSubscribed { topic_pattern, share },
                    ));
                    return;
                }
                let call = Call::Unsubscribe {
                    address: subscription_address(&key.0, key.1.as_deref()),
                };
                (call, Done::Unsubscribed(key, promise))
            }
        };
        fx.push(Effect::Execute {
            endpoint,
            call,
            done,
            generation: m.generation,
        });
    }

    fn engine_done(
        &self,
        m: &mut Machine,
        done: Done,
        outcome: &Result<(), ClientError>,
        fx: &mut Vec<Effect>,
    ) {
        match (done, outcome) {
            (Done::Sent(promise), Ok(())) => fx.push(Effect::Complete(promise)),
            (Done::Subscribed(key, promise), Ok(())) => {
                if let Some(active) = m.subscriptions.get_mut(&key) {
                    active.confirmed = true;
                }
                fx.push(Effect::Complete(promise));
            }
            (Done::Subscribed(key, promise), Err(cause)) => {
                m.subscriptions.remove(&key);
                fx.push(Effect::Fail(promise, cause.clone()));
            }
            (Done::Resubscribed(key), Err(cause)) => {
                log::warn!("MQLight: {} failed to resubscribe to {}: {}", self.id, key.0, cause);
            }
            (Done::Resubscribed(_), Ok(())) => {}
            (Done::Unsubscribed(key, promise), Ok(())) => {
                if let Some(active) = m.subscriptions.remove(&key) {
                    fx.push(Effect::Unsubscribed(active.destination, active.context, key));
                }
                fx.push(Effect::Complete(promise));
            }
            (Done::Sent(promise), Err(cause)) | (Done::Unsubscribed(_, promise), Err(cause)) => {
                fx.push(Effect::Fail(promise, cause.clone()));
            }
        }
    }

    fn sink(self: &Arc<Self>, key: &Key) -> DeliverySink {
        DeliverySink {
            inner: Arc::downgrade(self),
            key: key.clone(),
        }
    }

    // ------------------------------------------------------------------------
    // Effects
    // ------------------------------------------------------------------------

    fn apply(self: &Arc<Self>, effect: Effect) {
        match effect {
            Effect::Lookup(generation) => {
                let promise = Promise::new();
                let weak = Arc::downgrade(self);
                promise.on_complete(move |outcome: Result<&Endpoint, &ClientError>| {
                    if let Some(inner) = weak.upgrade() {
                        let outcome = outcome.cloned().map_err(Clone::clone);
                        inner.dispatch(Event::LookupDone { generation, outcome });
                    }
                });
                self.endpoints.lookup(promise);
            }
            Effect::Schedule(delay, timer, generation) => {
                let weak = Arc::downgrade(self);
                timer.on_complete(move |outcome| {
                    if let (Ok(()), Some(inner)) = (outcome, weak.upgrade()) {
                        inner.dispatch(Event::RetryTimerFired { generation });
                    }
                });
                self.timers.schedule(delay, timer);
            }
            Effect::CancelTimer(timer) => self.timers.cancel(&timer),
            Effect::Connected(endpoint) => self.endpoints.on_success(&endpoint),
            Effect::Execute {
                endpoint,
                call,
                done,
                generation,
            } => {
                let promise = Promise::new();
                let weak = Arc::downgrade(self);
                promise.on_complete(move |outcome: Result<&(), &ClientError>| {
                    if let Some(inner) = weak.upgrade() {
                        let outcome = outcome.map(|_| ()).map_err(Clone::clone);
                        inner.dispatch(Event::EngineDone { generation, done, outcome });
                    }
                });
                match call {
                    Call::Send {
                        address,
                        payload,
                        properties,
                        options,
                    } => self
                        .engine
                        .send(&endpoint, &address, &payload, &properties, &options, promise),
                    Call::Subscribe { address, options, sink } => {
                        self.engine.subscribe(&endpoint, &address, &options, sink, promise)
                    }
                    Call::Unsubscribe { address } => {
                        self.engine.unsubscribe(&endpoint, &address, promise)
                    }
                }
            }
            Effect::Complete(promise) => {
                promise.complete(());
            }
            Effect::Fail(promise, cause) => {
                promise.fail(cause);
            }
            Effect::Notify(notice) => {
                let Some(listener) = self.listener.clone() else { return };
                let context = self.context.clone();
                self.callback(move |client| {
                    let context = context.as_ref();
                    match notice {
                        Notice::Started => listener.on_started(client, context),
                        Notice::Restarted => listener.on_restarted(client, context),
                        Notice::Retrying(cause) => listener.on_retrying(client, context, &cause),
                        Notice::Stopped(cause) => {
                            listener.on_stopped(client, context, cause.as_ref())
                        }
                    }
                });
            }
            Effect::Deliver(destination, context, delivery) => {
                self.callback(move |client| {
                    destination.on_message(client, context.as_ref(), &delivery)
                });
            }
            Effect::Unsubscribed(destination, context, (topic_pattern, share)) => {
                self.callback(move |client| {
                    let share = share.as_deref();
                    destination.on_unsubscribed(client, context.as_ref(), &topic_pattern, share)
                });
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let machine = self
            .machine
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for op in machine.pending.drain(..) {
            op.into_promise().fail(ClientError::Stopped);
        }
        if let Some(timer) = machine.retry_timer.take() {
            self.timers.cancel(&timer);
        }
    }
}
