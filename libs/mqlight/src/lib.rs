//! MQ Light Client Library
//!
//! Non-blocking publish/subscribe client engine for MQ Light brokers reached
//! over AMQP. The engine owns the client lifecycle, retries unreachable
//! endpoints with backoff, queues work until the client has started and
//! reports every outcome through a [`Promise`]. Sockets, frames, threads and
//! timers are supplied by the application through the traits in
//! [`services`].
//!
//! # Features
//!
//! - `default` - enables `stock-services`
//! - `stock-services` - same-thread callbacks, single endpoint lookup and a
//!   thread-backed timer
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mqlight::{NonBlockingClient, Payload};
//! use mqlight::stock::{SameThreadCallbackService, SingleEndpointService, ThreadTimerService};
//!
//! let client = NonBlockingClient::new(
//!     Some(Arc::new(SingleEndpointService::from_uri("amqp://localhost")?)),
//!     Some(Arc::new(SameThreadCallbackService)),
//!     Some(engine), // your ProtocolEngine
//!     Some(Arc::new(ThreadTimerService)),
//!     None,
//!     None,
//!     None,
//! )?;
//!
//! let sent = client.send(Some("greetings"), Some(Payload::from("hello")), None, None, None, None)?;
//! sent.on_complete(|outcome| log::info!("send finished: {:?}", outcome));
//! client.stop(None, None);
//! ```

pub mod backoff;
pub mod client;
pub mod error;
pub mod listener;
pub mod options;
pub mod promise;
pub mod services;
pub mod topic;
pub mod validate;

#[cfg(feature = "stock-services")]
pub mod stock;

pub use backoff::{Backoff, DefaultClassifier, FailureClassifier, Recovery};
pub use client::{ClientState, DeliverySink, NonBlockingClient};
pub use error::ClientError;
pub use listener::{
    ClientListener, CompletionListener, Delivery, DestinationListener, ListenerContext, Payload,
    Properties, Subscription,
};
pub use options::{ClientOptions, QoS, SendOptions, SubscribeOptions};
pub use promise::Promise;
pub use services::{
    CallbackService, Endpoint, EndpointService, OrderingContext, ProtocolEngine, TimerService, Work,
};
pub use topic::{encode_topic, subscription_address};

/// Prefix of generated client ids
pub const AUTO_ID_PREFIX: &str = "AUTO_";

/// Prefix of every topic address on the wire
pub const TOPIC_ADDRESS_PREFIX: &str = "amqp:///";

/// Longest permitted client id
pub const MAX_CLIENT_ID_LENGTH: usize = 256;

/// Default subscription credit
pub const DEFAULT_CREDIT: u32 = 1024;
