//! Listener capabilities and message data
//!
//! Listeners implement only the events they care about; every method has a
//! no-op default.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::client::NonBlockingClient;
use crate::error::ClientError;
use crate::options::SubscribeOptions;

/// Caller-supplied value handed back to listener callbacks
pub type ListenerContext = Arc<dyn Any + Send + Sync>;

/// Application message properties
pub type Properties = BTreeMap<String, String>;

/// Message body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Bytes(Vec<u8>),
}

impl Payload {
    pub fn len(&self) -> usize {
        match self {
            Payload::Text(s) => s.len(),
            Payload::Bytes(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.into())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(b: Vec<u8>) -> Self {
        Payload::Bytes(b)
    }
}

/// An inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Topic the message was sent to
    pub topic: String,
    /// Pattern of the subscription that matched
    pub topic_pattern: String,
    pub share: Option<String>,
    pub payload: Payload,
    pub properties: Properties,
    /// Remaining time-to-live in milliseconds, if the sender set one
    pub ttl: Option<u64>,
}

/// One active subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub topic_pattern: String,
    pub share: Option<String>,
    pub options: SubscribeOptions,
}

/// Client lifecycle events
pub trait ClientListener: Send + Sync {
    fn on_started(&self, _client: &NonBlockingClient, _context: Option<&ListenerContext>) {}

    /// `cause` is `None` when the application asked the client to stop.
    fn on_stopped(
        &self,
        _client: &NonBlockingClient,
        _context: Option<&ListenerContext>,
        _cause: Option<&ClientError>,
    ) {
    }

    /// Started again after a spell of retrying
    fn on_restarted(&self, _client: &NonBlockingClient, _context: Option<&ListenerContext>) {}

    fn on_retrying(
        &self,
        _client: &NonBlockingClient,
        _context: Option<&ListenerContext>,
        _cause: &ClientError,
    ) {
    }
}

/// Outcome of a send, subscribe, unsubscribe or stop
pub trait CompletionListener: Send + Sync {
    fn on_success(&self, _client: &NonBlockingClient, _context: Option<&ListenerContext>) {}

    fn on_error(
        &self,
        _client: &NonBlockingClient,
        _context: Option<&ListenerContext>,
        _cause: &ClientError,
    ) {
    }
}

/// Messages arriving on a subscription
pub trait DestinationListener: Send + Sync {
    fn on_message(
        &self,
        _client: &NonBlockingClient,
        _context: Option<&ListenerContext>,
        _delivery: &Delivery,
    ) {
    }

    fn on_unsubscribed(
        &self,
        _client: &NonBlockingClient,
        _context: Option<&ListenerContext>,
        _topic_pattern: &str,
        _share: Option<&str>,
    ) {
    }
}
