//! External collaborators
//!
//! The client owns none of the I/O. It is handed an endpoint service that
//! finds a broker, a callback service that runs work, a timer service that
//! fires after a delay and a protocol engine that talks to the broker.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::client::DeliverySink;
use crate::error::ClientError;
use crate::listener::{Payload, Properties};
use crate::options::{SendOptions, SubscribeOptions};
use crate::promise::Promise;

/// Default AMQP port (unencrypted)
pub const AMQP_PORT: u16 = 5672;

/// Default AMQP over TLS port
pub const AMQPS_PORT: u16 = 5671;

/// A unit of work handed to a [`CallbackService`]
pub type Work = Box<dyn FnOnce() + Send>;

// ============================================================================
// Endpoint
// ============================================================================

/// A resolved broker location plus credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub use_ssl: bool,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Idle timeout in milliseconds, 0 for none
    pub idle_timeout_ms: u32,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            use_ssl: false,
            user: None,
            password: None,
            idle_timeout_ms: 0,
        }
    }

    /// Parse an `amqp://` or `amqps://` URI, with optional `user:password@`.
    pub fn parse(uri: &str) -> Result<Self, ClientError> {
        let (use_ssl, rest) = if let Some(rest) = uri.strip_prefix("amqps://") {
            (true, rest)
        } else if let Some(rest) = uri.strip_prefix("amqp://") {
            (false, rest)
        } else {
            return Err(ClientError::invalid(format!(
                "unsupported scheme in '{}', expected amqp:// or amqps://",
                uri
            )));
        };

        // Anything after the authority (a path such as a vhost) is ignored
        let authority = match rest.find(|c: char| matches!(c, '/' | '?' | '#')) {
            Some(end) => &rest[..end],
            None => rest,
        };
        let (credentials, host_port) = match authority.rsplit_once('@') {
            Some((creds, host_port)) => (Some(creds), host_port),
            None => (None, authority),
        };

        let default_port = if use_ssl { AMQPS_PORT } else { AMQP_PORT };
        let (host, port) = if let Some(bracketed) = host_port.strip_prefix('[') {
            let (host, after) = bracketed.split_once(']').ok_or_else(|| {
                ClientError::invalid(format!("unterminated IPv6 address in '{}'", uri))
            })?;
            match after {
                "" => (host, None),
                _ => match after.strip_prefix(':') {
                    Some(port) => (host, Some(port)),
                    None => {
                        return Err(ClientError::invalid(format!(
                            "unexpected text after IPv6 address in '{}'",
                            uri
                        )))
                    }
                },
            }
        } else {
            match host_port.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (host_port, None),
            }
        };
        let port = match port {
            Some(port) => port
                .parse::<u16>()
                .map_err(|_| ClientError::invalid(format!("invalid port in '{}'", uri)))?,
            None => default_port,
        };
        if host.is_empty() {
            return Err(ClientError::invalid(format!("missing host in '{}'", uri)));
        }

        let mut endpoint = Endpoint::new(host, port);
        endpoint.use_ssl = use_ssl;
        if let Some(creds) = credentials {
            match creds.split_once(':') {
                Some((user, password)) => {
                    endpoint.user = Some(user.into());
                    endpoint.password = Some(password.into());
                }
                None => {
                    return Err(ClientError::invalid(
                        "user and password must both be specified",
                    ))
                }
            }
        }
        Ok(endpoint)
    }
}

// Keeps the password out of logs
impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_ssl", &self.use_ssl)
            .field("user", &self.user)
            .field("idle_timeout_ms", &self.idle_timeout_ms)
            .finish()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.use_ssl { "amqps" } else { "amqp" };
        if self.host.contains(':') {
            write!(f, "{}://[{}]:{}", scheme, self.host, self.port)
        } else {
            write!(f, "{}://{}:{}", scheme, self.host, self.port)
        }
    }
}

// ============================================================================
// Ordering context
// ============================================================================

/// Opaque token serialising related callbacks.
///
/// Work submitted under equal contexts runs in submission order, one piece at
/// a time. Work under different contexts may run concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderingContext(Arc<str>);

impl OrderingContext {
    pub fn new(token: &str) -> Self {
        Self(Arc::from(token))
    }
}

// ============================================================================
// Service traits
// ============================================================================

/// Resolves broker endpoints
pub trait EndpointService: Send + Sync {
    /// Complete `promise` with one candidate endpoint, or fail it.
    fn lookup(&self, promise: Promise<Endpoint>);

    /// The client started successfully against `endpoint`.
    fn on_success(&self, _endpoint: &Endpoint) {}
}

/// Runs work honouring the ordering context contract
pub trait CallbackService: Send + Sync {
    /// Execute `work` under `ordering`, completing `promise` when done.
    fn run(&self, work: Work, ordering: &OrderingContext, promise: Promise<()>);
}

/// Delayed completion
pub trait TimerService: Send + Sync {
    /// Complete `promise` after `delay`.
    fn schedule(&self, delay: Duration, promise: Promise<()>);

    /// Cancel a scheduled promise. Cancelling an already fired or already
    /// cancelled promise does nothing.
    fn cancel(&self, promise: &Promise<()>);
}

/// Wire-level protocol engine.
///
/// Send addresses come from [`encode_topic`](crate::encode_topic), link
/// addresses from [`subscription_address`](crate::subscription_address).
pub trait ProtocolEngine: Send + Sync {
    fn send(
        &self,
        endpoint: &Endpoint,
        address: &str,
        payload: &Payload,
        properties: &Properties,
        options: &SendOptions,
        promise: Promise<()>,
    );

    /// Attach a receiving link; inbound messages go to `sink`.
    fn subscribe(
        &self,
        endpoint: &Endpoint,
        address: &str,
        options: &SubscribeOptions,
        sink: DeliverySink,
        promise: Promise<()>,
    );

    fn unsubscribe(&self, endpoint: &Endpoint, address: &str, promise: Promise<()>);
}
