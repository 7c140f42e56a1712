//! Client, send and subscribe options
//!
//! All options are immutable once built. Builders validate in `build()`, so
//! an out-of-range value is rejected where it is configured rather than
//! where it is used.

use std::fmt;
use std::sync::Arc;

use crate::backoff::{Backoff, DefaultClassifier, FailureClassifier};
use crate::error::ClientError;
use crate::validate;
use crate::DEFAULT_CREDIT;

/// Delivery quality of service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QoS {
    /// At most once (fire and forget)
    #[default]
    AtMostOnce,
    /// At least once (acknowledged delivery)
    AtLeastOnce,
}

// ============================================================================
// ClientOptions
// ============================================================================

/// Client configuration
#[derive(Clone)]
pub struct ClientOptions {
    id: Option<String>,
    user: Option<String>,
    password: Option<String>,
    backoff: Backoff,
    classifier: Arc<dyn FailureClassifier>,
}

impl ClientOptions {
    pub fn builder() -> ClientOptionsBuilder {
        ClientOptionsBuilder::default()
    }

    /// Explicit client id; `None` means one is generated
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn classifier(&self) -> &Arc<dyn FailureClassifier> {
        &self.classifier
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            id: None,
            user: None,
            password: None,
            backoff: Backoff::default(),
            classifier: Arc::new(DefaultClassifier),
        }
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("id", &self.id)
            .field("user", &self.user)
            .field("backoff", &self.backoff)
            .field("classifier", &self.classifier)
            .finish()
    }
}

#[derive(Default)]
pub struct ClientOptionsBuilder {
    options: ClientOptions,
}

impl ClientOptionsBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.options.id = Some(id.into());
        self
    }

    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.options.user = Some(user.into());
        self.options.password = Some(password.into());
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.options.backoff = backoff;
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.options.classifier = classifier;
        self
    }

    pub fn build(self) -> Result<ClientOptions, ClientError> {
        if let Some(id) = &self.options.id {
            validate::client_id(id)?;
        }
        Ok(self.options)
    }
}

// ============================================================================
// SendOptions
// ============================================================================

/// Per-message options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    qos: QoS,
    ttl_ms: Option<u64>,
}

impl SendOptions {
    pub fn builder() -> SendOptionsBuilder {
        SendOptionsBuilder::default()
    }

    pub fn qos(&self) -> QoS {
        self.qos
    }

    /// Message time-to-live in milliseconds, if set
    pub fn ttl(&self) -> Option<u64> {
        self.ttl_ms
    }
}

#[derive(Debug, Default)]
pub struct SendOptionsBuilder {
    qos: QoS,
    ttl_ms: Option<i64>,
}

impl SendOptionsBuilder {
    pub fn qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    /// Time-to-live in milliseconds. Must be at least 1, checked by `build`.
    pub fn ttl(mut self, ttl_ms: i64) -> Self {
        self.ttl_ms = Some(ttl_ms);
        self
    }

    pub fn build(self) -> Result<SendOptions, ClientError> {
        let ttl_ms = self.ttl_ms.map(validate::send_ttl).transpose()?;
        Ok(SendOptions {
            qos: self.qos,
            ttl_ms,
        })
    }
}

// ============================================================================
// SubscribeOptions
// ============================================================================

/// Per-subscription options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeOptions {
    qos: QoS,
    credit: u32,
    auto_confirm: bool,
    ttl_ms: u64,
}

impl SubscribeOptions {
    pub fn builder() -> SubscribeOptionsBuilder {
        SubscribeOptionsBuilder::default()
    }

    pub fn qos(&self) -> QoS {
        self.qos
    }

    /// Messages the broker may push before the client grants more
    pub fn credit(&self) -> u32 {
        self.credit
    }

    pub fn auto_confirm(&self) -> bool {
        self.auto_confirm
    }

    /// How long the broker keeps the destination after the link detaches
    pub fn ttl(&self) -> u64 {
        self.ttl_ms
    }
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            qos: QoS::AtMostOnce,
            credit: DEFAULT_CREDIT,
            auto_confirm: true,
            ttl_ms: 0,
        }
    }
}

#[derive(Debug)]
pub struct SubscribeOptionsBuilder {
    options: SubscribeOptions,
    ttl_ms: i64,
}

impl Default for SubscribeOptionsBuilder {
    fn default() -> Self {
        Self {
            options: SubscribeOptions::default(),
            ttl_ms: 0,
        }
    }
}

impl SubscribeOptionsBuilder {
    pub fn qos(mut self, qos: QoS) -> Self {
        self.options.qos = qos;
        self
    }

    pub fn credit(mut self, credit: u32) -> Self {
        self.options.credit = credit;
        self
    }

    pub fn auto_confirm(mut self, auto_confirm: bool) -> Self {
        self.options.auto_confirm = auto_confirm;
        self
    }

    pub fn ttl(mut self, ttl_ms: i64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    pub fn build(self) -> Result<SubscribeOptions, ClientError> {
        let ttl_ms = validate::subscribe_ttl(self.ttl_ms)?;
        Ok(SubscribeOptions {
            ttl_ms,
            ..self.options
        })
    }
}
