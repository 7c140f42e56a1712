//! Client error type
//!
//! Only `InvalidArgument` is ever returned synchronously from a public call.
//! Every other variant travels through a [`Promise`](crate::Promise) or a
//! listener callback.

use thiserror::Error;

/// MQ Light client errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// A required argument was absent or out of range
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The client stopped before the operation could complete
    #[error("client stopped")]
    Stopped,

    /// Network I/O or connectivity failure
    #[error("network error: {0}")]
    Network(String),

    /// Authentication or TLS failure
    #[error("security error: {0}")]
    Security(String),

    /// The broker refused the operation
    #[error("rejected by broker: {0}")]
    Rejected(String),

    /// Subscribe to a destination that is already subscribed
    #[error("already subscribed to {topic_pattern} (share: {share:?})")]
    Subscribed {
        topic_pattern: String,
        share: Option<String>,
    },

    /// Unsubscribe from a destination that is not subscribed
    #[error("not subscribed to {topic_pattern} (share: {share:?})")]
    NotSubscribed {
        topic_pattern: String,
        share: Option<String>,
    },

    /// Anything else
    #[error("{0}")]
    Other(String),
}

impl ClientError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}
