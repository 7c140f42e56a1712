//! Argument guards for the public surface
//!
//! Each guard fails with `ClientError::InvalidArgument` before any
//! asynchronous work is scheduled.

use crate::error::ClientError;
use crate::MAX_CLIENT_ID_LENGTH;

/// Unwrap a required argument.
pub fn required<T>(name: &str, value: Option<T>) -> Result<T, ClientError> {
    value.ok_or_else(|| ClientError::invalid(format!("{} cannot be null", name)))
}

/// Client ids are 1..=256 characters from `[A-Za-z0-9%/._]`.
pub fn client_id(id: &str) -> Result<(), ClientError> {
    if id.is_empty() || id.chars().count() > MAX_CLIENT_ID_LENGTH {
        return Err(ClientError::invalid(format!(
            "client id must be between 1 and {} characters",
            MAX_CLIENT_ID_LENGTH
        )));
    }
    if let Some(bad) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '%' | '/' | '.' | '_')))
    {
        return Err(ClientError::invalid(format!(
            "client id '{}' contains invalid character '{}'",
            id, bad
        )));
    }
    Ok(())
}

/// Share names may not contain a colon.
pub fn share(share: Option<&str>) -> Result<(), ClientError> {
    match share {
        Some(name) if name.contains(':') => Err(ClientError::invalid(format!(
            "share name '{}' cannot contain a colon",
            name
        ))),
        _ => Ok(()),
    }
}

/// Message time-to-live in milliseconds, at least 1.
pub fn send_ttl(ttl: i64) -> Result<u64, ClientError> {
    if ttl < 1 {
        return Err(ClientError::invalid(format!(
            "ttl must be a positive number of milliseconds, got {}",
            ttl
        )));
    }
    Ok(ttl as u64)
}

/// Subscription time-to-live in milliseconds, zero or more.
pub fn subscribe_ttl(ttl: i64) -> Result<u64, ClientError> {
    u64::try_from(ttl)
        .map_err(|_| ClientError::invalid(format!("subscription ttl cannot be negative, got {}", ttl)))
}

/// Unsubscribe only supports immediate removal.
pub fn unsubscribe_ttl(ttl: Option<i64>) -> Result<(), ClientError> {
    match ttl {
        None | Some(0) => Ok(()),
        Some(other) => Err(ClientError::invalid(format!(
            "unsubscribe ttl must be zero, got {}",
            other
        ))),
    }
}
