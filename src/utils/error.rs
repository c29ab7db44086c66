//! The `error` module defines the failure taxonomy shared by the transport
//! contract and the scenarios that consume it.
//!
//! Every transport call reports a [`TransportError`]; scenarios convert it
//! into a result line tagged with its [`ErrorKind`] instead of unwinding.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Classification attached to every failed check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    #[serde(rename = "ConnectionError")]
    Connection,
    #[serde(rename = "PublishError")]
    Publish,
    #[serde(rename = "SubscribeError")]
    Subscribe,
    #[serde(rename = "TimeoutError")]
    Timeout,
    #[serde(rename = "UnexpectedError")]
    Unexpected,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Connection => "ConnectionError",
            ErrorKind::Publish => "PublishError",
            ErrorKind::Subscribe => "SubscribeError",
            ErrorKind::Timeout => "TimeoutError",
            ErrorKind::Unexpected => "UnexpectedError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by a [`Transport`](crate::transport::Transport) or one of
/// its connections.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("subscribe failed: {0}")]
    Subscribe(String),

    #[error("no reply within {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::Connection(_) => ErrorKind::Connection,
            TransportError::Publish(_) => ErrorKind::Publish,
            TransportError::Subscribe(_) => ErrorKind::Subscribe,
            TransportError::Timeout(_) => ErrorKind::Timeout,
            TransportError::Unexpected(_) => ErrorKind::Unexpected,
        }
    }

    /// Only a failed handshake aborts a run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransportError::Connection(_))
    }
}
