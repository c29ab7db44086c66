//! The `transport` module is the seam between the scenarios and a broker.
//!
//! Scenarios only see the [`Transport`] and [`Connection`] traits. Two
//! implementations exist:
//!
//! - `nats`: the real client, backed by the `async-nats` library.
//! - `memory`: an in-process loopback broker used by tests and by the
//!   `--loopback` self-test mode.
//!
//! Delivery is modelled as a bounded queue per [`Subscription`]: the
//! transport pushes matching messages into the queue from its own task and
//! the scenario pops them with an explicit timeout.

pub mod memory;
pub mod message;
pub mod nats;
pub mod subject;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::config::ConnectionConfig;
use crate::utils::error::TransportError;

pub use message::{ConnectionMetadata, Message};

/// Capacity of the per-subscription delivery queue. Messages arriving while
/// the queue is full are dropped, like a slow consumer on a real broker.
pub const SUBSCRIPTION_CAPACITY: usize = 256;

/// Opens connections to a broker.
#[async_trait]
pub trait Transport: Send + Sync {
    type Connection: Connection;

    /// Performs the handshake. Implementations must give up once
    /// `config.connect_timeout()` has elapsed and must reject a zero timeout.
    async fn connect(&self, config: &ConnectionConfig) -> Result<Self::Connection, TransportError>;
}

/// An established broker connection.
///
/// Clones share the same underlying connection, so a responder task can
/// publish on the connection its owner is using.
#[async_trait]
pub trait Connection: Clone + Send + Sync + 'static {
    /// Fire-and-forget publish.
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), TransportError>;

    async fn subscribe(&self, pattern: &str) -> Result<Subscription, TransportError>;

    /// Publishes `payload` with a private reply subject and waits at most
    /// `timeout` for the first answer.
    async fn request(
        &self,
        subject: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Message, TransportError>;

    /// Flushes and closes the connection. Calling it again is a no-op.
    async fn close(&self);

    fn metadata(&self) -> ConnectionMetadata;
}

/// Returned by `connect` implementations when the handshake budget is zero.
pub(crate) fn reject_zero_timeout(config: &ConnectionConfig) -> Result<(), TransportError> {
    if config.connect_timeout().is_zero() {
        return Err(TransportError::Connection(
            "connect timeout is zero".to_string(),
        ));
    }
    Ok(())
}

type Release = Box<dyn FnOnce() + Send>;

/// A live interest in a subject pattern.
///
/// The subscription is released by [`Subscription::unsubscribe`] or, at the
/// latest, when it is dropped. Messages already queued stay readable after
/// release.
pub struct Subscription {
    pattern: String,
    receiver: mpsc::Receiver<Message>,
    release: Option<Release>,
}

impl Subscription {
    /// `release` runs exactly once, on the first unsubscribe or on drop.
    pub fn new(
        pattern: impl Into<String>,
        receiver: mpsc::Receiver<Message>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            receiver,
            release: Some(Box::new(release)),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_active(&self) -> bool {
        self.release.is_some()
    }

    /// Waits for the next message. Returns `None` once the subscription is
    /// released and drained.
    pub async fn recv(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }

    /// Waits at most `timeout` for the next message.
    pub async fn next_timeout(&mut self, timeout: Duration) -> Option<Message> {
        tokio::time::timeout(timeout, self.receiver.recv())
            .await
            .ok()
            .flatten()
    }

    /// Returns an already queued message without waiting.
    pub fn try_next(&mut self) -> Option<Message> {
        self.receiver.try_recv().ok()
    }

    /// Releases the broker-side interest. Idempotent.
    pub fn unsubscribe(&mut self) {
        if let Some(release) = self.release.take() {
            self.receiver.close();
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("pattern", &self.pattern)
            .field("active", &self.is_active())
            .finish()
    }
}
