//! Loopback broker
//!
//! An in-process routing table implementing the [`Transport`] contract:
//! - registering clients and the subscriptions they hold
//! - routing published messages to every matching subscription (wildcards
//!   included)
//! - request-reply through private `_INBOX.` subjects
//!
//! Concurrency notes:
//! - State lives behind a `std::sync::Mutex` shared by every connection. The
//!   lock is never held across an `.await`; delivery uses `try_send` into the
//!   bounded subscription queues.
//! - Closing a connection removes every subscription it still holds, so a
//!   closed client leaves nothing behind in the routing table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{ConnectionConfig, Credentials};
use crate::transport::subject::{SubjectPattern, validate_subject};
use crate::transport::{
    Connection, ConnectionMetadata, Message, SUBSCRIPTION_CAPACITY, Subscription, Transport,
    reject_zero_timeout,
};
use crate::utils::error::TransportError;

pub type ClientId = u64;
pub type RouteId = u64;

/// Default maximum payload, matching the NATS server default.
pub const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024;

#[derive(Debug)]
struct Route {
    client_id: ClientId,
    pattern: SubjectPattern,
    sender: mpsc::Sender<Message>,
}

#[derive(Debug, Default)]
struct BrokerState {
    routes: HashMap<RouteId, Route>,
    clients: HashMap<ClientId, String>,
    next_id: u64,
}

impl BrokerState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Shared routing table. Cloning yields another handle to the same broker.
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    max_payload: usize,
    credentials: Option<Credentials>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState::default())),
            max_payload: DEFAULT_MAX_PAYLOAD,
            credentials: None,
        }
    }

    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    /// Only clients presenting exactly these credentials may connect.
    pub fn require_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        // state stays consistent even if a holder panicked
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn register_client(&self, address: &str) -> ClientId {
        let mut state = self.lock();
        let id = state.next_id();
        state.clients.insert(id, address.to_string());
        id
    }

    /// Removes a client together with every route it still holds.
    fn cleanup_client(&self, client_id: ClientId) {
        let mut state = self.lock();
        state.clients.remove(&client_id);
        let before = state.routes.len();
        state.routes.retain(|_, route| route.client_id != client_id);
        debug!(
            client_id,
            released = before - state.routes.len(),
            "Cleaned up loopback client"
        );
    }

    fn add_route(
        &self,
        client_id: ClientId,
        pattern: SubjectPattern,
        sender: mpsc::Sender<Message>,
    ) -> RouteId {
        let mut state = self.lock();
        let id = state.next_id();
        state.routes.insert(
            id,
            Route {
                client_id,
                pattern,
                sender,
            },
        );
        id
    }

    fn remove_route(&self, route_id: RouteId) {
        self.lock().routes.remove(&route_id);
    }

    /// Delivers `msg` to every matching route and returns how many queues
    /// accepted it.
    pub fn route(&self, msg: &Message) -> usize {
        let state = self.lock();
        let mut delivered = 0;
        for (route_id, route) in &state.routes {
            if !route.pattern.matches(&msg.subject) {
                continue;
            }
            match route.sender.try_send(msg.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(route_id, subject = %msg.subject, "Slow consumer, dropping message");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(route_id, "Route closed before release");
                }
            }
        }
        delivered
    }

    /// Number of live subscriptions across all clients.
    pub fn subscription_count(&self) -> usize {
        self.lock().routes.len()
    }

    pub fn client_count(&self) -> usize {
        self.lock().clients.len()
    }
}

/// [`Transport`] over a [`MemoryBroker`].
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    broker: MemoryBroker,
}

impl MemoryTransport {
    pub fn new(broker: MemoryBroker) -> Self {
        Self { broker }
    }

    pub fn broker(&self) -> &MemoryBroker {
        &self.broker
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    type Connection = MemoryConnection;

    async fn connect(&self, config: &ConnectionConfig) -> Result<MemoryConnection, TransportError> {
        reject_zero_timeout(config)?;

        if let Some(required) = &self.broker.credentials {
            if required != config.credentials() {
                return Err(TransportError::Connection(
                    "authorization violation".to_string(),
                ));
            }
        }

        // ConnectionConfig guarantees at least one address
        let address = config.servers()[0].clone();
        let client_id = self.broker.register_client(&address);
        debug!(client_id, %address, "Loopback client connected");

        Ok(MemoryConnection {
            broker: self.broker.clone(),
            client_id,
            address,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }
}

#[derive(Debug, Clone)]
pub struct MemoryConnection {
    broker: MemoryBroker,
    client_id: ClientId,
    address: String,
    closed: Arc<AtomicBool>,
}

impl MemoryConnection {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self, err: fn(String) -> TransportError) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(err("connection closed".to_string()));
        }
        Ok(())
    }

    fn send(&self, msg: Message) -> Result<(), TransportError> {
        validate_subject(&msg.subject).map_err(|e| TransportError::Publish(e.to_string()))?;
        if msg.payload.len() > self.broker.max_payload {
            return Err(TransportError::Publish(format!(
                "payload of {} bytes exceeds maximum of {}",
                msg.payload.len(),
                self.broker.max_payload
            )));
        }
        let delivered = self.broker.route(&msg);
        debug!(subject = %msg.subject, delivered, "Routed loopback message");
        Ok(())
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), TransportError> {
        self.ensure_open(TransportError::Publish)?;
        self.send(Message::new(subject, payload))
    }

    async fn subscribe(&self, pattern: &str) -> Result<Subscription, TransportError> {
        self.ensure_open(TransportError::Subscribe)?;
        let parsed =
            SubjectPattern::parse(pattern).map_err(|e| TransportError::Subscribe(e.to_string()))?;

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        let route_id = self.broker.add_route(self.client_id, parsed, tx);
        let broker = self.broker.clone();
        Ok(Subscription::new(pattern, rx, move || {
            broker.remove_route(route_id)
        }))
    }

    async fn request(
        &self,
        subject: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Message, TransportError> {
        self.ensure_open(TransportError::Publish)?;
        let inbox = format!("_INBOX.{}", Uuid::new_v4().simple());
        let mut replies = self.subscribe(&inbox).await?;

        self.send(Message::new(subject, payload).with_reply(inbox))?;

        let reply = replies.next_timeout(timeout).await;
        replies.unsubscribe();
        reply.ok_or(TransportError::Timeout(timeout))
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.broker.cleanup_client(self.client_id);
        }
    }

    fn metadata(&self) -> ConnectionMetadata {
        ConnectionMetadata {
            client_id: self.client_id.to_string(),
            connected_address: self.address.clone(),
            max_payload_bytes: self.broker.max_payload,
        }
    }
}
