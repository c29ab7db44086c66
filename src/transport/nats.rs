//! NATS transport
//!
//! Adapts the `async-nats` client to the [`Transport`] contract. The wire
//! protocol, reconnect logic and subject routing all stay inside the client
//! library; this file only maps calls and errors.
//!
//! Each subscription gets a forwarding task that moves messages from the
//! `async_nats::Subscriber` stream into the bounded queue of a
//! [`Subscription`]. Releasing the subscription stops the task, which then
//! unsubscribes on the server.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_nats::{ConnectOptions, RequestErrorKind, ServerAddr};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::{ConnectionConfig, Credentials};
use crate::transport::{
    Connection, ConnectionMetadata, Message, SUBSCRIPTION_CAPACITY, Subscription, Transport,
    reject_zero_timeout,
};
use crate::utils::error::TransportError;

/// Client name announced to the server in the CONNECT handshake.
pub const CLIENT_NAME: &str = "pubsub-verify";

#[derive(Debug, Clone, Default)]
pub struct NatsTransport;

impl NatsTransport {
    pub fn new() -> Self {
        Self
    }

    fn options(config: &ConnectionConfig) -> ConnectOptions {
        // requests are bounded by the caller's timeout alone
        let options = ConnectOptions::new()
            .name(CLIENT_NAME)
            .connection_timeout(config.connect_timeout())
            .request_timeout(None);

        match config.credentials() {
            Credentials::None => options,
            Credentials::UserPassword { username, password } => {
                options.user_and_password(username.clone(), password.clone())
            }
            Credentials::Token(token) => options.token(token.clone()),
        }
    }
}

pub fn parse_addresses(servers: &[String]) -> Result<Vec<ServerAddr>, TransportError> {
    servers
        .iter()
        .map(|s| {
            s.parse::<ServerAddr>()
                .map_err(|e| TransportError::Connection(format!("invalid server address '{s}': {e}")))
        })
        .collect()
}

/// The address reported for a connection. A server bound to a wildcard
/// host (`0.0.0.0`, `::`) only announces that, so the configured address is
/// reported instead.
pub fn connected_address(host: &str, port: u16, servers: &[String]) -> String {
    let unspecified = host.is_empty()
        || host
            .parse::<IpAddr>()
            .is_ok_and(|addr| addr.is_unspecified());
    if unspecified {
        servers.join(", ")
    } else {
        format!("{host}:{port}")
    }
}

#[async_trait]
impl Transport for NatsTransport {
    type Connection = NatsConnection;

    async fn connect(&self, config: &ConnectionConfig) -> Result<NatsConnection, TransportError> {
        reject_zero_timeout(config)?;
        let addrs = parse_addresses(config.servers())?;

        // The library applies the timeout per attempt; bound the whole
        // handshake as well.
        let connect = Self::options(config).connect(addrs.as_slice());
        let client = match tokio::time::timeout(config.connect_timeout(), connect).await {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => return Err(TransportError::Connection(e.to_string())),
            Err(_) => {
                return Err(TransportError::Connection(format!(
                    "handshake did not complete within {}ms",
                    config.connect_timeout().as_millis()
                )));
            }
        };

        info!(servers = ?config.servers(), "Connected to NATS");
        Ok(NatsConnection {
            client,
            servers: config.servers().to_vec(),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }
}

#[derive(Debug, Clone)]
pub struct NatsConnection {
    client: async_nats::Client,
    servers: Vec<String>,
    closed: Arc<AtomicBool>,
}

impl NatsConnection {
    fn ensure_open(&self, err: fn(String) -> TransportError) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(err("connection closed".to_string()));
        }
        Ok(())
    }
}

impl From<async_nats::Message> for Message {
    fn from(msg: async_nats::Message) -> Self {
        Message {
            subject: msg.subject.to_string(),
            payload: msg.payload,
            reply: msg.reply.map(|r| r.to_string()),
        }
    }
}

#[async_trait]
impl Connection for NatsConnection {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), TransportError> {
        self.ensure_open(TransportError::Publish)?;
        self.client
            .publish(subject.to_string(), payload)
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))
    }

    async fn subscribe(&self, pattern: &str) -> Result<Subscription, TransportError> {
        self.ensure_open(TransportError::Subscribe)?;
        let mut subscriber = self
            .client
            .subscribe(pattern.to_string())
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        let (release_tx, mut release_rx) = oneshot::channel::<()>();
        let subject = pattern.to_string();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    // fires on release and when the Subscription is gone
                    _ = &mut release_rx => break,
                    next = subscriber.next() => match next {
                        Some(msg) => match tx.try_send(Message::from(msg)) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                warn!(%subject, "Slow consumer, dropping message");
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => break,
                        },
                        None => break,
                    },
                }
            }
            if let Err(e) = subscriber.unsubscribe().await {
                debug!(%subject, "Unsubscribe failed: {e}");
            }
        });

        Ok(Subscription::new(pattern, rx, move || {
            let _ = release_tx.send(());
        }))
    }

    async fn request(
        &self,
        subject: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Message, TransportError> {
        self.ensure_open(TransportError::Publish)?;
        let request = self.client.request(subject.to_string(), payload);
        match tokio::time::timeout(timeout, request).await {
            Ok(Ok(reply)) => Ok(reply.into()),
            Ok(Err(e)) => match e.kind() {
                // no-responders status means nobody will ever answer
                RequestErrorKind::TimedOut | RequestErrorKind::NoResponders => {
                    Err(TransportError::Timeout(timeout))
                }
                _ => Err(TransportError::Unexpected(e.to_string())),
            },
            Err(_) => Err(TransportError::Timeout(timeout)),
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // the socket itself goes away with the last client handle
        if let Err(e) = self.client.flush().await {
            warn!("Flush before close failed: {e}");
        }
        info!("Connection flushed and released");
    }

    fn metadata(&self) -> ConnectionMetadata {
        let info = self.client.server_info();
        ConnectionMetadata {
            client_id: info.client_id.to_string(),
            connected_address: connected_address(&info.host, info.port, &self.servers),
            max_payload_bytes: info.max_payload,
        }
    }
}
