//! Scenario runner
//!
//! Runs the connectivity checks in a fixed order over a single connection:
//! connect, publish, wildcard subscribe with fan-in, request-reply and
//! introspection. Checks never run concurrently since every check after
//! `connect` needs the connection it established.
//!
//! Failure policy:
//! - a failed `connect` is fatal and the remaining checks are skipped
//! - every other failure is recorded and the next check runs
//! - an interrupt stops the run at the next check boundary
//!
//! The connection is closed on every exit path, including a panic inside a
//! check, which is reported as an `UnexpectedError`.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use bytes::Bytes;
use chrono::Local;
use futures_util::FutureExt;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{CheckSettings, ConnectionConfig};
use crate::scenario::result::ScenarioResult;
use crate::transport::{Connection, Subscription, Transport};
use crate::utils::error::{ErrorKind, TransportError};
use crate::utils::signal::Interrupt;

pub const SCENARIO: &str = "connectivity";

pub const PUBLISH_SUBJECT: &str = "test.connection";
pub const FANIN_PATTERN: &str = "test.>";
/// Only follow-up messages count towards the fan-in total.
pub const FANIN_PREFIX: &str = "test.message.";
pub const ECHO_SUBJECT: &str = "requests.echo";
pub const ECHO_PREFIX: &str = "Reply to: ";
pub const REQUEST_PAYLOAD: &str = "Hello, NATS!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    Connect,
    Publish,
    Subscribe,
    RequestReply,
    Introspection,
}

impl Check {
    pub const ALL: [Check; 5] = [
        Check::Connect,
        Check::Publish,
        Check::Subscribe,
        Check::RequestReply,
        Check::Introspection,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Check::Connect => "connect",
            Check::Publish => "publish",
            Check::Subscribe => "subscribe",
            Check::RequestReply => "request_reply",
            Check::Introspection => "introspection",
        }
    }
}

/// The reply the echo responder sends for `payload`.
pub fn echo_reply(payload: &[u8]) -> Bytes {
    let mut reply = Vec::with_capacity(ECHO_PREFIX.len() + payload.len());
    reply.extend_from_slice(ECHO_PREFIX.as_bytes());
    reply.extend_from_slice(payload);
    Bytes::from(reply)
}

pub struct ScenarioRunner<'a, T: Transport> {
    transport: &'a T,
    config: &'a ConnectionConfig,
    checks: CheckSettings,
    interrupt: Interrupt,
}

impl<'a, T: Transport> ScenarioRunner<'a, T> {
    pub fn new(transport: &'a T, config: &'a ConnectionConfig, checks: CheckSettings) -> Self {
        Self {
            transport,
            config,
            checks,
            interrupt: Interrupt::never(),
        }
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Runs every check and returns one result per [`Check::ALL`] entry, in
    /// order.
    pub async fn run(&self) -> Vec<ScenarioResult> {
        let mut results = Vec::with_capacity(Check::ALL.len());
        if self.interrupt.is_triggered() {
            skip_remaining(&mut results, "interrupted");
            return results;
        }

        info!(check = Check::Connect.name(), servers = ?self.config.servers(), "Running check");
        let started = Instant::now();
        let conn = match self.connect().await {
            Ok(conn) => conn,
            Err(e) => {
                error!(check = Check::Connect.name(), "{e}");
                results.push(ScenarioResult::fatal(
                    SCENARIO,
                    Check::Connect.name(),
                    e.kind(),
                    e.to_string(),
                    started.elapsed(),
                ));
                skip_remaining(&mut results, "connect failed");
                return results;
            }
        };
        let meta = conn.metadata();
        results.push(ScenarioResult::passed(
            SCENARIO,
            Check::Connect.name(),
            format!(
                "connected to {} as client {}",
                meta.connected_address, meta.client_id
            ),
            started.elapsed(),
        ));

        let outcome = AssertUnwindSafe(self.run_checks(&conn, &mut results))
            .catch_unwind()
            .await;
        conn.close().await;

        match outcome {
            Ok(()) => skip_remaining(&mut results, "interrupted"),
            Err(panic) => {
                let detail = panic_detail(panic.as_ref());
                if let Some(check) = Check::ALL.get(results.len()) {
                    error!(check = check.name(), "Check panicked: {detail}");
                    results.push(ScenarioResult::fatal(
                        SCENARIO,
                        check.name(),
                        ErrorKind::Unexpected,
                        detail,
                        Duration::ZERO,
                    ));
                }
                skip_remaining(&mut results, "aborted after unexpected error");
            }
        }
        results
    }

    async fn connect(&self) -> Result<T::Connection, TransportError> {
        let budget = self.config.connect_timeout();
        match tokio::time::timeout(budget, self.transport.connect(self.config)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Connection(format!(
                "handshake did not complete within {}ms",
                budget.as_millis()
            ))),
        }
    }

    async fn run_checks(&self, conn: &T::Connection, results: &mut Vec<ScenarioResult>) {
        for check in &Check::ALL[1..] {
            if self.interrupt.is_triggered() {
                warn!(check = check.name(), "Run interrupted");
                return;
            }

            info!(check = check.name(), "Running check");
            let result = match check {
                Check::Publish => self.check_publish(conn).await,
                Check::Subscribe => self.check_fanin(conn).await,
                Check::RequestReply => self.check_request_reply(conn).await,
                Check::Connect | Check::Introspection => self.check_introspection(conn),
            };
            log_result(&result);
            results.push(result);
        }
    }

    async fn check_publish(&self, conn: &T::Connection) -> ScenarioResult {
        let name = Check::Publish.name();
        let started = Instant::now();
        let payload = format!("Test message at {}", Local::now().to_rfc3339());

        match conn.publish(PUBLISH_SUBJECT, Bytes::from(payload.clone())).await {
            Ok(()) => ScenarioResult::passed(
                SCENARIO,
                name,
                format!("published to '{PUBLISH_SUBJECT}': {payload}"),
                started.elapsed(),
            ),
            Err(e) => ScenarioResult::from_error(SCENARIO, name, &e, started.elapsed()),
        }
    }

    async fn check_fanin(&self, conn: &T::Connection) -> ScenarioResult {
        let name = Check::Subscribe.name();
        let started = Instant::now();
        let expected = self.checks.fanin_count;

        let mut sub = match conn.subscribe(FANIN_PATTERN).await {
            Ok(sub) => sub,
            Err(e) => return ScenarioResult::from_error(SCENARIO, name, &e, started.elapsed()),
        };
        debug!(pattern = FANIN_PATTERN, "Subscribed");

        let drained = match self.publish_fanin(conn, &mut sub, expected).await {
            Ok(drained) => drained,
            Err(e) => {
                sub.unsubscribe();
                return ScenarioResult::from_error(SCENARIO, name, &e, started.elapsed());
            }
        };

        let grace = self.checks.grace_period();
        let received =
            drained + collect_fanin(&mut sub, expected.saturating_sub(drained), grace).await;
        sub.unsubscribe();
        let elapsed = started.elapsed();

        match received.cmp(&expected) {
            std::cmp::Ordering::Equal => ScenarioResult::passed(
                SCENARIO,
                name,
                format!("received {received}/{expected} messages on '{FANIN_PATTERN}'"),
                elapsed,
            ),
            std::cmp::Ordering::Less => ScenarioResult::failed(
                SCENARIO,
                name,
                ErrorKind::Timeout,
                format!(
                    "partial delivery: received {received}/{expected} messages within {}ms",
                    grace.as_millis()
                ),
                elapsed,
            ),
            std::cmp::Ordering::Greater => ScenarioResult::failed(
                SCENARIO,
                name,
                ErrorKind::Unexpected,
                format!("duplicate delivery: received {received}/{expected} messages"),
                elapsed,
            ),
        }
    }

    /// Publishes the follow-ups and drains the subscription after each one,
    /// so a count above the queue capacity is not lost to a full queue.
    /// Returns how many follow-ups were already received.
    async fn publish_fanin(
        &self,
        conn: &T::Connection,
        sub: &mut Subscription,
        count: usize,
    ) -> Result<usize, TransportError> {
        let mut drained = 0;
        for i in 0..count {
            let subject = format!("{FANIN_PREFIX}{i}");
            let payload = format!("Message #{} at {}", i + 1, Local::now().to_rfc3339());
            conn.publish(&subject, Bytes::from(payload)).await?;
            if i + 1 < count {
                tokio::time::sleep(self.checks.publish_interval()).await;
            }
            drained += drain_fanin(sub);
        }
        Ok(drained)
    }

    async fn check_request_reply(&self, conn: &T::Connection) -> ScenarioResult {
        let name = Check::RequestReply.name();
        let started = Instant::now();

        let responder_sub = match conn.subscribe(ECHO_SUBJECT).await {
            Ok(sub) => sub,
            Err(e) => return ScenarioResult::from_error(SCENARIO, name, &e, started.elapsed()),
        };
        let (stop_tx, stop_rx) = oneshot::channel();
        let responder = tokio::spawn(echo_responder(conn.clone(), responder_sub, stop_rx));
        tokio::time::sleep(self.checks.settle_delay()).await;

        let timeout = self.checks.request_timeout();
        let request_started = Instant::now();
        let reply = conn
            .request(ECHO_SUBJECT, Bytes::from_static(REQUEST_PAYLOAD.as_bytes()), timeout)
            .await;
        let latency = request_started.elapsed();

        let _ = stop_tx.send(());
        match responder.await {
            Ok(mut sub) => sub.unsubscribe(),
            // the subscription was dropped, and so released, with the task
            Err(e) => warn!("Echo responder ended abnormally: {e}"),
        }

        let expected = echo_reply(REQUEST_PAYLOAD.as_bytes());
        match reply {
            Ok(msg) if msg.payload == expected => ScenarioResult::passed(
                SCENARIO,
                name,
                format!(
                    "reply '{}' in {:.1}ms",
                    msg.payload_text(),
                    latency.as_secs_f64() * 1000.0
                ),
                started.elapsed(),
            ),
            Ok(msg) => ScenarioResult::failed(
                SCENARIO,
                name,
                ErrorKind::Unexpected,
                format!(
                    "unexpected reply '{}', expected '{}'",
                    msg.payload_text(),
                    String::from_utf8_lossy(&expected)
                ),
                started.elapsed(),
            ),
            Err(e) => ScenarioResult::from_error(SCENARIO, name, &e, started.elapsed()),
        }
    }

    fn check_introspection(&self, conn: &T::Connection) -> ScenarioResult {
        let started = Instant::now();
        let meta = conn.metadata();
        ScenarioResult::passed(
            SCENARIO,
            Check::Introspection.name(),
            format!(
                "client id {}, connected to {}, max payload {} bytes",
                meta.client_id, meta.connected_address, meta.max_payload_bytes
            ),
            started.elapsed(),
        )
    }
}

/// Counts follow-up messages until `expected` arrived or `grace` elapsed.
/// Anything already queued past `expected` is counted too, so duplicates
/// show up as an over-count.
pub async fn collect_fanin(sub: &mut Subscription, expected: usize, grace: Duration) -> usize {
    let deadline = Instant::now() + grace;
    let mut received = 0;

    while received < expected {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match sub.next_timeout(remaining).await {
            Some(msg) if msg.subject.starts_with(FANIN_PREFIX) => {
                received += 1;
                debug!(subject = %msg.subject, payload = %msg.payload_text(), "Received");
            }
            Some(_) => {}
            None => break,
        }
    }

    received + drain_fanin(sub)
}

/// Counts the follow-ups already queued on `sub` without waiting.
fn drain_fanin(sub: &mut Subscription) -> usize {
    let mut received = 0;
    while let Some(msg) = sub.try_next() {
        if msg.subject.starts_with(FANIN_PREFIX) {
            received += 1;
        }
    }
    received
}

/// Answers every request on `sub` with [`echo_reply`] until `stop` fires,
/// then hands the subscription back for release.
async fn echo_responder<C: Connection>(
    conn: C,
    mut sub: Subscription,
    mut stop: oneshot::Receiver<()>,
) -> Subscription {
    loop {
        tokio::select! {
            _ = &mut stop => break,
            next = sub.recv() => {
                let Some(msg) = next else { break };
                let Some(reply_to) = msg.reply.as_deref() else {
                    debug!(subject = %msg.subject, "Ignoring message without reply subject");
                    continue;
                };
                if let Err(e) = conn.publish(reply_to, echo_reply(&msg.payload)).await {
                    warn!("Echo reply failed: {e}");
                }
            }
        }
    }
    sub
}

fn skip_remaining(results: &mut Vec<ScenarioResult>, reason: &str) {
    for check in &Check::ALL[results.len().min(Check::ALL.len())..] {
        results.push(ScenarioResult::skipped(SCENARIO, check.name(), reason));
    }
}

fn log_result(result: &ScenarioResult) {
    if result.is_passed() {
        info!(check = result.name(), "✓ {}", result.detail());
    } else {
        warn!(
            check = result.name(),
            kind = ?result.error_kind(),
            "✗ {}",
            result.detail()
        );
    }
}

pub(crate) fn panic_detail(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "check panicked".to_string()
    }
}
