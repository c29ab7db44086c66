//! Device simulator
//!
//! Emulates an on-premises telemetry device on its own connection: it
//! listens on `commands.>`, publishes a few temperature readings and then
//! sends itself a command to show the command channel is reachable.
//!
//! The simulator asserts nothing about delivery. A step fails only when a
//! transport call fails, and even a refused connection is reported without
//! failing the run. The connection is closed on every exit path; a panic
//! inside a step is reported as an `UnexpectedError`.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use bytes::Bytes;
use chrono::Local;
use futures_util::FutureExt;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::{ConnectionConfig, DeviceSettings};
use crate::scenario::ScenarioResult;
use crate::scenario::runner::panic_detail;
use crate::transport::{Connection, Subscription, Transport};
use crate::utils::error::{ErrorKind, TransportError};
use crate::utils::signal::Interrupt;

pub const SCENARIO: &str = "device";

pub const STEP_CONNECT: &str = "device.connect";
pub const STEP_SUBSCRIBE: &str = "device.subscribe";
pub const STEP_TELEMETRY: &str = "device.telemetry";
pub const STEP_COMMAND: &str = "device.command";

pub const STEPS: [&str; 4] = [STEP_CONNECT, STEP_SUBSCRIBE, STEP_TELEMETRY, STEP_COMMAND];

pub const COMMAND_PATTERN: &str = "commands.>";
pub const BASE_TEMPERATURE: i64 = 20;

/// One synthetic temperature reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryReading<'a> {
    pub device: &'a str,
    pub temperature: i64,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Command<'a> {
    pub action: &'a str,
}

pub fn telemetry_subject(device_id: &str) -> String {
    format!("devices.{device_id}.temperature")
}

pub fn command_subject(device_id: &str) -> String {
    format!("commands.{device_id}")
}

pub struct DeviceSimulator<'a, T: Transport> {
    transport: &'a T,
    config: &'a ConnectionConfig,
    settings: DeviceSettings,
    interrupt: Interrupt,
}

impl<'a, T: Transport> DeviceSimulator<'a, T> {
    pub fn new(transport: &'a T, config: &'a ConnectionConfig, settings: DeviceSettings) -> Self {
        Self {
            transport,
            config,
            settings,
            interrupt: Interrupt::never(),
        }
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub async fn run(&self) -> Vec<ScenarioResult> {
        let mut results = Vec::with_capacity(STEPS.len());
        if self.interrupt.is_triggered() {
            skip_remaining(&mut results, "interrupted");
            return results;
        }

        let started = Instant::now();
        let conn = match self.connect().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(device = %self.settings.id, "✗ Device simulation error: {e}");
                results.push(ScenarioResult::from_error(
                    SCENARIO,
                    STEP_CONNECT,
                    &e,
                    started.elapsed(),
                ));
                skip_remaining(&mut results, "device not connected");
                return results;
            }
        };
        info!(device = %self.settings.id, "✓ Connected as device");
        results.push(ScenarioResult::passed(
            SCENARIO,
            STEP_CONNECT,
            format!("connected as device '{}'", self.settings.id),
            started.elapsed(),
        ));

        let outcome = AssertUnwindSafe(self.run_steps(&conn, &mut results))
            .catch_unwind()
            .await;
        conn.close().await;

        match outcome {
            Ok(()) => skip_remaining(&mut results, "interrupted"),
            Err(panic) => {
                let detail = panic_detail(panic.as_ref());
                if let Some(step) = STEPS.get(results.len()) {
                    error!(step = *step, "Device step panicked: {detail}");
                    results.push(ScenarioResult::fatal(
                        SCENARIO,
                        *step,
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

    async fn run_steps(&self, conn: &T::Connection, results: &mut Vec<ScenarioResult>) {
        // subscribe
        let started = Instant::now();
        let mut commands = match conn.subscribe(COMMAND_PATTERN).await {
            Ok(sub) => {
                info!("✓ Subscribed to commands");
                results.push(ScenarioResult::passed(
                    SCENARIO,
                    STEP_SUBSCRIBE,
                    format!("subscribed to '{COMMAND_PATTERN}'"),
                    started.elapsed(),
                ));
                Some(sub)
            }
            Err(e) => {
                warn!("Command subscription failed: {e}");
                results.push(ScenarioResult::from_error(
                    SCENARIO,
                    STEP_SUBSCRIBE,
                    &e,
                    started.elapsed(),
                ));
                None
            }
        };

        if !self.interrupt.is_triggered() {
            results.push(self.publish_telemetry(conn).await);
            if !self.interrupt.is_triggered() {
                results.push(self.send_command(conn, commands.as_mut()).await);
            }
        }

        if let Some(sub) = commands.as_mut() {
            sub.unsubscribe();
        }
    }

    async fn publish_telemetry(&self, conn: &T::Connection) -> ScenarioResult {
        let started = Instant::now();
        let subject = telemetry_subject(&self.settings.id);

        for i in 0..self.settings.readings {
            let reading = TelemetryReading {
                device: &self.settings.id,
                temperature: BASE_TEMPERATURE + i as i64,
                timestamp: Local::now().to_rfc3339(),
            };
            let payload = match serde_json::to_vec(&reading) {
                Ok(payload) => payload,
                Err(e) => {
                    return ScenarioResult::from_error(
                        SCENARIO,
                        STEP_TELEMETRY,
                        &TransportError::Unexpected(e.to_string()),
                        started.elapsed(),
                    );
                }
            };

            if let Err(e) = conn.publish(&subject, Bytes::from(payload)).await {
                warn!(%subject, "Telemetry publish failed: {e}");
                return ScenarioResult::from_error(SCENARIO, STEP_TELEMETRY, &e, started.elapsed());
            }
            info!(
                %subject,
                temperature = reading.temperature,
                "[TELEMETRY] Sent reading {}/{}",
                i + 1,
                self.settings.readings
            );
            tokio::time::sleep(self.settings.interval()).await;
        }

        ScenarioResult::passed(
            SCENARIO,
            STEP_TELEMETRY,
            format!("sent {} readings to '{subject}'", self.settings.readings),
            started.elapsed(),
        )
    }

    async fn send_command(
        &self,
        conn: &T::Connection,
        commands: Option<&mut Subscription>,
    ) -> ScenarioResult {
        let started = Instant::now();
        let subject = command_subject(&self.settings.id);
        let payload = match serde_json::to_vec(&Command { action: "reboot" }) {
            Ok(payload) => payload,
            Err(e) => {
                return ScenarioResult::from_error(
                    SCENARIO,
                    STEP_COMMAND,
                    &TransportError::Unexpected(e.to_string()),
                    started.elapsed(),
                );
            }
        };

        if let Err(e) = conn.publish(&subject, Bytes::from(payload)).await {
            warn!(%subject, "Command publish failed: {e}");
            return ScenarioResult::from_error(SCENARIO, STEP_COMMAND, &e, started.elapsed());
        }

        let detail = match commands {
            Some(sub) => {
                let observed = observe_commands(sub, self.settings.command_wait()).await;
                format!("published reboot to '{subject}'; observed {observed} command(s)")
            }
            None => format!("published reboot to '{subject}'; not subscribed to commands"),
        };
        ScenarioResult::passed(SCENARIO, STEP_COMMAND, detail, started.elapsed())
    }
}

/// Logs every command arriving within `wait`.
async fn observe_commands(sub: &mut Subscription, wait: Duration) -> usize {
    let deadline = Instant::now() + wait;
    let mut observed = 0;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match sub.next_timeout(remaining).await {
            Some(msg) => {
                observed += 1;
                info!("[COMMAND] Received: {} on {}", msg.payload_text(), msg.subject);
            }
            None => break,
        }
    }
    observed
}

/// One skipped result per device step, for when the device never runs.
pub fn skipped_steps(reason: &str) -> Vec<ScenarioResult> {
    let mut results = Vec::with_capacity(STEPS.len());
    skip_remaining(&mut results, reason);
    results
}

fn skip_remaining(results: &mut Vec<ScenarioResult>, reason: &str) {
    for step in &STEPS[results.len().min(STEPS.len())..] {
        results.push(ScenarioResult::skipped(SCENARIO, *step, reason));
    }
}
