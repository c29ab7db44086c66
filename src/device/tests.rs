use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::simulator::{
    COMMAND_PATTERN, DeviceSimulator, STEP_COMMAND, STEP_CONNECT, STEP_SUBSCRIBE,
    STEP_TELEMETRY, STEPS, TelemetryReading, command_subject, skipped_steps, telemetry_subject,
};
use crate::config::{ConnectionConfig, Credentials, DeviceSettings, Settings};
use crate::transport::memory::{MemoryBroker, MemoryConnection, MemoryTransport};
use crate::transport::{Connection, ConnectionMetadata, Message, Subscription, Transport};
use crate::utils::error::{ErrorKind, TransportError};
use crate::utils::signal::{Interrupt, InterruptHandle};

/// Loopback transport that misbehaves on device publishes.
#[derive(Default)]
struct FaultyTransport {
    inner: MemoryTransport,
    panic_on_telemetry: bool,
    interrupt_on_publish: Option<Arc<InterruptHandle>>,
}

#[derive(Clone)]
struct FaultyConnection {
    inner: MemoryConnection,
    panic_on_telemetry: bool,
    interrupt_on_publish: Option<Arc<InterruptHandle>>,
}

#[async_trait]
impl Transport for FaultyTransport {
    type Connection = FaultyConnection;

    async fn connect(&self, config: &ConnectionConfig) -> Result<FaultyConnection, TransportError> {
        Ok(FaultyConnection {
            inner: self.inner.connect(config).await?,
            panic_on_telemetry: self.panic_on_telemetry,
            interrupt_on_publish: self.interrupt_on_publish.clone(),
        })
    }
}

#[async_trait]
impl Connection for FaultyConnection {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), TransportError> {
        if let Some(handle) = &self.interrupt_on_publish {
            handle.trigger();
        }
        if self.panic_on_telemetry && subject.starts_with("devices.") {
            panic!("sensor exploded");
        }
        self.inner.publish(subject, payload).await
    }

    async fn subscribe(&self, pattern: &str) -> Result<Subscription, TransportError> {
        self.inner.subscribe(pattern).await
    }

    async fn request(
        &self,
        subject: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Message, TransportError> {
        self.inner.request(subject, payload, timeout).await
    }

    async fn close(&self) {
        self.inner.close().await
    }

    fn metadata(&self) -> ConnectionMetadata {
        self.inner.metadata()
    }
}

fn config() -> ConnectionConfig {
    ConnectionConfig::new(
        vec!["loopback://local".to_string()],
        Credentials::None,
        Duration::from_secs(1),
    )
    .unwrap()
}

fn fast_device() -> DeviceSettings {
    DeviceSettings {
        readings: 3,
        interval_ms: 1,
        command_wait_ms: 50,
        ..Settings::default().device
    }
}

#[test]
fn test_subjects_follow_device_id() {
    assert_eq!(telemetry_subject("device001"), "devices.device001.temperature");
    assert_eq!(command_subject("device001"), "commands.device001");
}

#[test]
fn test_reading_serializes_as_flat_json() {
    let reading = TelemetryReading {
        device: "device001",
        temperature: 21,
        timestamp: "2025-01-01T00:00:00+00:00".to_string(),
    };
    let json: serde_json::Value = serde_json::to_value(&reading).unwrap();
    assert_eq!(json["device"], "device001");
    assert_eq!(json["temperature"], 21);
    assert_eq!(json["timestamp"], "2025-01-01T00:00:00+00:00");
}

#[tokio::test]
async fn test_device_run_publishes_telemetry_and_sees_its_command() {
    let transport = MemoryTransport::default();

    // an observer on a separate connection sees the telemetry stream
    let observer = transport.connect(&config()).await.unwrap();
    let mut telemetry = observer.subscribe("devices.*.temperature").await.unwrap();

    let config = config();
    let results = DeviceSimulator::new(&transport, &config, fast_device())
        .run()
        .await;

    let names: Vec<&str> = results.iter().map(|r| r.name()).collect();
    assert_eq!(names, STEPS.to_vec());
    assert!(results.iter().all(|r| r.is_passed()), "{results:#?}");
    assert!(results[3].detail().contains("observed 1 command(s)"));

    let mut temperatures = Vec::new();
    while let Some(msg) = telemetry.try_next() {
        let value: serde_json::Value = serde_json::from_slice(&msg.payload).unwrap();
        temperatures.push(value["temperature"].as_i64().unwrap());
    }
    assert_eq!(temperatures, vec![20, 21, 22]);

    telemetry.unsubscribe();
    observer.close().await;
    assert_eq!(transport.broker().subscription_count(), 0);
    assert_eq!(transport.broker().client_count(), 0);
}

#[tokio::test]
async fn test_connection_failure_is_reported_but_not_fatal() {
    let broker = MemoryBroker::new().require_credentials(Credentials::Token("device".into()));
    let transport = MemoryTransport::new(broker);

    let config = config();
    let results = DeviceSimulator::new(&transport, &config, fast_device())
        .run()
        .await;

    assert_eq!(results.len(), STEPS.len());
    assert_eq!(results[0].name(), STEP_CONNECT);
    assert_eq!(results[0].error_kind(), Some(ErrorKind::Connection));
    assert!(!results[0].is_fatal());
    assert!(results[1..].iter().all(|r| r.is_skipped()));
}

#[tokio::test]
async fn test_interrupted_device_run_is_skipped() {
    let transport = MemoryTransport::default();
    let (handle, interrupt) = Interrupt::manual();
    handle.trigger();

    let config = config();
    let results = DeviceSimulator::new(&transport, &config, fast_device())
        .with_interrupt(interrupt)
        .run()
        .await;

    assert!(results.iter().all(|r| r.is_skipped()));
    assert_eq!(transport.broker().client_count(), 0);
}

#[tokio::test]
async fn test_zero_readings_still_sends_command() {
    let transport = MemoryTransport::default();
    let settings = DeviceSettings {
        readings: 0,
        ..fast_device()
    };

    let config = config();
    let results = DeviceSimulator::new(&transport, &config, settings).run().await;
    let command = results.iter().find(|r| r.name() == STEP_COMMAND).unwrap();
    assert!(command.is_passed());
    assert!(command.detail().contains(COMMAND_PATTERN.trim_end_matches(".>")));
}

#[tokio::test]
async fn test_interrupt_during_telemetry_skips_command_and_releases() {
    let (handle, interrupt) = Interrupt::manual();
    let transport = FaultyTransport {
        interrupt_on_publish: Some(Arc::new(handle)),
        ..Default::default()
    };

    let config = config();
    let results = DeviceSimulator::new(&transport, &config, fast_device())
        .with_interrupt(interrupt)
        .run()
        .await;

    let names: Vec<&str> = results.iter().map(|r| r.name()).collect();
    assert_eq!(names, STEPS.to_vec());
    // the telemetry step in flight completes, the command step never runs
    assert!(results[2].is_passed());
    assert_eq!(results[2].name(), STEP_TELEMETRY);
    assert!(results[3].is_skipped());
    assert_eq!(results[3].detail(), "interrupted");
    assert_eq!(transport.inner.broker().subscription_count(), 0);
    assert_eq!(transport.inner.broker().client_count(), 0);
}

#[tokio::test]
async fn test_panicking_step_is_reported_and_connection_closed() {
    let transport = FaultyTransport {
        panic_on_telemetry: true,
        ..Default::default()
    };

    let config = config();
    let results = DeviceSimulator::new(&transport, &config, fast_device())
        .run()
        .await;

    assert_eq!(results.len(), STEPS.len());
    assert!(results[1].is_passed());
    assert_eq!(results[1].name(), STEP_SUBSCRIBE);

    let telemetry = &results[2];
    assert_eq!(telemetry.name(), STEP_TELEMETRY);
    assert_eq!(telemetry.error_kind(), Some(ErrorKind::Unexpected));
    assert_eq!(telemetry.detail(), "sensor exploded");
    assert!(results[3].is_skipped());
    assert_eq!(transport.inner.broker().subscription_count(), 0);
    assert_eq!(transport.inner.broker().client_count(), 0);
}

#[test]
fn test_skipped_steps_cover_every_step() {
    let results = skipped_steps("connect failed");
    let names: Vec<&str> = results.iter().map(|r| r.name()).collect();
    assert_eq!(names, STEPS.to_vec());
    assert!(results.iter().all(|r| r.is_skipped() && r.detail() == "connect failed"));
}
