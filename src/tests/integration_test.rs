use crate::config::{Credentials, Settings};
use crate::report::ReportFormat;
use crate::run_suite;
use crate::transport::memory::{MemoryBroker, MemoryTransport};
use crate::utils::error::ErrorKind;
use crate::utils::signal::Interrupt;

fn loopback_settings() -> Settings {
    let mut settings = Settings::default();
    settings.server.addresses = vec!["loopback://local".to_string()];
    settings.server.connect_timeout_ms = 1_000;
    settings.checks.publish_interval_ms = 1;
    settings.checks.grace_period_ms = 200;
    settings.checks.request_timeout_ms = 200;
    settings.checks.settle_delay_ms = 5;
    settings.device.interval_ms = 1;
    settings.device.command_wait_ms = 50;
    settings
}

#[tokio::test]
async fn integration_suite_against_loopback_broker() {
    let transport = MemoryTransport::default();
    let settings = loopback_settings();

    let report = run_suite(&transport, &settings, Interrupt::never())
        .await
        .expect("suite should run");

    let names: Vec<&str> = report.results().iter().map(|r| r.name()).collect();
    assert_eq!(
        names,
        vec![
            "connect",
            "publish",
            "subscribe",
            "request_reply",
            "introspection",
            "device.connect",
            "device.subscribe",
            "device.telemetry",
            "device.command",
        ]
    );
    assert_eq!(report.failed(), 0, "{}", report.render_text());
    assert_eq!(report.exit_code(), 0);

    // both connections were closed and every subscription released
    assert_eq!(transport.broker().client_count(), 0);
    assert_eq!(transport.broker().subscription_count(), 0);
}

#[tokio::test]
async fn integration_rejected_credentials_exit_with_failure() {
    let broker = MemoryBroker::new().require_credentials(Credentials::UserPassword {
        username: "admin".into(),
        password: "right".into(),
    });
    let transport = MemoryTransport::new(broker);

    let mut settings = loopback_settings();
    settings.auth.username = Some("admin".into());
    settings.auth.password = Some("wrong".into());

    let report = run_suite(&transport, &settings, Interrupt::never())
        .await
        .expect("suite should run");

    assert_eq!(report.exit_code(), 1);
    let connect = &report.results()[0];
    assert!(connect.is_fatal());
    assert_eq!(connect.error_kind(), Some(ErrorKind::Connection));

    // the fatal connect aborts the run, so the device never connects
    let device: Vec<_> = report
        .results()
        .iter()
        .filter(|r| r.scenario() == "device")
        .collect();
    assert_eq!(device.len(), 4);
    assert!(device.iter().all(|r| r.is_skipped()));
    assert!(device.iter().all(|r| r.detail() == "connect failed"));
    assert_eq!(report.skipped(), 8);
    assert_eq!(transport.broker().client_count(), 0);
}

#[tokio::test]
async fn integration_device_runs_after_non_fatal_failures() {
    let broker = MemoryBroker::new().with_max_payload(16);
    let transport = MemoryTransport::new(broker);
    let settings = loopback_settings();

    let report = run_suite(&transport, &settings, Interrupt::never())
        .await
        .expect("suite should run");

    // payload limit breaks publishing, but nothing is fatal
    assert_eq!(report.exit_code(), 0);
    assert!(report.failed() > 0);
    let device_connect = report
        .results()
        .iter()
        .find(|r| r.name() == "device.connect")
        .unwrap();
    assert!(device_connect.is_passed());
}

#[tokio::test]
async fn integration_device_scenario_can_be_disabled() {
    let transport = MemoryTransport::default();
    let mut settings = loopback_settings();
    settings.device.enabled = false;

    let report = run_suite(&transport, &settings, Interrupt::never())
        .await
        .unwrap();
    assert_eq!(report.total(), 5);
    assert!(report.results().iter().all(|r| r.scenario() == "connectivity"));
}

#[tokio::test]
async fn integration_missing_address_is_a_configuration_error() {
    let transport = MemoryTransport::default();
    let settings = Settings::default();
    assert!(run_suite(&transport, &settings, Interrupt::never()).await.is_err());
}

#[tokio::test]
async fn integration_json_report_round_trips_through_serde() {
    let transport = MemoryTransport::default();
    let mut settings = loopback_settings();
    settings.device.enabled = false;

    let report = run_suite(&transport, &settings, Interrupt::never())
        .await
        .unwrap();
    let json = report.render(ReportFormat::Json).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["target"], "loopback://local");
    assert_eq!(value["passed"], 5);
}
