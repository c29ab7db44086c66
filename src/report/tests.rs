use std::time::Duration;

use super::{ReportFormat, RunReport};
use crate::scenario::ScenarioResult;
use crate::utils::error::ErrorKind;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn mixed_results() -> Vec<ScenarioResult> {
    vec![
        ScenarioResult::passed("connectivity", "connect", "connected", ms(12)),
        ScenarioResult::passed("connectivity", "publish", "published", ms(1)),
        ScenarioResult::failed(
            "connectivity",
            "request_reply",
            ErrorKind::Timeout,
            "no reply within 2000ms",
            ms(2000),
        ),
        ScenarioResult::passed("device", "device.connect", "connected as device", ms(3)),
    ]
}

#[test]
fn test_counts_and_exit_code_for_non_fatal_failure() {
    let report = RunReport::new("nats://broker:4222", mixed_results(), ms(2100));
    assert_eq!(report.total(), 4);
    assert_eq!(report.passed(), 3);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.skipped(), 0);
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn test_fatal_result_sets_exit_code() {
    let results = vec![
        ScenarioResult::fatal(
            "connectivity",
            "connect",
            ErrorKind::Connection,
            "connection refused",
            ms(5),
        ),
        ScenarioResult::skipped("connectivity", "publish", "connect failed"),
    ];
    let report = RunReport::new("nats://broker:4222", results, ms(5));
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.skipped(), 1);
}

#[test]
fn test_text_report_preserves_order_and_marks_failures() {
    let report = RunReport::new("nats://broker:4222", mixed_results(), ms(2100));
    let text = report.render_text();

    let connect = text.find("connect ").unwrap();
    let publish = text.find("publish").unwrap();
    let request = text.find("[FAIL] request_reply").unwrap();
    let device = text.find("device.connect").unwrap();
    assert!(connect < publish && publish < request && request < device);

    assert!(text.contains("Server: nats://broker:4222"));
    assert!(text.contains("[connectivity]"));
    assert!(text.contains("[device]"));
    assert!(text.contains("TimeoutError: no reply within 2000ms"));
    assert!(text.contains("✗ request_reply (TimeoutError): no reply within 2000ms"));
    assert!(text.contains("Total: 4  Passed: 3  Failed: 1  Skipped: 0  Elapsed: 2.10s"));
    assert!(text.contains("Completed with non-fatal failures"));
}

#[test]
fn test_text_report_is_deterministic() {
    let report = RunReport::new("nats://broker:4222", mixed_results(), ms(2100));
    assert_eq!(report.render_text(), report.render_text());
}

#[test]
fn test_all_passing_verdict() {
    let results = vec![ScenarioResult::passed(
        "connectivity",
        "connect",
        "connected",
        ms(1),
    )];
    let text = RunReport::new("loopback://local", results, ms(1)).render_text();
    assert!(text.contains("[PASS] connect"));
    assert!(text.contains("All checks passed"));
    assert!(!text.contains("Failures:"));
}

#[test]
fn test_json_report_shape() {
    let report = RunReport::new("nats://broker:4222", mixed_results(), ms(2100));
    let json = report.render(ReportFormat::Json).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(value["total"], 4);
    assert_eq!(value["failed"], 1);
    assert_eq!(value["exit_code"], 0);
    assert_eq!(value["elapsed_ms"], 2100.0);

    let results = value["results"].as_array().unwrap();
    assert_eq!(results.len(), 4);
    assert_eq!(results[2]["name"], "request_reply");
    assert_eq!(results[2]["error_kind"], "TimeoutError");
    assert_eq!(results[2]["duration_ms"], 2000.0);
    assert_eq!(results[0]["error_kind"], serde_json::Value::Null);
}

#[test]
fn test_report_format_deserializes_lowercase() {
    let format: ReportFormat = serde_json::from_str("\"json\"").unwrap();
    assert_eq!(format, ReportFormat::Json);
    assert_eq!(ReportFormat::default(), ReportFormat::Text);
}
