//! Run report
//!
//! `RunReport` owns the ordered results of every scenario and renders them.
//! Rendering never reorders: results appear exactly as the checks ran.

use std::fmt::Write as _;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::scenario::ScenarioResult;

const RULE_WIDTH: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    target: String,
    results: Vec<ScenarioResult>,
    elapsed: Duration,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    target: &'a str,
    total: usize,
    passed: usize,
    failed: usize,
    skipped: usize,
    elapsed_ms: f64,
    exit_code: u8,
    results: &'a [ScenarioResult],
}

impl RunReport {
    /// `target` names what was verified, typically the broker addresses.
    pub fn new(target: impl Into<String>, results: Vec<ScenarioResult>, elapsed: Duration) -> Self {
        Self {
            target: target.into(),
            results,
            elapsed,
        }
    }

    pub fn results(&self) -> &[ScenarioResult] {
        &self.results
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.is_passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.is_failed()).count()
    }

    pub fn skipped(&self) -> usize {
        self.results.iter().filter(|r| r.is_skipped()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ScenarioResult> {
        self.results.iter().filter(|r| r.is_failed())
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// 1 if any result is fatal, 0 otherwise. Non-fatal failures such as a
    /// request timeout keep the exit code at 0.
    pub fn exit_code(&self) -> u8 {
        if self.results.iter().any(|r| r.is_fatal()) {
            1
        } else {
            0
        }
    }

    pub fn render(&self, format: ReportFormat) -> Result<String, serde_json::Error> {
        match format {
            ReportFormat::Text => Ok(self.render_text()),
            ReportFormat::Json => self.render_json(),
        }
    }

    pub fn render_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&JsonReport {
            target: &self.target,
            total: self.total(),
            passed: self.passed(),
            failed: self.failed(),
            skipped: self.skipped(),
            elapsed_ms: millis(self.elapsed),
            exit_code: self.exit_code(),
            results: &self.results,
        })
    }

    pub fn render_text(&self) -> String {
        let heavy = "=".repeat(RULE_WIDTH);
        let light = "-".repeat(RULE_WIDTH);
        let name_width = self
            .results
            .iter()
            .map(|r| r.name().len())
            .max()
            .unwrap_or(0);

        let mut out = String::new();
        // writing into a String cannot fail
        let _ = writeln!(out, "{heavy}");
        let _ = writeln!(out, "Pub/Sub Connectivity Report");
        let _ = writeln!(out, "{heavy}");
        let _ = writeln!(out, "Server: {}", self.target);
        let _ = writeln!(out, "{light}");

        let mut scenario = "";
        for result in &self.results {
            if result.scenario() != scenario {
                scenario = result.scenario();
                let _ = writeln!(out, "\n[{scenario}]");
            }
            let _ = writeln!(
                out,
                "{} {:<name_width$} {:>10}  {}",
                marker(result),
                result.name(),
                format!("{:.1}ms", millis(result.duration())),
                describe(result),
            );
        }

        let _ = writeln!(out, "\n{light}");
        let failures: Vec<&ScenarioResult> = self.failures().collect();
        if !failures.is_empty() {
            let _ = writeln!(out, "Failures:");
            for result in failures {
                let kind = result
                    .error_kind()
                    .map(|k| k.as_str())
                    .unwrap_or("UnexpectedError");
                let _ = writeln!(out, "  ✗ {} ({kind}): {}", result.name(), result.detail());
            }
        }
        let _ = writeln!(
            out,
            "Total: {}  Passed: {}  Failed: {}  Skipped: {}  Elapsed: {:.2}s",
            self.total(),
            self.passed(),
            self.failed(),
            self.skipped(),
            self.elapsed.as_secs_f64()
        );
        let verdict = match (self.exit_code(), self.failed()) {
            (0, 0) => "All checks passed ✓",
            (0, _) => "Completed with non-fatal failures",
            _ => "Run aborted by a fatal error ✗",
        };
        let _ = writeln!(out, "{verdict}");
        let _ = write!(out, "{heavy}");
        out
    }
}

fn marker(result: &ScenarioResult) -> &'static str {
    if result.is_passed() {
        "[PASS]"
    } else if result.is_skipped() {
        "[SKIP]"
    } else {
        "[FAIL]"
    }
}

fn describe(result: &ScenarioResult) -> String {
    match result.error_kind() {
        Some(kind) => format!("{kind}: {}", result.detail()),
        None => result.detail().to_string(),
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
