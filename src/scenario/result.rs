use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::utils::error::{ErrorKind, TransportError};

/// Outcome of a single check.
///
/// Results are immutable once built; the constructors below are the only
/// way to create one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioResult {
    scenario: &'static str,
    name: String,
    passed: bool,
    skipped: bool,
    fatal: bool,
    detail: String,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    duration: Duration,
    error_kind: Option<ErrorKind>,
}

fn serialize_millis<S: Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(duration.as_secs_f64() * 1000.0)
}

impl ScenarioResult {
    pub fn passed(
        scenario: &'static str,
        name: impl Into<String>,
        detail: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            scenario,
            name: name.into(),
            passed: true,
            skipped: false,
            fatal: false,
            detail: detail.into(),
            duration,
            error_kind: None,
        }
    }

    /// A failure that does not stop the run.
    pub fn failed(
        scenario: &'static str,
        name: impl Into<String>,
        kind: ErrorKind,
        detail: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            scenario,
            name: name.into(),
            passed: false,
            skipped: false,
            fatal: false,
            detail: detail.into(),
            duration,
            error_kind: Some(kind),
        }
    }

    /// A failure that aborts the remaining checks and fails the process.
    pub fn fatal(
        scenario: &'static str,
        name: impl Into<String>,
        kind: ErrorKind,
        detail: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            fatal: true,
            ..Self::failed(scenario, name, kind, detail, duration)
        }
    }

    pub fn from_error(
        scenario: &'static str,
        name: impl Into<String>,
        err: &TransportError,
        duration: Duration,
    ) -> Self {
        Self::failed(scenario, name, err.kind(), err.to_string(), duration)
    }

    pub fn skipped(scenario: &'static str, name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            scenario,
            name: name.into(),
            passed: false,
            skipped: true,
            fatal: false,
            detail: reason.into(),
            duration: Duration::ZERO,
            error_kind: None,
        }
    }

    pub fn scenario(&self) -> &'static str {
        self.scenario
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_passed(&self) -> bool {
        self.passed
    }

    pub fn is_skipped(&self) -> bool {
        self.skipped
    }

    pub fn is_failed(&self) -> bool {
        !self.passed && !self.skipped
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }
}
