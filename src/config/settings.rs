use std::time::Duration;

use serde::Deserialize;

use crate::report::ReportFormat;

/// Top-level configuration settings for the verifier.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    pub auth: AuthSettings,
    pub checks: CheckSettings,
    pub device: DeviceSettings,
    pub logging: LoggingSettings,
    pub report: ReportSettings,
}

/// Broker addresses and the handshake budget.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerSettings {
    pub addresses: Vec<String>,
    pub connect_timeout_ms: u64,
}

/// Credentials used by the connectivity scenario.
///
/// A token takes precedence over a username/password pair.
#[derive(Deserialize, Clone, Default, PartialEq)]
pub struct AuthSettings {
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Timing knobs for the connectivity checks.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CheckSettings {
    /// Number of follow-up messages published under the wildcard subscription.
    pub fanin_count: usize,
    pub publish_interval_ms: u64,
    pub grace_period_ms: u64,
    pub request_timeout_ms: u64,
    /// Pause between registering the echo responder and sending the request.
    pub settle_delay_ms: u64,
}

impl CheckSettings {
    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publish_interval_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Settings for the simulated telemetry device.
///
/// `username`/`password` fall back to [`AuthSettings`] when unset.
#[derive(Deserialize, Clone, PartialEq)]
pub struct DeviceSettings {
    pub enabled: bool,
    pub id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub readings: usize,
    pub interval_ms: u64,
    pub command_wait_ms: u64,
}

impl std::fmt::Debug for DeviceSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSettings")
            .field("enabled", &self.enabled)
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("readings", &self.readings)
            .field("interval_ms", &self.interval_ms)
            .field("command_wait_ms", &self.command_wait_ms)
            .finish()
    }
}

impl DeviceSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn command_wait(&self) -> Duration {
        Duration::from_millis(self.command_wait_ms)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ReportSettings {
    pub format: ReportFormat,
}

/// Partial configuration settings loaded from files or environment.
///
/// Every field is optional. Missing values are filled from
/// [`Settings::default`].
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub auth: Option<PartialAuthSettings>,
    pub checks: Option<PartialCheckSettings>,
    pub device: Option<PartialDeviceSettings>,
    pub logging: Option<PartialLoggingSettings>,
    pub report: Option<PartialReportSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialServerSettings {
    pub addresses: Option<Vec<String>>,
    pub connect_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialAuthSettings {
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialCheckSettings {
    pub fanin_count: Option<usize>,
    pub publish_interval_ms: Option<u64>,
    pub grace_period_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub settle_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialDeviceSettings {
    pub enabled: Option<bool>,
    pub id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub readings: Option<usize>,
    pub interval_ms: Option<u64>,
    pub command_wait_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialReportSettings {
    pub format: Option<ReportFormat>,
}

impl PartialSettings {
    /// Fills every missing value from `default`.
    pub fn merge(self, default: Settings) -> Settings {
        let server = self.server.unwrap_or_default();
        let auth = self.auth.unwrap_or_default();
        let checks = self.checks.unwrap_or_default();
        let device = self.device.unwrap_or_default();
        let logging = self.logging.unwrap_or_default();
        let report = self.report.unwrap_or_default();

        Settings {
            server: ServerSettings {
                addresses: server.addresses.unwrap_or(default.server.addresses),
                connect_timeout_ms: server
                    .connect_timeout_ms
                    .unwrap_or(default.server.connect_timeout_ms),
            },
            auth: AuthSettings {
                username: auth.username.or(default.auth.username),
                password: auth.password.or(default.auth.password),
                token: auth.token.or(default.auth.token),
            },
            checks: CheckSettings {
                fanin_count: checks.fanin_count.unwrap_or(default.checks.fanin_count),
                publish_interval_ms: checks
                    .publish_interval_ms
                    .unwrap_or(default.checks.publish_interval_ms),
                grace_period_ms: checks
                    .grace_period_ms
                    .unwrap_or(default.checks.grace_period_ms),
                request_timeout_ms: checks
                    .request_timeout_ms
                    .unwrap_or(default.checks.request_timeout_ms),
                settle_delay_ms: checks
                    .settle_delay_ms
                    .unwrap_or(default.checks.settle_delay_ms),
            },
            device: DeviceSettings {
                enabled: device.enabled.unwrap_or(default.device.enabled),
                id: device.id.unwrap_or(default.device.id),
                username: device.username.or(default.device.username),
                password: device.password.or(default.device.password),
                readings: device.readings.unwrap_or(default.device.readings),
                interval_ms: device.interval_ms.unwrap_or(default.device.interval_ms),
                command_wait_ms: device
                    .command_wait_ms
                    .unwrap_or(default.device.command_wait_ms),
            },
            logging: LoggingSettings {
                level: logging.level.unwrap_or(default.logging.level),
            },
            report: ReportSettings {
                format: report.format.unwrap_or(default.report.format),
            },
        }
    }
}

/// Provides default values for `Settings`.
///
/// There is no default broker address: one must come from a file, the
/// environment or the command line.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                addresses: Vec::new(),
                connect_timeout_ms: 10_000,
            },
            auth: AuthSettings::default(),
            checks: CheckSettings {
                fanin_count: 3,
                publish_interval_ms: 100,
                grace_period_ms: 1_000,
                request_timeout_ms: 2_000,
                settle_delay_ms: 100,
            },
            device: DeviceSettings {
                enabled: true,
                id: "device001".to_string(),
                username: None,
                password: None,
                readings: 3,
                interval_ms: 500,
                command_wait_ms: 500,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
            report: ReportSettings {
                format: ReportFormat::Text,
            },
        }
    }
}
