//! CLI for pubsub-verify
//!
//! Runs the connectivity checks and the device simulation against the
//! configured broker and prints a report. Exits with 1 on a fatal connection
//! failure or an unhandled error, 0 otherwise.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use pubsub_verify::config::{Settings, load_config_from};
use pubsub_verify::report::ReportFormat;
use pubsub_verify::run_suite;
use pubsub_verify::transport::memory::MemoryTransport;
use pubsub_verify::transport::nats::NatsTransport;
use pubsub_verify::utils::logging;
use pubsub_verify::utils::signal::Interrupt;
use tracing::error;

const LOOPBACK_ADDRESS: &str = "loopback://local";

#[derive(Parser, Debug)]
#[command(name = "pubsub-verify", version, about = "Verify connectivity to a NATS broker")]
struct Cli {
    /// Broker address, e.g. nats://127.0.0.1:4222 (repeatable)
    #[arg(short, long = "server")]
    servers: Vec<String>,

    #[arg(short, long)]
    user: Option<String>,

    #[arg(short, long)]
    password: Option<String>,

    /// Authentication token, used instead of user/password
    #[arg(long)]
    token: Option<String>,

    /// Handshake timeout in seconds (default: 10)
    #[arg(long, value_parser = parse_seconds)]
    connect_timeout: Option<Duration>,

    #[arg(long, value_enum)]
    format: Option<ReportFormat>,

    #[arg(long)]
    log_level: Option<String>,

    /// Skip the device simulation
    #[arg(long)]
    skip_device: bool,

    /// Run against the in-process loopback broker instead of the network
    #[arg(long)]
    loopback: bool,

    /// Settings file to read instead of config/default
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl Cli {
    /// Command-line values take precedence over file and environment.
    fn apply(&self, settings: &mut Settings) {
        if !self.servers.is_empty() {
            settings.server.addresses = self.servers.clone();
        }
        if self.loopback && settings.server.addresses.is_empty() {
            settings.server.addresses = vec![LOOPBACK_ADDRESS.to_string()];
        }
        if let Some(user) = &self.user {
            settings.auth.username = Some(user.clone());
        }
        if let Some(password) = &self.password {
            settings.auth.password = Some(password.clone());
        }
        if let Some(token) = &self.token {
            settings.auth.token = Some(token.clone());
        }
        if let Some(timeout) = self.connect_timeout {
            settings.server.connect_timeout_ms = timeout.as_millis() as u64;
        }
        if let Some(format) = self.format {
            settings.report.format = format;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level = level.clone();
        }
        if self.skip_device {
            settings.device.enabled = false;
        }
    }
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    let secs: f64 = value
        .parse()
        .map_err(|_| format!("'{value}' is not a number of seconds"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid timeout '{value}': {e}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{e:#}");
            eprintln!("\n✗ Error: {e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run() -> anyhow::Result<u8> {
    // a missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let mut settings =
        load_config_from(cli.config.as_deref()).context("failed to load configuration")?;
    cli.apply(&mut settings);
    logging::init(&settings.logging.level);

    let interrupt = Interrupt::ctrl_c();
    let outcome = if cli.loopback {
        run_suite(&MemoryTransport::default(), &settings, interrupt).await
    } else {
        run_suite(&NatsTransport::new(), &settings, interrupt).await
    };
    let report = outcome.context("invalid connection settings")?;

    println!(
        "{}",
        report
            .render(settings.report.format)
            .context("failed to render report")?
    );
    Ok(report.exit_code())
}
