//! Runs the connectivity scenario and then the device scenario, one after
//! the other, and gathers their results into a single report. A fatal
//! connectivity result aborts the run: the device steps are reported as
//! skipped.

use config::ConfigError;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::Settings;
use crate::device::{DeviceSimulator, simulator};
use crate::report::RunReport;
use crate::scenario::ScenarioRunner;
use crate::transport::Transport;
use crate::utils::signal::Interrupt;

/// Fails only when the settings cannot produce a connection config; every
/// broker-side problem ends up in the report instead.
pub async fn run_suite<T: Transport>(
    transport: &T,
    settings: &Settings,
    interrupt: Interrupt,
) -> Result<RunReport, ConfigError> {
    let config = settings.connection_config()?;
    let device_config = settings.device_connection_config()?;
    let started = Instant::now();

    info!(
        servers = ?config.servers(),
        user = config.credentials().username().unwrap_or("-"),
        "Starting connectivity checks"
    );
    let mut results = ScenarioRunner::new(transport, &config, settings.checks.clone())
        .with_interrupt(interrupt.clone())
        .run()
        .await;

    let aborted = results.iter().any(|r| r.is_fatal());
    if settings.device.enabled && aborted {
        let reason = if results.first().is_some_and(|r| r.is_fatal()) {
            "connect failed"
        } else {
            "aborted after unexpected error"
        };
        warn!("Connectivity checks aborted, skipping device simulation");
        results.extend(simulator::skipped_steps(reason));
    } else if settings.device.enabled {
        info!(device = %settings.device.id, "Starting device simulation");
        let device_results = DeviceSimulator::new(transport, &device_config, settings.device.clone())
            .with_interrupt(interrupt)
            .run()
            .await;
        results.extend(device_results);
    }

    Ok(RunReport::new(
        config.servers().join(", "),
        results,
        started.elapsed(),
    ))
}
