//! # pubsub-verify
//!
//! `pubsub-verify` checks that a publish/subscribe broker (NATS) is reachable
//! and honours its basic messaging guarantees. It connects, publishes,
//! subscribes with a wildcard, performs a request-reply round trip, simulates
//! a telemetry device and prints a pass/fail report with timings.
//!
//! ## Core Modules
//!
//! - `config`: Loads settings from file, environment and CLI, and builds the
//!   `ConnectionConfig` handed to a transport.
//! - `transport`: The broker contract, with a NATS implementation and an
//!   in-process loopback broker.
//! - `scenario`: The ordered connectivity checks and their results.
//! - `device`: The telemetry device simulation.
//! - `report`: Text and JSON rendering of a run, plus the exit code policy.
//! - `suite`: Runs both scenarios in sequence.
//! - `utils`: Error taxonomy, logging and interrupt handling.

pub mod config;
pub mod device;
pub mod report;
pub mod scenario;
pub mod suite;
pub mod transport;
pub mod utils;

pub use suite::run_suite;

#[cfg(test)]
mod tests;
