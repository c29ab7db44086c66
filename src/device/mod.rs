//! The `device` module simulates a telemetry producer and command consumer
//! on a connection of its own.

pub mod simulator;

pub use simulator::DeviceSimulator;

#[cfg(test)]
mod tests;
