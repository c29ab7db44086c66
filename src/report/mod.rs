//! The `report` module turns the collected scenario results into the text
//! or JSON summary printed at the end of a run.

pub mod reporter;

pub use reporter::{ReportFormat, RunReport};

#[cfg(test)]
mod tests;
