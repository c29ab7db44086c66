//! The `scenario` module holds the connectivity checks and the result type
//! every scenario produces.

pub mod result;
pub mod runner;

pub use result::ScenarioResult;
pub use runner::{Check, ScenarioRunner};
