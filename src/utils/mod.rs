//! The `utils` module collects the pieces shared by every scenario:
//! the error taxonomy, tracing setup and the user-interrupt signal.

pub mod error;
pub mod logging;
pub mod signal;

pub use error::{ErrorKind, TransportError};
pub use signal::{Interrupt, InterruptHandle};
