//! User interrupt handling
//!
//! Scenarios poll an [`Interrupt`] between checks. Once it fires, the current
//! scenario finishes the check in flight, marks the rest as skipped and still
//! closes its connection.

use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Interrupt {
    rx: watch::Receiver<bool>,
}

/// Sending side of a manually driven [`Interrupt`].
#[derive(Debug)]
pub struct InterruptHandle {
    tx: watch::Sender<bool>,
}

impl Interrupt {
    /// An interrupt that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn manual() -> (InterruptHandle, Self) {
        let (tx, rx) = watch::channel(false);
        (InterruptHandle { tx }, Self { rx })
    }

    /// Fires on the first Ctrl-C. Must be called from within a tokio runtime.
    pub fn ctrl_c() -> Self {
        let (handle, interrupt) = Self::manual();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupt received, stopping at the next check boundary");
                    handle.trigger();
                }
                Err(e) => warn!("Unable to listen for Ctrl-C: {e}"),
            }
        });
        interrupt
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }
}

impl InterruptHandle {
    pub fn trigger(&self) {
        // send_replace does not fail when every receiver is gone
        self.tx.send_replace(true);
    }
}
