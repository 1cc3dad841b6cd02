//! User interrupt plumbing
//!
//! One [`Interrupt`] is created per action. The controller keeps the
//! [`InterruptHandle`] and flips it on Ctrl-C; the executor and pager only
//! observe it between chunks, between pages, and while sleeping for backoff.

use std::time::Duration;
use tokio::sync::watch;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Interrupt {
    rx: watch::Receiver<bool>,
}

#[derive(Debug)]
pub struct InterruptHandle {
    tx: watch::Sender<bool>,
}

/// Create a connected handle/observer pair
pub fn channel() -> (InterruptHandle, Interrupt) {
    let (tx, rx) = watch::channel(false);
    (InterruptHandle { tx }, Interrupt { rx })
}

impl InterruptHandle {
    pub fn interrupt(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_interrupted(&self) -> bool {
        *self.tx.borrow()
    }

    /// Flip this handle on the first Ctrl-C. Dropping the returned task
    /// handle does not stop it; abort it once the action finishes.
    pub fn watch_ctrl_c(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current batch");
                self.interrupt();
            }
        })
    }
}

impl Interrupt {
    /// An observer that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_set(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the interrupt is raised; pends forever if it never can be
    pub async fn raised(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Sleep for `delay` unless interrupted first. Returns `false` when interrupted.
    pub async fn sleep(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.raised() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
