// src/cancel.rs
//! Cooperative cancellation for animations.
//!
//! A [`CancelSource`] owns a `watch` channel carrying a single "cancelled"
//! flag; every [`CancelToken`] is a receiver on it. Tokens are polled at loop
//! boundaries with [`CancelToken::is_cancelled`] and raced against sleeps with
//! [`sleep`].

use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;

/// Returned by [`CancelToken::check`] so animations can bail out with `?`.
/// The worker loop treats it as a normal exit.
#[derive(Clone, Copy, Debug, Default, Error, PartialEq, Eq)]
#[error("animation cancelled")]
pub struct Cancelled;

#[derive(Debug)]
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

impl CancelSource {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }

    /// Idempotent.
    pub fn cancel(&self) {
        // send_replace works with zero receivers, unlike send.
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// A token nobody can cancel.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once the token is cancelled. Pends forever if the source was
    /// dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Sleeps for `duration` unless `token` fires first. Returns `true` when the
/// full duration elapsed. Waking early is never an error.
pub async fn sleep(duration: Duration, token: &CancelToken) -> bool {
    if token.is_cancelled() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = token.cancelled() => false,
    }
}
