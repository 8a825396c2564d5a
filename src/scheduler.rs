// src/scheduler.rs
//! Single-slot animation queue.
//!
//! Producers hold an [`AnimationScheduler`]; the worker loop holds the matching
//! [`AnimationQueue`]. Enqueueing cancels whatever is running, so at most one
//! animation drives the controller at any time.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use log::debug;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

use crate::cancel::{CancelSource, CancelToken};
use crate::controller::LedController;
use crate::transport::DeviceTransport;

pub type AnimationFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

type AnimationFn<T> =
    Box<dyn for<'a> FnOnce(&'a mut LedController<T>, CancelToken) -> AnimationFuture<'a> + Send>;

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("animation scheduler has shut down")]
pub struct SchedulerClosed;

/// An animation waiting in the queue together with the token it will run
/// under.
pub struct QueuedAnimation<T> {
    name: String,
    run: AnimationFn<T>,
    token: CancelToken,
}

impl<T: DeviceTransport> QueuedAnimation<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    pub async fn run(self, controller: &mut LedController<T>) -> anyhow::Result<()> {
        (self.run)(controller, self.token).await
    }
}

// ----------------------------------------------------------------------
// Producer side
// ----------------------------------------------------------------------
pub struct AnimationScheduler<T> {
    tx: mpsc::Sender<QueuedAnimation<T>>,
    current: Arc<Mutex<CancelSource>>,
    shutdown: Arc<CancelSource>,
}

impl<T> Clone for AnimationScheduler<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            current: Arc::clone(&self.current),
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

impl<T: DeviceTransport + 'static> AnimationScheduler<T> {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (Self, AnimationQueue<T>) {
        let (tx, rx) = mpsc::channel(1);
        let shutdown = Arc::new(CancelSource::new());
        let queue = AnimationQueue {
            rx,
            shutdown: shutdown.token(),
        };
        let scheduler = Self {
            tx,
            current: Arc::new(Mutex::new(CancelSource::new())),
            shutdown,
        };
        (scheduler, queue)
    }

    /// Cancels the running animation and queues `animation` in its place.
    ///
    /// Waits while an earlier, already-cancelled animation still occupies the
    /// slot. Concurrent callers are serialized; the last one wins and every
    /// earlier one is cancelled.
    pub async fn enqueue<F>(&self, name: impl Into<String>, animation: F) -> Result<(), SchedulerClosed>
    where
        F: for<'a> FnOnce(&'a mut LedController<T>, CancelToken) -> AnimationFuture<'a> + Send + 'static,
    {
        let name = name.into();
        let mut current = self.current.lock().await;
        if self.shutdown.is_cancelled() || self.tx.is_closed() {
            return Err(SchedulerClosed);
        }

        current.cancel();
        *current = CancelSource::new();
        let item = QueuedAnimation {
            name,
            run: Box::new(animation),
            token: current.token(),
        };
        debug!("Scheduler: Queued '{}'.", item.name);
        self.tx.send(item).await.map_err(|_| SchedulerClosed)
    }

    /// Cancels the running animation without queueing anything.
    pub async fn stop_running_task(&self) {
        self.current.lock().await.cancel();
    }

    pub async fn restore_state(&self) -> Result<(), SchedulerClosed> {
        self.enqueue("restore state", |controller, _| {
            Box::pin(async move { anyhow::Ok(controller.restore_state().await?) })
        })
        .await
    }

    pub async fn reboot(&self) -> Result<(), SchedulerClosed> {
        self.enqueue("reboot", |controller, _| Box::pin(async move { anyhow::Ok(controller.reboot().await?) }))
            .await
    }

    pub async fn reconnect(&self) -> Result<(), SchedulerClosed> {
        self.enqueue("reconnect", |controller, _| {
            Box::pin(async move {
                controller.reconnect().await;
                anyhow::Ok(())
            })
        })
        .await
    }

    pub async fn turn_off(&self) -> Result<(), SchedulerClosed> {
        self.enqueue("turn off", |controller, _| {
            Box::pin(async move { anyhow::Ok(controller.set_power(false, None).await?) })
        })
        .await
    }

    /// Cancels the running animation and lets the worker loop return.
    pub async fn shutdown(&self) {
        let current = self.current.lock().await;
        self.shutdown.cancel();
        current.cancel();
    }
}

// ----------------------------------------------------------------------
// Consumer side
// ----------------------------------------------------------------------
pub struct AnimationQueue<T> {
    rx: mpsc::Receiver<QueuedAnimation<T>>,
    shutdown: CancelToken,
}

impl<T> AnimationQueue<T> {
    /// Next animation, or `None` once the scheduler is shut down or every
    /// scheduler handle has been dropped.
    pub async fn dequeue(&mut self) -> Option<QueuedAnimation<T>> {
        if self.shutdown.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => None,
            item = self.rx.recv() => item,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::{SimulatedDevice, SimulatedTransport};

    #[tokio::test]
    async fn queued_animation_runs_with_its_own_token() {
        let (scheduler, mut queue) = AnimationScheduler::<SimulatedTransport>::new();
        scheduler
            .enqueue("first", |_, token| Box::pin(async move { anyhow::Ok(token.check()?) }))
            .await
            .unwrap();

        let first = queue.dequeue().await.unwrap();
        assert_eq!(first.name(), "first");
        assert!(!first.token().is_cancelled());

        scheduler.stop_running_task().await;
        assert!(first.token().is_cancelled());

        let mut controller = LedController::connect(SimulatedDevice::new(0..4).transport(), None).await;
        assert!(first.run(&mut controller).await.is_err());
    }

    #[tokio::test]
    async fn superseded_animation_is_cancelled_before_it_starts() {
        let (scheduler, mut queue) = AnimationScheduler::<SimulatedTransport>::new();
        scheduler.enqueue("a", |_, _| Box::pin(async { anyhow::Ok(()) })).await.unwrap();

        let producer = scheduler.clone();
        let second = tokio::spawn(async move { producer.enqueue("b", |_, _| Box::pin(async { anyhow::Ok(()) })).await });

        let a = queue.dequeue().await.unwrap();
        let b = queue.dequeue().await.unwrap();
        second.await.unwrap().unwrap();

        assert_eq!((a.name(), b.name()), ("a", "b"));
        assert!(a.token().is_cancelled());
        assert!(!b.token().is_cancelled());
    }

    #[tokio::test]
    async fn shutdown_ends_the_queue_and_rejects_new_work() {
        let (scheduler, mut queue) = AnimationScheduler::<SimulatedTransport>::new();
        scheduler.shutdown().await;

        assert!(queue.dequeue().await.is_none());
        let result = scheduler.enqueue("late", |_, _| Box::pin(async { anyhow::Ok(()) })).await;
        assert_eq!(result, Err(SchedulerClosed));
    }

    #[tokio::test]
    async fn dropping_every_handle_ends_the_queue() {
        let (scheduler, mut queue) = AnimationScheduler::<SimulatedTransport>::new();
        drop(scheduler);
        assert!(queue.dequeue().await.is_none());
    }
}
