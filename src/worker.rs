// src/worker.rs
use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use log::{debug, error, info};

use crate::cancel::Cancelled;
use crate::controller::LedController;
use crate::scheduler::AnimationQueue;
use crate::transport::DeviceTransport;

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

// ----------------------------------------------------------------------
// Worker loop
// ----------------------------------------------------------------------
/// Runs queued animations one at a time until the scheduler shuts down, then
/// hands the controller back for teardown.
///
/// A panicking animation is logged and skipped; the controller stays with
/// the loop so later animations and the final restore still run.
pub async fn run_worker_loop<T: DeviceTransport + 'static>(
    mut controller: LedController<T>,
    mut queue: AnimationQueue<T>,
) -> LedController<T> {
    info!("Worker: Waiting for animations...");

    while let Some(animation) = queue.dequeue().await {
        let name = animation.name().to_string();
        debug!("Worker: Starting '{}'.", name);

        match AssertUnwindSafe(animation.run(&mut controller)).catch_unwind().await {
            Ok(Ok(())) => debug!("Worker: '{}' finished.", name),
            Ok(Err(e)) if e.is::<Cancelled>() => debug!("Worker: '{}' cancelled.", name),
            Ok(Err(e)) => error!("Worker: '{}' failed: {:#}", name, e),
            Err(payload) => error!("Worker: '{}' panicked: {}", name, panic_message(&*payload)),
        }
    }

    info!("Worker: Scheduler closed. Stopping.");
    controller
}
