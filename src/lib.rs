// src/lib.rs
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::ValueEnum;

pub mod cancel;
pub mod cli;
pub mod color;
pub mod controller;
pub mod coordinates;
pub mod ddp;
pub mod frame;
pub mod json_api;
pub mod monitor;
pub mod patterns;
pub mod scheduler;
pub mod simulated;
pub mod transport;
pub mod worker;

pub use crate::cancel::{CancelSource, CancelToken, Cancelled};
pub use crate::color::LedColor;
pub use crate::controller::LedController;
pub use crate::coordinates::{CoordinateTable, Point3};
pub use crate::frame::{ColorFrame, LedDelta};
pub use crate::scheduler::{AnimationFuture, AnimationQueue, AnimationScheduler, SchedulerClosed};
pub use crate::transport::{DeviceError, DeviceTransport};
pub use crate::worker::run_worker_loop;

use crate::ddp::DdpTransport;
use crate::json_api::{JsonApi, JsonTransport};
use crate::simulated::SimulatedDevice;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    /// Pixels and commands over the JSON HTTP API
    Json,
    /// Pixels over DDP (UDP), commands over the JSON HTTP API
    Ddp,
    /// In-memory device, no network
    Simulate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PatternKind {
    Solid,
    Binary,
    Sweep,
    Twinkle,
}

#[derive(Clone, Debug)]
pub struct ControllerConfig {
    pub host: String,
    pub transport: TransportKind,
    pub ddp_port: u16,
    pub timeout: Duration,
    pub coordinates_path: Option<PathBuf>,
    pub pattern: PatternKind,
    pub color: LedColor,
    pub simulated_leds: usize,
}

// ----------------------------------------------------------------------
// Host orchestration
// ----------------------------------------------------------------------
pub async fn run(config: ControllerConfig) -> Result<()> {
    log::info!("Starting tree lights...");
    log::info!("Configuration: {:?}", config);

    let coordinates = config
        .coordinates_path
        .as_deref()
        .map(CoordinateTable::load)
        .transpose()?;
    if let Some(table) = &coordinates {
        log::info!("Loaded {} LED coordinates.", table.len());
    }

    match config.transport {
        TransportKind::Json => {
            let api = JsonApi::new(&config.host, config.timeout).context("Failed to build HTTP client")?;
            drive(JsonTransport::new(api), coordinates, &config).await
        }
        TransportKind::Ddp => {
            let api = JsonApi::new(&config.host, config.timeout).context("Failed to build HTTP client")?;
            let transport = DdpTransport::connect(&config.host, config.ddp_port, JsonTransport::new(api))
                .await
                .with_context(|| format!("Failed to open DDP socket to {}:{}", config.host, config.ddp_port))?;
            drive(transport, coordinates, &config).await
        }
        TransportKind::Simulate => {
            let device = SimulatedDevice::new(0..config.simulated_leds);
            drive(device.transport(), coordinates, &config).await
        }
    }
}

async fn drive<T: DeviceTransport + 'static>(
    transport: T,
    coordinates: Option<CoordinateTable>,
    config: &ControllerConfig,
) -> Result<()> {
    let mut controller = LedController::connect(transport, coordinates).await;
    match controller.current_effect().await {
        Ok(Some(effect)) => log::info!("Device was running effect '{}'.", effect),
        Ok(None) => {}
        Err(e) => log::warn!("Could not read effect list: {}", e),
    }
    if let Err(e) = controller.set_power(true, Some(255)).await {
        log::warn!("Failed to power on device: {}", e);
    }

    let (scheduler, queue) = AnimationScheduler::new();
    let worker = tokio::spawn(run_worker_loop(controller, queue));

    start_pattern(&scheduler, config.pattern, config.color).await?;
    log::info!("Running {:?}. Press Ctrl-C to stop.", config.pattern);

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    log::info!("Shutting down...");

    scheduler.shutdown().await;
    let mut controller = worker.await.context("Worker task panicked")?;
    controller.shutdown().await;
    Ok(())
}

async fn start_pattern<T: DeviceTransport + 'static>(
    scheduler: &AnimationScheduler<T>,
    pattern: PatternKind,
    color: LedColor,
) -> Result<(), SchedulerClosed> {
    match pattern {
        PatternKind::Solid => {
            scheduler
                .enqueue("solid", move |ctl, token| Box::pin(patterns::solid(ctl, token, color)))
                .await
        }
        PatternKind::Binary => {
            scheduler
                .enqueue("binary index", |ctl, token| Box::pin(patterns::binary_index(ctl, token)))
                .await
        }
        PatternKind::Sweep => {
            scheduler
                .enqueue("sweep planes", |ctl, token| Box::pin(patterns::sweep_planes(ctl, token)))
                .await
        }
        PatternKind::Twinkle => {
            scheduler
                .enqueue("twinkle", move |ctl, token| Box::pin(patterns::twinkle(ctl, token, color)))
                .await
        }
    }
}
