// src/patterns.rs
//! Built-in animations. Each one loops until its token is cancelled.

use std::time::Duration;

use anyhow::{Context, Result};
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::cancel::{self, CancelToken};
use crate::color::LedColor;
use crate::controller::LedController;
use crate::coordinates::Point3;
use crate::transport::DeviceTransport;

const SOLID_REFRESH: Duration = Duration::from_secs(1);

const BINARY_BLANK: Duration = Duration::from_secs(4);
const BINARY_BIT: Duration = Duration::from_secs(1);

const SWEEP_STEPS: u32 = 500;
const SWEEP_PAUSE: Duration = Duration::from_secs(1);

const TWINKLE_FRAME: Duration = Duration::from_millis(40);
const TWINKLE_DECAY: f64 = 0.85;
const TWINKLE_CHANCE: f64 = 0.02;

/// Holds every LED at `color`. Re-applies periodically so a diff dropped by a
/// failed send is picked up again.
pub async fn solid<T: DeviceTransport>(
    controller: &mut LedController<T>,
    token: CancelToken,
    color: LedColor,
) -> Result<()> {
    info!("Patterns: Solid {}", color);
    controller.set_all(color);
    while !token.is_cancelled() {
        controller
            .apply_update_paced(&token, Duration::ZERO, SOLID_REFRESH)
            .await;
        cancel::sleep(SOLID_REFRESH, &token).await;
    }
    Ok(())
}

/// Flashes each LED's index in binary, least significant bit first: red for 0,
/// white for 1. A black pause separates the rounds.
pub async fn binary_index<T: DeviceTransport>(controller: &mut LedController<T>, token: CancelToken) -> Result<()> {
    info!("Patterns: Flashing LED indexes in binary");
    let range = controller.led_range();
    let bits = usize::BITS - range.end.saturating_sub(1).leading_zeros();

    while !token.is_cancelled() {
        controller.set_all(LedColor::BLACK);
        controller.apply_update_paced(&token, Duration::ZERO, BINARY_BLANK).await;

        for bit in 0..bits.max(1) {
            if token.is_cancelled() {
                break;
            }
            controller.set_leds_with(|index, _| {
                if (index >> bit) & 1 == 1 {
                    LedColor::WHITE
                } else {
                    LedColor::RED
                }
            });
            controller.apply_update_paced(&token, Duration::ZERO, BINARY_BIT).await;
        }
    }
    Ok(())
}

/// Sweeps a lit plane up the tree along z, then x, then y. Needs coordinates.
pub async fn sweep_planes<T: DeviceTransport>(controller: &mut LedController<T>, token: CancelToken) -> Result<()> {
    let points = controller
        .coordinates()
        .map(|table| table.points().to_vec())
        .filter(|points| !points.is_empty())
        .context("sweep_planes needs LED coordinates")?;
    info!("Patterns: Sweeping planes across {} LEDs", points.len());

    let axes: [fn(&Point3) -> f64; 3] = [|p| p.z, |p| p.x, |p| p.y];
    while !token.is_cancelled() {
        for axis in axes {
            controller.set_all(LedColor::BLACK);
            controller.apply_update_paced(&token, Duration::ZERO, SWEEP_PAUSE).await;
            if token.is_cancelled() {
                break;
            }

            let (min, max) = points
                .iter()
                .map(axis)
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
            let step = (max - min) / f64::from(SWEEP_STEPS);

            for i in 0..=SWEEP_STEPS {
                if token.is_cancelled() {
                    break;
                }
                let level = min + step * f64::from(i + 1);
                controller.set_leds_by_coordinate(|p| {
                    if axis(&p) <= level {
                        LedColor::WHITE
                    } else {
                        LedColor::BLACK
                    }
                })?;
                controller.apply_update(&token).await;
            }
        }
    }
    Ok(())
}

/// One decay step. Rounding pins very dim channels, so a step that changes
/// nothing goes straight to black.
fn twinkle_decay(current: LedColor) -> LedColor {
    let faded = current.scale(TWINKLE_DECAY);
    if faded == current {
        LedColor::BLACK
    } else {
        faded
    }
}

/// Random LEDs flare to `color` and decay back to black.
pub async fn twinkle<T: DeviceTransport>(
    controller: &mut LedController<T>,
    token: CancelToken,
    color: LedColor,
) -> Result<()> {
    info!("Patterns: Twinkle {}", color);
    let mut rng = StdRng::from_entropy();
    controller.set_all(LedColor::BLACK);

    while !token.is_cancelled() {
        controller.set_leds_with(|_, current| {
            if rng.gen_bool(TWINKLE_CHANCE) {
                color
            } else {
                twinkle_decay(current)
            }
        });
        controller.apply_update_paced(&token, TWINKLE_FRAME, Duration::ZERO).await;
    }
    Ok(())
}
