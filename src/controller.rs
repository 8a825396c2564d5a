// src/controller.rs
use std::ops::Range;
use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::cancel::{self, CancelToken};
use crate::color::LedColor;
use crate::coordinates::{CoordinateTable, Point3};
use crate::frame::{ColorFrame, LedDelta};
use crate::monitor::{ConnectionStatus, LinkMonitor};
use crate::transport::{DeviceError, DeviceSessionState, DeviceTransport};

const UPDATE_CHANNEL_CAPACITY: usize = 64;
/// Minimum spacing between the intermediate applies of a fade.
pub const FADE_STEP: Duration = Duration::from_millis(20);

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("no LED coordinates loaded")]
pub struct NoCoordinates;

/// Owns the frame buffer and the transport for one light string.
///
/// Exactly one animation drives a controller at a time; the scheduler's worker
/// loop owns it for the lifetime of the process.
pub struct LedController<T> {
    transport: T,
    session: DeviceSessionState,
    frame: ColorFrame,
    coordinates: Option<CoordinateTable>,
    link: LinkMonitor,
    last_apply: Option<Instant>,
    next_apply_floor: Option<Instant>,
    updates: broadcast::Sender<Vec<LedDelta>>,
}

impl<T: DeviceTransport> LedController<T> {
    /// Reads the device state and sizes the frame from segment 0. An
    /// unreachable device or an unreadable state leaves the controller
    /// disconnected on the fallback segment.
    pub async fn connect(transport: T, coordinates: Option<CoordinateTable>) -> Self {
        let session = DeviceSessionState::fallback();
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        let mut controller = Self {
            transport,
            frame: ColorFrame::new(session.segment()),
            session,
            coordinates,
            link: LinkMonitor::new(ConnectionStatus::default()),
            last_apply: None,
            next_apply_floor: None,
            updates,
        };
        controller.load_state().await;
        controller
    }

    async fn load_state(&mut self) {
        let loaded = match self.transport.get_full_state().await {
            Ok(raw) => DeviceSessionState::parse(raw),
            Err(e) => Err(e),
        };
        let session = match loaded {
            Ok(session) => {
                let segment = session.segment();
                info!("Controller: Connected. Segment {}..{} ({} LEDs).", segment.start, segment.end, segment.len());
                self.link.reset(true);
                session
            }
            Err(e) => {
                let session = DeviceSessionState::fallback();
                let segment = session.segment();
                warn!(
                    "Controller: Device unreachable ({}). Running disconnected on {}..{}.",
                    e, segment.start, segment.end
                );
                self.link.reset(false);
                session
            }
        };

        self.frame = ColorFrame::new(session.segment());
        self.session = session;
        self.last_apply = None;
        self.next_apply_floor = None;

        if let Some(coordinates) = &self.coordinates {
            if coordinates.len() != self.frame.len() {
                warn!(
                    "Controller: {} coordinates loaded but the device reports {} LEDs.",
                    coordinates.len(),
                    self.frame.len()
                );
            }
        }
    }

    /// Re-reads the device state and rebuilds the frame. Never fails; an
    /// unreachable device leaves the controller disconnected.
    pub async fn reconnect(&mut self) {
        info!("Controller: Reconnecting...");
        self.load_state().await;
    }

    // ------------------------------------------------------------------
    // Frame mutation (no I/O)
    // ------------------------------------------------------------------
    pub fn set_led(&mut self, index: usize, color: LedColor) {
        self.frame.set_desired(index, color);
    }

    pub fn set_leds(&mut self, deltas: &[LedDelta]) {
        for delta in deltas {
            self.frame.set_desired(delta.index, delta.color);
        }
    }

    pub fn set_all(&mut self, color: LedColor) {
        self.frame.set_all_desired(color);
    }

    /// Sets every LED from its index and current desired color.
    pub fn set_leds_with(&mut self, mut color_for: impl FnMut(usize, LedColor) -> LedColor) {
        for index in self.frame.range() {
            let color = color_for(index, self.frame.desired(index));
            self.frame.set_desired(index, color);
        }
    }

    /// Sets every LED that has a coordinate from its position.
    pub fn set_leds_by_coordinate(
        &mut self,
        mut color_for: impl FnMut(Point3) -> LedColor,
    ) -> Result<(), NoCoordinates> {
        let coordinates = self.coordinates.as_ref().ok_or(NoCoordinates)?;
        for (index, point) in self.frame.range().zip(coordinates.points()) {
            self.frame.set_desired(index, color_for(*point));
        }
        Ok(())
    }

    pub fn get_led(&self, index: usize) -> LedColor {
        self.frame.desired(index)
    }

    pub fn frame(&self) -> &ColorFrame {
        &self.frame
    }

    pub fn led_range(&self) -> Range<usize> {
        self.frame.range()
    }

    pub fn led_count(&self) -> usize {
        self.frame.len()
    }

    pub fn coordinates(&self) -> Option<&CoordinateTable> {
        self.coordinates.as_ref()
    }

    pub fn session_state(&self) -> &DeviceSessionState {
        &self.session
    }

    pub fn is_connected(&self) -> bool {
        self.link.status().is_connected()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.link.status().clone()
    }

    /// Every successful apply is published here.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<LedDelta>> {
        self.updates.subscribe()
    }

    // ------------------------------------------------------------------
    // Applying updates
    // ------------------------------------------------------------------
    pub async fn apply_update(&mut self, token: &CancelToken) -> Vec<LedDelta> {
        self.apply_update_paced(token, Duration::ZERO, Duration::ZERO).await
    }

    /// Sends the pending diff to the device and returns what was applied.
    ///
    /// Waits first until `min_delay_before` has passed since the previous
    /// apply and until the floor set by the previous call's
    /// `min_delay_since`. Cancelling `token` cuts the wait short but the
    /// apply still happens. A failed dispatch returns an empty list and leaves
    /// the frame uncommitted so the diff is retried on the next call.
    pub async fn apply_update_paced(
        &mut self,
        token: &CancelToken,
        min_delay_before: Duration,
        min_delay_since: Duration,
    ) -> Vec<LedDelta> {
        let mut now = Instant::now();
        let wait = self.pacing_wait(now, min_delay_before);
        if !wait.is_zero() {
            cancel::sleep(wait, token).await;
            now = Instant::now();
        }

        self.last_apply = Some(now);
        self.next_apply_floor = Some(now + min_delay_since);

        let deltas = self.frame.compute_delta();
        if deltas.is_empty() {
            return deltas;
        }

        if self.is_connected() {
            match self.transport.send_delta(&deltas).await {
                Ok(()) => self.link.record_success(),
                Err(e) => {
                    warn!("Controller: Dropped update of {} LEDs: {}", deltas.len(), e);
                    self.link.record_failure();
                    return Vec::new();
                }
            }
        }

        self.frame.commit();
        if self.updates.receiver_count() > 0 {
            let _ = self.updates.send(deltas.clone());
        }
        deltas
    }

    fn pacing_wait(&self, now: Instant, min_delay_before: Duration) -> Duration {
        let since_last = self
            .last_apply
            .map(|last| (last + min_delay_before).saturating_duration_since(now))
            .unwrap_or_default();
        let until_floor = self
            .next_apply_floor
            .map(|floor| floor.saturating_duration_since(now))
            .unwrap_or_default();
        since_last.max(until_floor)
    }

    /// Fades one LED from its current color to `to` over `duration`, applying
    /// as it goes. Ends on exactly `to` unless cancelled.
    pub async fn fade_led(&mut self, index: usize, duration: Duration, to: LedColor, token: &CancelToken) {
        let from = self.get_led(index);
        let started = Instant::now();
        while !token.is_cancelled() {
            let elapsed = started.elapsed();
            if elapsed >= duration {
                break;
            }
            let progress = elapsed.as_secs_f64() / duration.as_secs_f64();
            self.set_led(index, from.lerp(to, progress));
            self.apply_update_paced(token, FADE_STEP, Duration::ZERO).await;
        }
        self.set_led(index, to);
        self.apply_update(token).await;
    }

    // ------------------------------------------------------------------
    // Whole-device commands
    // ------------------------------------------------------------------
    fn record<V>(&mut self, result: &Result<V, DeviceError>) {
        match result {
            Ok(_) => self.link.record_success(),
            Err(_) => {
                self.link.record_failure();
            }
        }
    }

    pub async fn set_power(&mut self, on: bool, brightness: Option<u8>) -> Result<(), DeviceError> {
        if !self.is_connected() {
            debug!("Controller: Not connected, skipping power {}.", if on { "on" } else { "off" });
            return Ok(());
        }
        let result = self.transport.set_power(on, brightness).await;
        self.record(&result);
        result
    }

    /// Sends back the state captured at connect time.
    pub async fn restore_state(&mut self) -> Result<(), DeviceError> {
        if !self.is_connected() {
            debug!("Controller: Not connected, skipping state restore.");
            return Ok(());
        }
        let raw = self.session.raw().to_string();
        let result = self.transport.restore_state(&raw).await;
        self.record(&result);
        result
    }

    pub async fn reboot(&mut self) -> Result<(), DeviceError> {
        if !self.is_connected() {
            debug!("Controller: Not connected, skipping reboot.");
            return Ok(());
        }
        let result = self.transport.reboot().await;
        self.record(&result);
        result
    }

    /// Name of the effect the device was running at connect time.
    pub async fn current_effect(&mut self) -> Result<Option<String>, DeviceError> {
        let Some(effect) = self.session.effect() else {
            return Ok(None);
        };
        if !self.is_connected() {
            return Ok(None);
        }
        let result = self.transport.effect_names().await;
        self.record(&result);
        Ok(result?.into_iter().nth(effect as usize))
    }

    /// Best-effort teardown: restore the original state, then reboot, which
    /// some firmware needs before it honours the restored configuration.
    pub async fn shutdown(&mut self) {
        if !self.is_connected() {
            info!("Controller: Not connected, nothing to restore.");
            return;
        }
        info!("Controller: Restoring original device state...");
        if let Err(e) = self.restore_state().await {
            warn!("Controller: Failed to restore device state: {}", e);
        }
        if let Err(e) = self.reboot().await {
            warn!("Controller: Failed to reboot device: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelSource;
    use crate::simulated::SimulatedDevice;
    use crate::transport::{COMMAND_RETRIES, FALLBACK_SEGMENT};

    async fn connected(range: Range<usize>) -> (SimulatedDevice, LedController<crate::simulated::SimulatedTransport>) {
        let device = SimulatedDevice::new(range);
        let controller = LedController::connect(device.transport(), None).await;
        assert!(controller.is_connected());
        (device, controller)
    }

    #[tokio::test(start_paused = true)]
    async fn apply_sends_diff_and_commits() {
        let (device, mut controller) = connected(0..10).await;
        let token = CancelToken::never();

        controller.set_all(LedColor::WHITE);
        let applied = controller.apply_update(&token).await;
        assert_eq!(applied.len(), 10);
        assert_eq!(device.led(9), LedColor::WHITE);

        assert!(controller.apply_update(&token).await.is_empty());
        assert_eq!(device.batches().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_drop_the_update_without_committing() {
        let (device, mut controller) = connected(0..10).await;
        let token = CancelToken::never();

        controller.set_led(4, LedColor::RED);
        device.fail_next_requests(COMMAND_RETRIES + 1);
        let applied = controller.apply_update(&token).await;

        assert!(applied.is_empty());
        assert_eq!(controller.frame().applied(4), LedColor::BLACK);
        assert_eq!(device.led(4), LedColor::BLACK);
        assert!(controller.is_connected());

        // The diff is still pending and goes out on the next cycle.
        let applied = controller.apply_update(&token).await;
        assert_eq!(applied, vec![LedDelta::new(4, LedColor::RED)]);
        assert_eq!(device.led(4), LedColor::RED);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_failures_switch_to_disconnected_mode() {
        let (device, mut controller) = connected(0..4).await;
        let token = CancelToken::never();
        let status = controller.status();

        for i in 0..3 {
            controller.set_all(if i % 2 == 0 { LedColor::RED } else { LedColor::BLUE });
            device.fail_next_requests(COMMAND_RETRIES + 1);
            assert!(controller.apply_update(&token).await.is_empty());
        }
        assert!(!status.is_connected());

        // Disconnected: applies are committed locally without touching the device.
        let attempts = device.attempts();
        controller.set_all(LedColor::GREEN);
        assert_eq!(controller.apply_update(&token).await.len(), 4);
        assert_eq!(device.attempts(), attempts);

        controller.reconnect().await;
        assert!(status.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn min_delay_before_is_measured_from_previous_apply() {
        let (_device, mut controller) = connected(0..4).await;
        let token = CancelToken::never();

        controller.set_all(LedColor::RED);
        controller.apply_update(&token).await;
        let first = Instant::now();

        controller.set_all(LedColor::BLUE);
        controller
            .apply_update_paced(&token, Duration::from_millis(100), Duration::ZERO)
            .await;
        assert!(first.elapsed() >= Duration::from_millis(100));

        // Time spent elsewhere counts towards the gap.
        tokio::time::sleep(Duration::from_millis(150)).await;
        let before = Instant::now();
        controller
            .apply_update_paced(&token, Duration::from_millis(100), Duration::ZERO)
            .await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn min_delay_since_sets_floor_for_next_apply() {
        let (_device, mut controller) = connected(0..4).await;
        let token = CancelToken::never();

        controller
            .apply_update_paced(&token, Duration::ZERO, Duration::from_millis(500))
            .await;
        let first = Instant::now();

        controller.set_led(0, LedColor::PINK);
        let applied = controller.apply_update(&token).await;
        assert_eq!(applied.len(), 1);
        assert!(first.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_skips_the_wait_but_still_applies() {
        let (device, mut controller) = connected(0..4).await;
        let source = CancelSource::new();
        let token = source.token();

        controller
            .apply_update_paced(&token, Duration::ZERO, Duration::from_secs(3600))
            .await;
        let started = Instant::now();
        source.cancel();

        controller.set_led(2, LedColor::YELLOW);
        let applied = controller.apply_update(&token).await;
        assert_eq!(applied, vec![LedDelta::new(2, LedColor::YELLOW)]);
        assert_eq!(device.led(2), LedColor::YELLOW);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn unreachable_device_uses_fallback_segment() {
        let device = SimulatedDevice::new(0..10);
        device.set_reachable(false);
        let mut controller = LedController::connect(device.transport(), None).await;

        assert!(!controller.is_connected());
        assert_eq!(controller.led_range(), FALLBACK_SEGMENT);
        controller.set_led(694, LedColor::RED);
        assert_eq!(controller.apply_update(&CancelToken::never()).await.len(), 1);

        controller.shutdown().await;
        assert_eq!(device.reboots(), 0);
    }

    #[tokio::test]
    async fn reconnect_picks_up_new_segment() {
        let device = SimulatedDevice::new(0..10);
        device.set_reachable(false);
        let mut controller = LedController::connect(device.transport(), None).await;
        assert!(!controller.is_connected());

        device.set_reachable(true);
        controller.reconnect().await;
        assert!(controller.is_connected());
        assert_eq!(controller.led_range(), 0..10);
    }

    #[tokio::test]
    async fn shutdown_restores_then_reboots() {
        let (device, mut controller) = connected(0..4).await;
        let original = controller.session_state().raw().to_string();

        controller.set_power(true, Some(255)).await.unwrap();
        assert_eq!(device.brightness(), 255);

        controller.shutdown().await;
        assert_eq!(device.restored_states(), vec![original]);
        assert_eq!(device.reboots(), 1);
        assert_eq!(device.brightness(), 128);
    }

    #[tokio::test]
    async fn current_effect_is_named_from_effect_list() {
        let device = SimulatedDevice::new(0..4);
        device.set_effect(2);
        let mut controller = LedController::connect(device.transport(), None).await;
        assert_eq!(controller.current_effect().await.unwrap().as_deref(), Some("Breathe"));
    }

    #[tokio::test]
    async fn subscribers_see_applied_deltas() {
        let (_device, mut controller) = connected(0..4).await;
        let mut updates = controller.subscribe();

        controller.set_leds(&[LedDelta::new(1, LedColor::RED), LedDelta::new(3, LedColor::RED)]);
        let applied = controller.apply_update(&CancelToken::never()).await;
        assert_eq!(updates.recv().await.unwrap(), applied);
    }

    #[tokio::test]
    async fn coordinate_setters_need_a_table() {
        let (_device, mut controller) = connected(0..3).await;
        assert_eq!(controller.set_leds_by_coordinate(|_| LedColor::RED), Err(NoCoordinates));

        let device = SimulatedDevice::new(0..3);
        let table = CoordinateTable::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(0.0, 0.0, 2.0),
        ]);
        let mut controller = LedController::connect(device.transport(), Some(table)).await;
        controller
            .set_leds_by_coordinate(|p| if p.z >= 1.0 { LedColor::WHITE } else { LedColor::BLACK })
            .unwrap();
        let lit: Vec<usize> = controller.frame().compute_delta().iter().map(|d| d.index).collect();
        assert_eq!(lit, vec![1, 2]);
    }

    #[tokio::test]
    async fn set_leds_with_sees_index_and_current_color() {
        let (_device, mut controller) = connected(10..14).await;
        controller.set_led(11, LedColor::BLUE);
        controller.set_leds_with(|index, current| if index % 2 == 0 { LedColor::RED } else { current });
        assert_eq!(controller.get_led(10), LedColor::RED);
        assert_eq!(controller.get_led(11), LedColor::BLUE);
        assert_eq!(controller.get_led(13), LedColor::BLACK);
    }

    #[tokio::test(start_paused = true)]
    async fn fade_ends_on_target_color() {
        let (device, mut controller) = connected(0..2).await;
        let token = CancelToken::never();
        let started = Instant::now();

        controller.fade_led(1, Duration::from_millis(200), LedColor::WHITE, &token).await;

        assert!(started.elapsed() >= Duration::from_millis(200));
        assert_eq!(device.led(1), LedColor::WHITE);
        assert!(device.batches().len() > 2);
    }
}
