// src/simulated.rs
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::json;

use crate::color::LedColor;
use crate::frame::LedDelta;
use crate::transport::{with_retries, DeviceError, DeviceSessionState, DeviceTransport, COMMAND_RETRIES};

const EFFECT_NAMES: [&str; 6] = ["Solid", "Blink", "Breathe", "Wipe", "Wipe Random", "Random Colors"];

#[derive(Debug)]
struct DeviceModel {
    segment: Range<usize>,
    leds: Vec<LedColor>,
    on: bool,
    brightness: u8,
    effect: u32,
    reachable: bool,
    failures_pending: u32,
    attempts: u32,
    batches: Vec<Vec<LedDelta>>,
    power_commands: Vec<(bool, Option<u8>)>,
    restored: Vec<String>,
    reboots: u32,
}

/// An in-memory stand-in for a light string. Clones share the same device, so
/// a test can keep one handle while the controller owns the transport.
#[derive(Clone, Debug)]
pub struct SimulatedDevice {
    model: Arc<Mutex<DeviceModel>>,
}

impl SimulatedDevice {
    pub fn new(segment: Range<usize>) -> Self {
        let len = segment.end.saturating_sub(segment.start);
        Self {
            model: Arc::new(Mutex::new(DeviceModel {
                segment,
                leds: vec![LedColor::BLACK; len],
                on: false,
                brightness: 128,
                effect: 0,
                reachable: true,
                failures_pending: 0,
                attempts: 0,
                batches: Vec::new(),
                power_commands: Vec::new(),
                restored: Vec::new(),
                reboots: 0,
            })),
        }
    }

    fn model(&self) -> MutexGuard<'_, DeviceModel> {
        self.model.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn transport(&self) -> SimulatedTransport {
        SimulatedTransport { device: self.clone() }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.model().reachable = reachable;
    }

    pub fn set_effect(&self, effect: u32) {
        self.model().effect = effect;
    }

    /// The next `count` request attempts fail.
    pub fn fail_next_requests(&self, count: u32) {
        self.model().failures_pending = count;
    }

    pub fn led(&self, index: usize) -> LedColor {
        let model = self.model();
        model.leds[index - model.segment.start]
    }

    pub fn is_on(&self) -> bool {
        self.model().on
    }

    pub fn brightness(&self) -> u8 {
        self.model().brightness
    }

    /// Every request attempt, including failed ones.
    pub fn attempts(&self) -> u32 {
        self.model().attempts
    }

    pub fn batches(&self) -> Vec<Vec<LedDelta>> {
        self.model().batches.clone()
    }

    pub fn power_commands(&self) -> Vec<(bool, Option<u8>)> {
        self.model().power_commands.clone()
    }

    pub fn restored_states(&self) -> Vec<String> {
        self.model().restored.clone()
    }

    pub fn reboots(&self) -> u32 {
        self.model().reboots
    }

    fn request<T>(&self, handle: impl FnOnce(&mut DeviceModel) -> T) -> Result<T, DeviceError> {
        let mut model = self.model();
        model.attempts += 1;
        if !model.reachable {
            return Err(DeviceError::Unavailable("device unreachable".into()));
        }
        if model.failures_pending > 0 {
            model.failures_pending -= 1;
            return Err(DeviceError::Unavailable("simulated failure".into()));
        }
        Ok(handle(&mut *model))
    }

    fn state_json(model: &DeviceModel) -> String {
        json!({
            "on": model.on,
            "bri": model.brightness,
            "seg": [{
                "id": 0,
                "start": model.segment.start,
                "stop": model.segment.end,
                "len": model.segment.len(),
                "fx": model.effect,
            }],
        })
        .to_string()
    }
}

/// Transport half of a [`SimulatedDevice`]. Requests follow the same bounded
/// retry policy as the JSON API.
pub struct SimulatedTransport {
    device: SimulatedDevice,
}

impl DeviceTransport for SimulatedTransport {
    async fn send_delta(&mut self, deltas: &[LedDelta]) -> Result<(), DeviceError> {
        with_retries("simulated pixels", COMMAND_RETRIES, || {
            let result = self.device.request(|model| {
                for delta in deltas {
                    let slot = delta.index - model.segment.start;
                    model.leds[slot] = delta.color;
                }
                model.on = true;
                model.batches.push(deltas.to_vec());
            });
            async move { result }
        })
        .await
    }

    async fn set_power(&mut self, on: bool, brightness: Option<u8>) -> Result<(), DeviceError> {
        with_retries("simulated power", COMMAND_RETRIES, || {
            let result = self.device.request(|model| {
                model.on = on;
                if let Some(brightness) = brightness {
                    model.brightness = brightness;
                }
                model.power_commands.push((on, brightness));
            });
            async move { result }
        })
        .await
    }

    async fn reboot(&mut self) -> Result<(), DeviceError> {
        with_retries("simulated reboot", COMMAND_RETRIES, || {
            let result = self.device.request(|model| model.reboots += 1);
            async move { result }
        })
        .await
    }

    async fn get_full_state(&mut self) -> Result<String, DeviceError> {
        self.device.request(|model| SimulatedDevice::state_json(model))
    }

    async fn restore_state(&mut self, state: &str) -> Result<(), DeviceError> {
        let parsed = DeviceSessionState::parse(state.to_string()).ok();
        with_retries("simulated restore", COMMAND_RETRIES, || {
            let result = self.device.request(|model| {
                if let Some(parsed) = &parsed {
                    model.on = parsed.is_on();
                    if let Some(brightness) = parsed.brightness() {
                        model.brightness = brightness;
                    }
                }
                model.restored.push(state.to_string());
            });
            async move { result }
        })
        .await
    }

    async fn effect_names(&mut self) -> Result<Vec<String>, DeviceError> {
        self.device
            .request(|_| EFFECT_NAMES.iter().map(|name| name.to_string()).collect())
    }
}
