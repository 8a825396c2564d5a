// src/transport.rs
use std::future::Future;
use std::ops::Range;

use serde::Deserialize;
use thiserror::Error;

use crate::frame::LedDelta;

/// Further attempts made for a failed request/response command.
pub const COMMAND_RETRIES: u32 = 10;

/// State assumed when the device cannot be reached at connect time.
pub const FALLBACK_STATE: &str = r#"{"seg":[{"start":0,"stop":695,"len":695}]}"#;
pub const FALLBACK_SEGMENT: Range<usize> = 0..695;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("UDP send failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed device state: {0}")]
    MalformedState(String),
    #[error("device unavailable: {0}")]
    Unavailable(String),
}

// ----------------------------------------------------------------------
// Transport contract
// ----------------------------------------------------------------------
/// The wire side of a light string: pixel deltas plus whole-device commands.
///
/// Implementations are owned by a single controller, hence `&mut self`.
pub trait DeviceTransport: Send {
    /// Pushes `deltas` (ascending index order) to the device.
    fn send_delta(
        &mut self,
        deltas: &[LedDelta],
    ) -> impl Future<Output = Result<(), DeviceError>> + Send;

    fn set_power(
        &mut self,
        on: bool,
        brightness: Option<u8>,
    ) -> impl Future<Output = Result<(), DeviceError>> + Send;

    fn reboot(&mut self) -> impl Future<Output = Result<(), DeviceError>> + Send;

    /// The device's full state as raw JSON text.
    fn get_full_state(&mut self) -> impl Future<Output = Result<String, DeviceError>> + Send;

    /// Sends a state previously returned by [`get_full_state`](Self::get_full_state).
    fn restore_state(&mut self, state: &str) -> impl Future<Output = Result<(), DeviceError>> + Send;

    /// Effect names, indexed by effect id.
    fn effect_names(&mut self) -> impl Future<Output = Result<Vec<String>, DeviceError>> + Send;
}

/// Runs `attempt` until it succeeds or has failed `retries + 1` times.
/// No backoff between attempts.
pub async fn with_retries<T, F, Fut>(what: &str, retries: u32, mut attempt: F) -> Result<T, DeviceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DeviceError>>,
{
    let mut failures = 0;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if failures < retries => {
                failures += 1;
                log::debug!("Transport: {} failed (attempt {}/{}): {}", what, failures, retries + 1, e);
            }
            Err(e) => {
                log::warn!("Transport: {} failed after {} attempts: {}", what, failures + 1, e);
                return Err(e);
            }
        }
    }
}

// ----------------------------------------------------------------------
// Session state
// ----------------------------------------------------------------------
#[derive(Deserialize)]
struct RawState {
    #[serde(default)]
    on: bool,
    bri: Option<u8>,
    seg: Vec<RawSegment>,
}

#[derive(Deserialize)]
struct RawSegment {
    start: usize,
    stop: usize,
    fx: Option<u32>,
}

/// Device state captured at connect time. The raw text is kept verbatim so it
/// can be sent back on restore; only segment 0 is interpreted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceSessionState {
    raw: String,
    on: bool,
    brightness: Option<u8>,
    effect: Option<u32>,
    segment: Range<usize>,
}

impl DeviceSessionState {
    pub fn parse(raw: String) -> Result<Self, DeviceError> {
        let state: RawState = serde_json::from_str(&raw)
            .map_err(|e| DeviceError::MalformedState(e.to_string()))?;
        let segment = state
            .seg
            .first()
            .ok_or_else(|| DeviceError::MalformedState("no segments reported".into()))?;
        if segment.stop < segment.start {
            return Err(DeviceError::MalformedState(format!(
                "segment stop {} before start {}",
                segment.stop, segment.start
            )));
        }
        Ok(Self {
            on: state.on,
            brightness: state.bri,
            effect: segment.fx,
            segment: segment.start..segment.stop,
            raw,
        })
    }

    pub fn fallback() -> Self {
        Self {
            raw: FALLBACK_STATE.to_string(),
            on: false,
            brightness: None,
            effect: None,
            segment: FALLBACK_SEGMENT,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn brightness(&self) -> Option<u8> {
        self.brightness
    }

    pub fn effect(&self) -> Option<u32> {
        self.effect
    }

    pub fn segment(&self) -> Range<usize> {
        self.segment.clone()
    }
}
