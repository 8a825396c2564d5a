// src/json_api.rs
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use serde::Serialize;

use crate::frame::LedDelta;
use crate::transport::{with_retries, DeviceError, DeviceSessionState, DeviceTransport, COMMAND_RETRIES};

// ----------------------------------------------------------------------
// Typed command body for POST /json/state
// ----------------------------------------------------------------------
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StateCommand {
    #[serde(skip_serializing_if = "Option::is_none")]
    on: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bri: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    live: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rb: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seg: Option<SegmentCommand>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SegmentCommand {
    id: u8,
    i: Vec<PixelEntry>,
}

/// Segment pixel data alternates index and hex color: `[3, "FF0000", 7, ...]`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
enum PixelEntry {
    Index(usize),
    Color(String),
}

impl StateCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn power(mut self, on: bool) -> Self {
        self.on = Some(on);
        self
    }

    pub fn brightness(mut self, brightness: u8) -> Self {
        self.bri = Some(brightness);
        self
    }

    pub fn live(mut self, live: bool) -> Self {
        self.live = Some(live);
        self
    }

    pub fn reboot(mut self) -> Self {
        self.rb = Some(true);
        self
    }

    /// Pixel updates for segment 0.
    pub fn pixels(mut self, deltas: &[LedDelta]) -> Self {
        let i = deltas
            .iter()
            .flat_map(|d| [PixelEntry::Index(d.index), PixelEntry::Color(d.color.to_hex())])
            .collect();
        self.seg = Some(SegmentCommand { id: 0, i });
        self
    }

    pub fn to_json(&self) -> Result<String, DeviceError> {
        Ok(serde_json::to_string(self)?)
    }
}

// ----------------------------------------------------------------------
// HTTP client
// ----------------------------------------------------------------------
#[derive(Clone, Debug)]
pub struct JsonApi {
    client: reqwest::Client,
    base: String,
}

impl JsonApi {
    /// `host` may carry a port (`192.168.0.70:8080`) and an `http://` prefix.
    pub fn new(host: &str, timeout: Duration) -> Result<Self, DeviceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let host = host.trim_end_matches('/');
        let base = if host.starts_with("http://") || host.starts_with("https://") {
            format!("{}/json", host)
        } else {
            format!("http://{}/json", host)
        };
        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    async fn get_text(&self, path: &str) -> Result<String, DeviceError> {
        let url = format!("{}/{}", self.base, path);
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }

    pub async fn get_state(&self) -> Result<String, DeviceError> {
        self.get_text("state").await
    }

    pub async fn get_effects(&self) -> Result<Vec<String>, DeviceError> {
        let text = self.get_text("effects").await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// POSTs a JSON body to the state endpoint, retrying on any failure.
    pub async fn post_state(&self, body: String) -> Result<String, DeviceError> {
        let url = format!("{}/state", self.base);
        with_retries("POST /json/state", COMMAND_RETRIES, || {
            let request = self
                .client
                .post(url.as_str())
                .header(CONTENT_TYPE, "application/json")
                .body(body.clone());
            async move {
                let response = request.send().await?.error_for_status()?;
                Ok(response.text().await?)
            }
        })
        .await
    }
}

// ----------------------------------------------------------------------
// JSON transport
// ----------------------------------------------------------------------
pub struct JsonTransport {
    api: JsonApi,
    device_on: bool,
}

impl JsonTransport {
    pub fn new(api: JsonApi) -> Self {
        Self {
            api,
            device_on: false,
        }
    }

    /// Pixels written to a switched-off device are not shown, so the first
    /// batch after power-off also switches it on.
    fn pixel_command(&self, deltas: &[LedDelta]) -> StateCommand {
        let command = StateCommand::new().pixels(deltas);
        if self.device_on {
            command
        } else {
            command.power(true)
        }
    }

    pub(crate) async fn send_command(&mut self, command: &StateCommand) -> Result<(), DeviceError> {
        self.api.post_state(command.to_json()?).await?;
        Ok(())
    }
}

impl DeviceTransport for JsonTransport {
    async fn send_delta(&mut self, deltas: &[LedDelta]) -> Result<(), DeviceError> {
        let command = self.pixel_command(deltas);
        self.send_command(&command).await?;
        self.device_on = true;
        Ok(())
    }

    async fn set_power(&mut self, on: bool, brightness: Option<u8>) -> Result<(), DeviceError> {
        let mut command = StateCommand::new().power(on);
        if let Some(brightness) = brightness {
            command = command.brightness(brightness);
        }
        self.send_command(&command).await?;
        self.device_on = on;
        Ok(())
    }

    async fn reboot(&mut self) -> Result<(), DeviceError> {
        self.send_command(&StateCommand::new().reboot()).await
    }

    async fn get_full_state(&mut self) -> Result<String, DeviceError> {
        let raw = self.api.get_state().await?;
        if let Ok(state) = DeviceSessionState::parse(raw.clone()) {
            self.device_on = state.is_on();
        }
        Ok(raw)
    }

    async fn restore_state(&mut self, state: &str) -> Result<(), DeviceError> {
        self.api.post_state(state.to_string()).await?;
        if let Ok(state) = DeviceSessionState::parse(state.to_string()) {
            self.device_on = state.is_on();
        }
        Ok(())
    }

    async fn effect_names(&mut self) -> Result<Vec<String>, DeviceError> {
        self.api.get_effects().await
    }
}
