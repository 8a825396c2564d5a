// src/ddp.rs
use tokio::net::UdpSocket;

use crate::color::LedColor;
use crate::frame::LedDelta;
use crate::json_api::JsonTransport;
use crate::transport::{DeviceError, DeviceTransport};

pub const DDP_PORT: u16 = 4048;

pub const HEADER_LEN: usize = 10;
/// Pixels per datagram.
pub const MAX_PIXELS: usize = 480;

const VERSION_1: u8 = 0x40;
const PUSH: u8 = 0x01;
const DATA_TYPE_RGB: u8 = 0x01;
const DESTINATION_DEFAULT: u8 = 0x01;
/// Sequence numbers cycle 1..=15; 0 means "unused" to receivers.
const SEQUENCE_LIMIT: u8 = 16;

// ----------------------------------------------------------------------
// Packet encoding
// ----------------------------------------------------------------------
/// Callers keep `pixels` within [`MAX_PIXELS`], so the length always fits the
/// 16-bit field.
fn create_ddp_packet(sequence: u8, push: bool, start_index: u32, pixels: &[LedColor]) -> Vec<u8> {
    debug_assert!(pixels.len() <= MAX_PIXELS);
    let data_len = (pixels.len() * 3) as u16;
    let mut packet = Vec::with_capacity(HEADER_LEN + usize::from(data_len));

    packet.push(if push { VERSION_1 | PUSH } else { VERSION_1 });
    packet.push(sequence & 0x0F);
    packet.push(DATA_TYPE_RGB);
    packet.push(DESTINATION_DEFAULT);
    packet.extend_from_slice(&start_index.to_be_bytes());
    packet.extend_from_slice(&data_len.to_be_bytes());

    for pixel in pixels {
        packet.extend_from_slice(&[pixel.red, pixel.green, pixel.blue]);
    }
    packet
}

/// Splits ascending deltas into runs of consecutive indices, at most
/// [`MAX_PIXELS`] long.
pub fn group_runs(deltas: &[LedDelta]) -> Vec<&[LedDelta]> {
    let mut runs = Vec::new();
    let mut run_start = 0;
    for i in 1..=deltas.len() {
        let split = i == deltas.len()
            || i - run_start >= MAX_PIXELS
            || deltas[i].index != deltas[i - 1].index + 1;
        if split {
            runs.push(&deltas[run_start..i]);
            run_start = i;
        }
    }
    runs
}

/// Stateful encoder: one sequence number per batch.
#[derive(Debug, Default)]
pub struct DdpEncoder {
    sequence: u8,
}

impl DdpEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_sequence(&mut self) -> u8 {
        self.sequence += 1;
        if self.sequence >= SEQUENCE_LIMIT {
            self.sequence = 1;
        }
        self.sequence
    }

    /// Encodes one logical frame. Only the final packet carries the push flag.
    pub fn encode(&mut self, deltas: &[LedDelta]) -> Vec<Vec<u8>> {
        if deltas.is_empty() {
            return Vec::new();
        }
        let sequence = self.next_sequence();
        let runs = group_runs(deltas);
        let last = runs.len() - 1;
        runs.iter()
            .enumerate()
            .map(|(i, run)| {
                let colors: Vec<LedColor> = run.iter().map(|d| d.color).collect();
                create_ddp_packet(sequence, i == last, run[0].index as u32, &colors)
            })
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedPacket {
    pub push: bool,
    pub sequence: u8,
    pub deltas: Vec<LedDelta>,
}

/// Parses a packet produced by [`DdpEncoder::encode`]. Used by receivers in
/// tests and for diagnostics.
pub fn decode_ddp_packet(packet: &[u8]) -> Result<DecodedPacket, DeviceError> {
    if packet.len() < HEADER_LEN {
        return Err(DeviceError::MalformedState(format!("DDP packet too short: {} bytes", packet.len())));
    }
    let start = u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]) as usize;
    let data_len = usize::from(u16::from_be_bytes([packet[8], packet[9]]));
    let data = &packet[HEADER_LEN..];
    if data.len() != data_len || data_len % 3 != 0 {
        return Err(DeviceError::MalformedState(format!(
            "DDP length field {} does not match {} data bytes",
            data_len,
            data.len()
        )));
    }
    let deltas = data
        .chunks_exact(3)
        .enumerate()
        .map(|(i, rgb)| LedDelta::new(start + i, LedColor::new(rgb[0], rgb[1], rgb[2])))
        .collect();
    Ok(DecodedPacket {
        push: packet[0] & PUSH != 0,
        sequence: packet[1] & 0x0F,
        deltas,
    })
}

// ----------------------------------------------------------------------
// DDP transport
// ----------------------------------------------------------------------
/// Pixels over DDP; everything else through the JSON API.
pub struct DdpTransport {
    socket: UdpSocket,
    encoder: DdpEncoder,
    control: JsonTransport,
}

impl DdpTransport {
    pub async fn connect(host: &str, port: u16, control: JsonTransport) -> Result<Self, DeviceError> {
        let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
        socket.connect((host, port)).await?;
        log::debug!("DDP: streaming to {}:{}", host, port);
        Ok(Self {
            socket,
            encoder: DdpEncoder::new(),
            control,
        })
    }
}

impl DeviceTransport for DdpTransport {
    async fn send_delta(&mut self, deltas: &[LedDelta]) -> Result<(), DeviceError> {
        for packet in self.encoder.encode(deltas) {
            self.socket.send(&packet).await?;
        }
        Ok(())
    }

    async fn set_power(&mut self, on: bool, brightness: Option<u8>) -> Result<(), DeviceError> {
        self.control.set_power(on, brightness).await
    }

    async fn reboot(&mut self) -> Result<(), DeviceError> {
        self.control.reboot().await
    }

    async fn get_full_state(&mut self) -> Result<String, DeviceError> {
        self.control.get_full_state().await
    }

    async fn restore_state(&mut self, state: &str) -> Result<(), DeviceError> {
        self.control.restore_state(state).await
    }

    async fn effect_names(&mut self) -> Result<Vec<String>, DeviceError> {
        self.control.effect_names().await
    }
}
