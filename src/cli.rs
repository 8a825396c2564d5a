// src/cli.rs
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::color::LedColor;
use crate::{ControllerConfig, PatternKind, TransportKind};

/// Tree Lights Controller
#[derive(Parser, Debug)]
#[command(author, version, about = "Drives a WLED light string with animated patterns, keeping only one pattern running at a time.", long_about = None)]
pub struct Cli {
    /// IP address or hostname of the WLED controller (e.g., 192.168.1.50)
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// How pixel data reaches the device
    #[arg(short, long, value_enum, default_value_t = TransportKind::Json)]
    pub transport: TransportKind,

    /// UDP port for the Distributed Display Protocol (DDP)
    #[arg(short = 'p', long, default_value_t = crate::ddp::DDP_PORT)]
    pub port: u16,

    /// HTTP request timeout in seconds
    #[arg(long, default_value_t = 10)]
    pub timeout: u64,

    /// Calibrated LED coordinates, one `x,y,z` per line
    #[arg(short, long)]
    pub coordinates: Option<PathBuf>,

    /// Pattern to run
    #[arg(long, value_enum, default_value_t = PatternKind::Solid)]
    pub pattern: PatternKind,

    /// Pattern color as RRGGBB
    #[arg(long, default_value = "D90166")]
    pub color: LedColor,

    /// LED count for the simulated device
    #[arg(long, default_value_t = 100)]
    pub leds: usize,
}

impl Cli {
    pub fn into_config(self) -> ControllerConfig {
        ControllerConfig {
            host: self.host,
            transport: self.transport,
            ddp_port: self.port,
            timeout: Duration::from_secs(self.timeout),
            coordinates_path: self.coordinates,
            pattern: self.pattern,
            color: self.color,
            simulated_leds: self.leds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_map_onto_config() {
        let config = Cli::parse_from(["tree-lights"]).into_config();
        assert_eq!(config.transport, TransportKind::Json);
        assert_eq!(config.ddp_port, 4048);
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.color, LedColor::PINK);
        assert!(config.coordinates_path.is_none());
    }

    #[test]
    fn parses_transport_pattern_and_color() {
        let cli = Cli::parse_from([
            "tree-lights",
            "--host",
            "10.0.0.7",
            "--transport",
            "ddp",
            "--pattern",
            "sweep",
            "--color",
            "#00ff00",
            "-c",
            "coords.txt",
        ]);
        let config = cli.into_config();
        assert_eq!(config.host, "10.0.0.7");
        assert_eq!(config.transport, TransportKind::Ddp);
        assert_eq!(config.pattern, PatternKind::Sweep);
        assert_eq!(config.color, LedColor::GREEN);
        assert_eq!(config.coordinates_path, Some(PathBuf::from("coords.txt")));
    }

    #[test]
    fn rejects_bad_color() {
        assert!(Cli::try_parse_from(["tree-lights", "--color", "nope"]).is_err());
    }
}
