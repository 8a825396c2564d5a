// src/color.rs
use std::fmt;
use std::ops::{Add, Mul, Sub};

use thiserror::Error;

/// An 8-bit RGB color as sent to the device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct LedColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid hex color '{0}', expected RRGGBB")]
pub struct ParseColorError(pub String);

impl LedColor {
    pub const BLACK: LedColor = LedColor::new(0, 0, 0);
    pub const WHITE: LedColor = LedColor::new(255, 255, 255);
    pub const RED: LedColor = LedColor::new(255, 0, 0);
    pub const PINK: LedColor = LedColor::new(217, 1, 102);
    pub const GREEN: LedColor = LedColor::new(0, 255, 0);
    pub const BLUE: LedColor = LedColor::new(0, 0, 255);
    pub const ORANGE: LedColor = LedColor::new(255, 165, 0);
    pub const YELLOW: LedColor = LedColor::new(255, 255, 0);

    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Six uppercase hex digits, the form the JSON API expects.
    pub fn to_hex(self) -> String {
        format!("{:02X}{:02X}{:02X}", self.red, self.green, self.blue)
    }

    /// Parses `RRGGBB`, with or without a leading `#`.
    pub fn from_hex(text: &str) -> Result<Self, ParseColorError> {
        let digits = text.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ParseColorError(text.to_string()));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16).map_err(|_| ParseColorError(text.to_string()))
        };
        Ok(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    /// Linear interpolation towards `to`. `progress` is clamped to [0, 1].
    pub fn lerp(self, to: LedColor, progress: f64) -> LedColor {
        let progress = progress.clamp(0.0, 1.0);
        ((to - self) * progress + UnclampedColor::from(self)).to_color()
    }

    /// Additive blend, saturating each channel at 255.
    pub fn blend(self, other: LedColor) -> LedColor {
        LedColor::new(
            self.red.saturating_add(other.red),
            self.green.saturating_add(other.green),
            self.blue.saturating_add(other.blue),
        )
    }

    pub fn scale(self, factor: f64) -> LedColor {
        (self * factor).to_color()
    }
}

impl fmt::Display for LedColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.to_hex())
    }
}

impl serde::Serialize for LedColor {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl std::str::FromStr for LedColor {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// Color arithmetic without clamping. Weighted sums are accumulated here and
/// only rounded and clamped on the way back to a [`LedColor`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct UnclampedColor {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
}

impl UnclampedColor {
    pub const fn new(red: f64, green: f64, blue: f64) -> Self {
        Self { red, green, blue }
    }

    pub fn to_color(self) -> LedColor {
        fn channel(value: f64) -> u8 {
            if value.is_nan() {
                return 0;
            }
            value.round().clamp(0.0, 255.0) as u8
        }
        LedColor::new(channel(self.red), channel(self.green), channel(self.blue))
    }
}

impl From<LedColor> for UnclampedColor {
    fn from(c: LedColor) -> Self {
        Self::new(f64::from(c.red), f64::from(c.green), f64::from(c.blue))
    }
}

impl Add for UnclampedColor {
    type Output = UnclampedColor;

    fn add(self, rhs: UnclampedColor) -> UnclampedColor {
        UnclampedColor::new(self.red + rhs.red, self.green + rhs.green, self.blue + rhs.blue)
    }
}

impl Sub for UnclampedColor {
    type Output = UnclampedColor;

    fn sub(self, rhs: UnclampedColor) -> UnclampedColor {
        UnclampedColor::new(self.red - rhs.red, self.green - rhs.green, self.blue - rhs.blue)
    }
}

impl Mul<f64> for UnclampedColor {
    type Output = UnclampedColor;

    fn mul(self, rhs: f64) -> UnclampedColor {
        UnclampedColor::new(self.red * rhs, self.green * rhs, self.blue * rhs)
    }
}

impl Add for LedColor {
    type Output = UnclampedColor;

    fn add(self, rhs: LedColor) -> UnclampedColor {
        UnclampedColor::from(self) + UnclampedColor::from(rhs)
    }
}

impl Sub for LedColor {
    type Output = UnclampedColor;

    fn sub(self, rhs: LedColor) -> UnclampedColor {
        UnclampedColor::from(self) - UnclampedColor::from(rhs)
    }
}

impl Mul<f64> for LedColor {
    type Output = UnclampedColor;

    fn mul(self, rhs: f64) -> UnclampedColor {
        UnclampedColor::from(self) * rhs
    }
}
