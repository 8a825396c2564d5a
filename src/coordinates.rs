// src/coordinates.rs
use std::path::Path;

use anyhow::{bail, Context, Result};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Calibrated 3D position of every LED, in segment order: entry `i` belongs to
/// LED `segment.start + i`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CoordinateTable {
    points: Vec<Point3>,
}

impl CoordinateTable {
    pub fn new(points: Vec<Point3>) -> Self {
        Self { points }
    }

    /// One point per line, optionally wrapped in `[` `]`. Lines with seven
    /// fields are `index,x,y,z,r,theta,delta` calibration output; otherwise
    /// the first three fields are x, y, z.
    pub fn parse(text: &str) -> Result<Self> {
        let mut points = Vec::new();
        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields = line
                .trim_matches(|c| c == '[' || c == ']')
                .split(',')
                .map(|f| f.trim().parse::<f64>())
                .collect::<Result<Vec<f64>, _>>()
                .with_context(|| format!("line {}: invalid number in '{}'", line_no + 1, line))?;

            let xyz = match fields.len() {
                7 => &fields[1..4],
                n if n >= 3 => &fields[0..3],
                n => bail!("line {}: expected at least 3 fields, found {}", line_no + 1, n),
            };
            points.push(Point3::new(xyz[0], xyz[1], xyz[2]));
        }
        Ok(Self { points })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read coordinates file at: {}", path.display()))?;
        Self::parse(&text)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point3] {
        &self.points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bracketed_and_calibration_lines() {
        let text = "[0.1, 0.2, 0.3]\n\n4,1.0,2.0,3.0,0.5,1.2,0.01\n  -1,-2,-3  \n";
        let table = CoordinateTable::parse(text).unwrap();
        assert_eq!(
            table.points(),
            &[Point3::new(0.1, 0.2, 0.3), Point3::new(1.0, 2.0, 3.0), Point3::new(-1.0, -2.0, -3.0)]
        );
    }

    #[test]
    fn reports_the_bad_line() {
        let err = CoordinateTable::parse("1,2,3\n1,x,3\n").unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
        let err = CoordinateTable::parse("1,2\n").unwrap_err();
        assert!(err.to_string().contains("line 1"), "{err}");
    }
}
