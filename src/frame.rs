// src/frame.rs
use std::ops::Range;

use serde::Serialize;

use crate::color::LedColor;

/// One changed LED: absolute device index and its new color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LedDelta {
    pub index: usize,
    pub color: LedColor,
}

impl LedDelta {
    pub const fn new(index: usize, color: LedColor) -> Self {
        Self { index, color }
    }
}

// ----------------------------------------------------------------------
// ColorFrame
// ----------------------------------------------------------------------
/// What the device shows (`applied`) against what animation code wants it to
/// show (`desired`), over the device segment `[start, stop)`.
///
/// Indices are absolute device indices. Touching an index outside the segment
/// is a bug in the caller and panics.
#[derive(Clone, Debug)]
pub struct ColorFrame {
    start: usize,
    applied: Vec<LedColor>,
    desired: Vec<LedColor>,
}

impl ColorFrame {
    /// A frame for `range` with every LED believed black.
    pub fn new(range: Range<usize>) -> Self {
        let len = range.end.saturating_sub(range.start);
        Self {
            start: range.start,
            applied: vec![LedColor::BLACK; len],
            desired: vec![LedColor::BLACK; len],
        }
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.desired.len()
    }

    pub fn len(&self) -> usize {
        self.desired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.desired.is_empty()
    }

    fn slot(&self, index: usize) -> usize {
        let range = self.range();
        assert!(
            range.contains(&index),
            "LED index {} outside of segment {}..{}",
            index,
            range.start,
            range.end
        );
        index - self.start
    }

    pub fn set_desired(&mut self, index: usize, color: LedColor) {
        let slot = self.slot(index);
        self.desired[slot] = color;
    }

    pub fn set_all_desired(&mut self, color: LedColor) {
        self.desired.fill(color);
    }

    pub fn desired(&self, index: usize) -> LedColor {
        self.desired[self.slot(index)]
    }

    pub fn applied(&self, index: usize) -> LedColor {
        self.applied[self.slot(index)]
    }

    /// Every LED whose desired color differs from the applied one, in
    /// ascending index order.
    pub fn compute_delta(&self) -> Vec<LedDelta> {
        debug_assert_eq!(self.applied.len(), self.desired.len());
        self.desired
            .iter()
            .zip(&self.applied)
            .enumerate()
            .filter(|(_, (desired, applied))| desired != applied)
            .map(|(slot, (desired, _))| LedDelta::new(self.start + slot, *desired))
            .collect()
    }

    /// Marks the desired colors as shown on the device.
    pub fn commit(&mut self) {
        assert_eq!(
            self.applied.len(),
            self.desired.len(),
            "applied and desired frames must have the same length"
        );
        self.applied.copy_from_slice(&self.desired);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_all_on_black_frame_yields_every_index_then_nothing_after_commit() {
        let mut frame = ColorFrame::new(0..10);
        frame.set_all_desired(LedColor::WHITE);

        let delta = frame.compute_delta();
        assert_eq!(delta.len(), 10);
        for (expected_index, d) in delta.iter().enumerate() {
            assert_eq!(d.index, expected_index);
            assert_eq!(d.color, LedColor::WHITE);
        }

        frame.commit();
        assert!(frame.compute_delta().is_empty());
    }

    #[test]
    fn delta_is_ascending_unique_and_exact() {
        let mut frame = ColorFrame::new(0..20);
        frame.set_desired(15, LedColor::RED);
        frame.set_desired(2, LedColor::BLUE);
        frame.set_desired(9, LedColor::GREEN);
        frame.set_desired(2, LedColor::YELLOW);
        // Setting a slot back to its applied color removes it from the diff.
        frame.set_desired(9, LedColor::BLACK);

        let delta = frame.compute_delta();
        assert_eq!(
            delta,
            vec![LedDelta::new(2, LedColor::YELLOW), LedDelta::new(15, LedColor::RED)]
        );
    }

    #[test]
    fn compute_delta_does_not_mutate() {
        let mut frame = ColorFrame::new(0..5);
        frame.set_desired(1, LedColor::PINK);
        let first = frame.compute_delta();
        let second = frame.compute_delta();
        assert_eq!(first, second);
        assert_eq!(frame.applied(1), LedColor::BLACK);
    }

    #[test]
    fn indices_are_absolute_within_segment() {
        let mut frame = ColorFrame::new(100..105);
        assert_eq!(frame.len(), 5);
        frame.set_desired(104, LedColor::ORANGE);
        assert_eq!(frame.desired(104), LedColor::ORANGE);
        assert_eq!(frame.compute_delta(), vec![LedDelta::new(104, LedColor::ORANGE)]);
    }

    #[test]
    #[should_panic(expected = "outside of segment")]
    fn out_of_range_index_panics() {
        let mut frame = ColorFrame::new(10..20);
        frame.set_desired(9, LedColor::RED);
    }

    #[test]
    fn random_mutations_match_naive_diff() {
        use rand::Rng;

        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let mut frame = ColorFrame::new(3..40);
            let palette = [LedColor::BLACK, LedColor::RED, LedColor::WHITE];
            if rng.gen_bool(0.3) {
                frame.set_all_desired(palette[rng.gen_range(0..palette.len())]);
                frame.commit();
            }
            for _ in 0..rng.gen_range(0..30) {
                let index = rng.gen_range(3..40);
                frame.set_desired(index, palette[rng.gen_range(0..palette.len())]);
            }

            let expected: Vec<usize> = (3..40)
                .filter(|&i| frame.desired(i) != frame.applied(i))
                .collect();
            let actual: Vec<usize> = frame.compute_delta().iter().map(|d| d.index).collect();
            assert_eq!(actual, expected);
        }
    }
}
