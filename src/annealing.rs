//! Linear threshold annealing.
//!
//! Each group's threshold moves in a straight line from its start value to its
//! end value over the run: iteration 0 uses the start values, the last
//! iteration the end values. The schedule writes into the engine's
//! [`ThresholdVector`] between steps.

use crate::distribution::ThresholdVector;
use crate::error::{invalid, SchellingResult};

#[derive(Debug, Clone, PartialEq)]
pub struct LinearAnnealing {
    start: Vec<f64>,
    end: Vec<f64>,
    iterations: u32,
}

impl LinearAnnealing {
    pub fn new(start: &ThresholdVector, end: &ThresholdVector, iterations: u32) -> SchellingResult<Self> {
        if start.group_count() != end.group_count() {
            return Err(invalid(format!(
                "annealing start has {} groups but end has {}",
                start.group_count(),
                end.group_count()
            )));
        }
        Ok(Self {
            start: start.group_values(),
            end: end.group_values(),
            iterations,
        })
    }

    /// Interpolated thresholds of groups `1..=G` for `iteration` (0-based).
    pub fn thresholds_at(&self, iteration: u32) -> Vec<f64> {
        let t = if self.iterations <= 1 {
            0.0
        } else {
            (iteration as f64 / (self.iterations - 1) as f64).clamp(0.0, 1.0)
        };
        self.start
            .iter()
            .zip(&self.end)
            // Weighted form hits both endpoints exactly; the clamp absorbs rounding in between.
            .map(|(s, e)| (s * (1.0 - t) + e * t).clamp(-1.0, 1.0))
            .collect()
    }

    /// Writes the thresholds for `iteration` into `thresholds`.
    pub fn apply(&self, iteration: u32, thresholds: &mut ThresholdVector) -> SchellingResult<()> {
        if thresholds.group_count() != self.start.len() {
            return Err(invalid(format!(
                "annealing schedule has {} groups but the thresholds have {}",
                self.start.len(),
                thresholds.group_count()
            )));
        }
        for (group, value) in (1..=u8::MAX).zip(self.thresholds_at(iteration)) {
            thresholds.set(group, value)?;
        }
        Ok(())
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(values: &[f64]) -> ThresholdVector {
        ThresholdVector::from_group_values(values).unwrap()
    }

    #[test]
    fn endpoints_and_midpoint() {
        let schedule = LinearAnnealing::new(&vector(&[0.8, -0.2]), &vector(&[0.2, 0.6]), 5).unwrap();
        assert_eq!(schedule.thresholds_at(0), vec![0.8, -0.2]);
        assert_eq!(schedule.thresholds_at(4), vec![0.2, 0.6]);
        let mid = schedule.thresholds_at(2);
        assert!((mid[0] - 0.5).abs() < 1e-12);
        assert!((mid[1] - 0.2).abs() < 1e-12);
        // Past the end the schedule holds the end values.
        assert_eq!(schedule.thresholds_at(10), vec![0.2, 0.6]);
    }

    #[test]
    fn single_iteration_uses_start_values() {
        let schedule = LinearAnnealing::new(&vector(&[0.8]), &vector(&[0.2]), 1).unwrap();
        assert_eq!(schedule.thresholds_at(0), vec![0.8]);
    }

    #[test]
    fn apply_writes_into_vector() {
        let schedule = LinearAnnealing::new(&vector(&[1.0, 1.0]), &vector(&[0.0, -1.0]), 3).unwrap();
        let mut thresholds = vector(&[1.0, 1.0]);
        schedule.apply(1, &mut thresholds).unwrap();
        assert_eq!(thresholds.group_values(), vec![0.5, 0.0]);
    }

    #[test]
    fn mismatched_group_counts_rejected() {
        assert!(LinearAnnealing::new(&vector(&[0.5]), &vector(&[0.5, 0.5]), 3).is_err());
        let schedule = LinearAnnealing::new(&vector(&[0.5]), &vector(&[0.1]), 3).unwrap();
        assert!(schedule.apply(0, &mut vector(&[0.5, 0.5])).is_err());
    }
}
