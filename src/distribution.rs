//! Resolution of scalar-or-list group and threshold inputs into fixed-length vectors.
//!
//! Both vectors reserve index 0 for the empty category so that a grid label can
//! index them directly.

use schelling_common::{GroupsSpec, ThresholdsSpec};

use crate::error::{invalid, SchellingResult};

/// Largest group count a `u8` label can address.
pub const MAX_GROUPS: usize = u8::MAX as usize;

/// Sampling probabilities per label: `[empty, group 1, ..., group G]`.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupDistribution {
    weights: Vec<f64>,
}

impl GroupDistribution {
    /// Resolve `groups` against `population` and `pct_empty`.
    ///
    /// With a group count, the non-empty mass `1 - pct_empty` is split equally.
    /// With explicit fractions, the empty share is whatever the fractions leave
    /// over and `pct_empty` is ignored (it is still validated).
    pub fn resolve(population: u64, groups: &GroupsSpec, pct_empty: f64) -> SchellingResult<Self> {
        if population == 0 {
            return Err(invalid("population must be a positive integer"));
        }
        if !open_unit(pct_empty) {
            return Err(invalid(format!("pct_empty must be between 0 and 1, got {pct_empty}")));
        }

        let weights = match groups {
            GroupsSpec::Count(count) => {
                let count = *count as usize;
                if count == 0 {
                    return Err(invalid("group count must be a positive integer"));
                }
                if count > MAX_GROUPS {
                    return Err(invalid(format!("at most {MAX_GROUPS} groups are supported, got {count}")));
                }
                let share = (1.0 - pct_empty) / count as f64;
                std::iter::once(pct_empty)
                    .chain(std::iter::repeat(share).take(count))
                    .collect()
            }
            GroupsSpec::Fractions(fractions) => {
                if fractions.is_empty() {
                    return Err(invalid("group fractions must not be empty"));
                }
                if fractions.len() > MAX_GROUPS {
                    return Err(invalid(format!(
                        "at most {MAX_GROUPS} groups are supported, got {}",
                        fractions.len()
                    )));
                }
                if let Some(bad) = fractions.iter().find(|v| !open_unit(**v)) {
                    return Err(invalid(format!("group values must be between 0 and 1, got {bad}")));
                }
                let total: f64 = fractions.iter().sum();
                if total >= 1.0 {
                    return Err(invalid(format!("the sum of groups must be less than 1, got {total}")));
                }
                std::iter::once(1.0 - total)
                    .chain(fractions.iter().copied())
                    .collect()
            }
        };

        Ok(Self { weights })
    }

    /// Number of occupant groups `G` (excludes the empty category).
    pub fn group_count(&self) -> usize {
        self.weights.len() - 1
    }

    pub fn empty_fraction(&self) -> f64 {
        self.weights[0]
    }

    /// Probability of `label`; index 0 is the empty category.
    pub fn probability(&self, label: u8) -> f64 {
        self.weights[label as usize]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.weights
    }
}

/// Per-group similarity thresholds, indexed by group label. Index 0 is unset.
///
/// The engine owns one of these and reads it at every step, so callers may
/// rewrite values between steps (see [`crate::annealing`]).
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdVector {
    values: Vec<Option<f64>>,
}

impl ThresholdVector {
    /// Resolve `thresholds` for `group_count` groups.
    pub fn resolve(thresholds: &ThresholdsSpec, group_count: usize) -> SchellingResult<Self> {
        let per_group = match thresholds {
            ThresholdsSpec::Uniform(value) => vec![*value; group_count],
            ThresholdsSpec::PerGroup(values) => {
                if values.len() != group_count {
                    return Err(invalid(format!(
                        "the count of threshold values ({}) must match the count of groups ({group_count})",
                        values.len()
                    )));
                }
                values.clone()
            }
        };
        Self::from_group_values(&per_group)
    }

    /// Build from the thresholds of groups `1..=G`, in order.
    pub fn from_group_values(values: &[f64]) -> SchellingResult<Self> {
        if values.is_empty() {
            return Err(invalid("at least one threshold is required"));
        }
        for value in values {
            check_threshold(*value)?;
        }
        Ok(Self {
            values: std::iter::once(None).chain(values.iter().copied().map(Some)).collect(),
        })
    }

    pub fn group_count(&self) -> usize {
        self.values.len() - 1
    }

    /// Threshold of `group`. Panics if `group` is 0 or greater than `G`.
    #[inline]
    pub fn get(&self, group: u8) -> f64 {
        match self.values[group as usize] {
            Some(value) => value,
            None => panic!("label {group} has no threshold"),
        }
    }

    /// Overwrite the threshold of `group`. Values must lie in `[-1, 1]`.
    pub fn set(&mut self, group: u8, value: f64) -> SchellingResult<()> {
        if group == 0 || group as usize > self.group_count() {
            return Err(invalid(format!(
                "group {group} is out of range 1..={}",
                self.group_count()
            )));
        }
        check_threshold(value)?;
        self.values[group as usize] = Some(value);
        Ok(())
    }

    /// Thresholds of groups `1..=G`, in order.
    pub fn group_values(&self) -> Vec<f64> {
        self.values.iter().skip(1).flatten().copied().collect()
    }

    /// Full vector including the unset slot at index 0.
    pub fn as_slice(&self) -> &[Option<f64>] {
        &self.values
    }
}

fn check_threshold(value: f64) -> SchellingResult<()> {
    if !(-1.0..=1.0).contains(&value) {
        return Err(invalid(format!("threshold values must be between -1 and 1, got {value}")));
    }
    Ok(())
}

#[inline]
fn open_unit(value: f64) -> bool {
    value > 0.0 && value < 1.0
}
