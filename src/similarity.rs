//! Local similarity ratio and the population-mean similarity score.
//!
//! The similarity of a home is the share of its non-empty neighbours (the
//! centre excluded) that carry the same label. Homes whose window holds no
//! other agent have no similarity at all; they never move and are left out of
//! the mean.
//!
//! Groups with a negative threshold are diversity-seeking. Their similarity is
//! negated before it is compared with the threshold or averaged, so a high raw
//! similarity becomes a low score.

use rayon::prelude::*;

use crate::distribution::ThresholdVector;
use crate::error::{SchellingError, SchellingResult};
use crate::grid::{Grid, EMPTY};

/// Raw similarity of the home at (row, col), or `None` if the home is empty or
/// has no non-empty neighbour within `depth`.
#[inline]
pub fn local_similarity(grid: &Grid, row: usize, col: usize, depth: usize) -> Option<f64> {
    let label = grid.get(row, col);
    if label == EMPTY {
        return None;
    }
    let window = grid.neighbourhood(row, col, depth);
    let size = window.size();
    let (n_empty, n_same) = window.iter().fold((0usize, 0usize), |(empty, same), l| {
        (empty + (l == EMPTY) as usize, same + (l == label) as usize)
    });
    if size == n_empty + 1 {
        return None;
    }
    // Both counts include the centre home itself.
    Some((n_same - 1) as f64 / (size - n_empty - 1) as f64)
}

/// Applies the diversity-seeking sign convention for `threshold`.
#[inline(always)]
pub fn signed_similarity(similarity: f64, threshold: f64) -> f64 {
    if threshold < 0.0 {
        -similarity
    } else {
        similarity
    }
}

/// Whether an agent with the given sign-adjusted similarity is unhappy.
#[inline(always)]
pub fn is_unhappy(signed_similarity: f64, threshold: f64) -> bool {
    signed_similarity < threshold
}

/// Sign-adjusted similarity of the home at (row, col) under `thresholds`.
#[inline]
pub fn scored_similarity(
    grid: &Grid,
    row: usize,
    col: usize,
    depth: usize,
    thresholds: &ThresholdVector,
) -> Option<f64> {
    local_similarity(grid, row, col, depth)
        .map(|s| signed_similarity(s, thresholds.get(grid.get(row, col))))
}

/// Mean sign-adjusted similarity over every home that has one.
///
/// Per-home scores are computed on the rayon pool and summed in row-major
/// order, so the result does not depend on the number of threads.
pub fn mean_similarity(grid: &Grid, thresholds: &ThresholdVector, depth: usize) -> SchellingResult<f64> {
    let scores: Vec<Option<f64>> = (0..grid.len())
        .into_par_iter()
        .map(|idx| {
            let (row, col) = grid.coords(idx);
            scored_similarity(grid, row, col, depth, thresholds)
        })
        .collect();

    let (sum, count) = scores
        .iter()
        .flatten()
        .fold((0.0f64, 0usize), |(sum, count), s| (sum + s, count + 1));

    if count == 0 {
        return Err(SchellingError::Undefined);
    }
    Ok(sum / count as f64)
}
