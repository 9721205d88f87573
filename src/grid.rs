use std::ops::RangeInclusive;

use rand::distr::weighted::WeightedIndex;
use rand::prelude::*;
use schelling_common::GridLabels;

use crate::distribution::GroupDistribution;
use crate::error::{invalid, SchellingResult};

/// Label of an empty home.
pub const EMPTY: u8 = 0;

/// Square grid of homes, stored row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    side: usize,
    cells: Vec<u8>,
}

impl Grid {
    /// Samples `side * side` labels independently from `distribution`.
    pub fn initialize<R: Rng + ?Sized>(
        side: usize,
        distribution: &GroupDistribution,
        rng: &mut R,
    ) -> SchellingResult<Self> {
        if side == 0 {
            return Err(invalid("grid side length must be positive"));
        }
        let categories = WeightedIndex::new(distribution.as_slice())
            .map_err(|e| invalid(format!("group distribution is not sampleable: {e}")))?;
        let cells = (0..side * side)
            .map(|_| categories.sample(rng) as u8)
            .collect();
        Ok(Self { side, cells })
    }

    /// Builds a grid from explicit rows. Rows must form a non-empty square.
    pub fn from_rows(rows: Vec<Vec<u8>>) -> SchellingResult<Self> {
        let side = rows.len();
        if side == 0 {
            return Err(invalid("grid must have at least one row"));
        }
        if let Some(row) = rows.iter().find(|r| r.len() != side) {
            return Err(invalid(format!(
                "grid must be square: found a row of length {} in a grid of {side} rows",
                row.len()
            )));
        }
        Ok(Self { side, cells: rows.into_iter().flatten().collect() })
    }

    #[inline(always)]
    pub fn side(&self) -> usize {
        self.side
    }

    /// Total number of homes (`side²`).
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline(always)]
    pub fn get(&self, row: usize, col: usize) -> u8 {
        self.cells[self.index(row, col)]
    }

    #[inline(always)]
    pub fn set(&mut self, row: usize, col: usize, label: u8) {
        let idx = self.index(row, col);
        self.cells[idx] = label;
    }

    #[inline(always)]
    pub fn get_idx(&self, idx: usize) -> u8 {
        self.cells[idx]
    }

    #[inline(always)]
    pub fn set_idx(&mut self, idx: usize, label: u8) {
        self.cells[idx] = label;
    }

    /// Row-major linear index of (row, col).
    #[inline(always)]
    pub fn index(&self, row: usize, col: usize) -> usize {
        assert!(row < self.side && col < self.side, "({row}, {col}) is outside a {0}x{0} grid", self.side);
        row * self.side + col
    }

    /// (row, col) of a row-major linear index.
    #[inline(always)]
    pub fn coords(&self, idx: usize) -> (usize, usize) {
        (idx / self.side, idx % self.side)
    }

    /// The window of homes within `depth` rows and columns of (row, col).
    /// Clamped at the grid edges, so windows shrink at borders and corners.
    pub fn neighbourhood(&self, row: usize, col: usize, depth: usize) -> Window<'_> {
        let last = self.side - 1;
        Window {
            grid: self,
            rows: row.saturating_sub(depth)..=row.saturating_add(depth).min(last),
            cols: col.saturating_sub(depth)..=col.saturating_add(depth).min(last),
        }
    }

    /// Row-major linear indices of every empty home.
    pub fn vacancies(&self) -> Vec<usize> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, &label)| label == EMPTY)
            .map(|(idx, _)| idx)
            .collect()
    }

    /// `counts[l]` = number of homes labelled `l`, for `l` in `0..=group_count`.
    pub fn label_counts(&self, group_count: usize) -> Vec<u64> {
        let mut counts = vec![0u64; group_count + 1];
        for &label in &self.cells {
            if let Some(count) = counts.get_mut(label as usize) {
                *count += 1;
            }
        }
        counts
    }

    /// Highest label present, 0 for an all-empty grid.
    pub fn max_label(&self) -> u8 {
        self.cells.iter().copied().max().unwrap_or(EMPTY)
    }

    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    /// Owned row-major 2D copy, for renderers.
    pub fn rows(&self) -> Vec<Vec<u8>> {
        self.cells.chunks(self.side).map(|r| r.to_vec()).collect()
    }

    pub fn to_labels(&self) -> GridLabels {
        GridLabels { side: self.side, cells: self.cells.clone() }
    }
}

/// Read-only rectangular view around a home.
#[derive(Debug, Clone)]
pub struct Window<'a> {
    grid: &'a Grid,
    rows: RangeInclusive<usize>,
    cols: RangeInclusive<usize>,
}

impl Window<'_> {
    /// (height, width) of the window.
    pub fn shape(&self) -> (usize, usize) {
        (
            self.rows.end() - self.rows.start() + 1,
            self.cols.end() - self.cols.start() + 1,
        )
    }

    /// Number of homes in the window, including the centre.
    pub fn size(&self) -> usize {
        let (h, w) = self.shape();
        h * w
    }

    pub fn row_range(&self) -> RangeInclusive<usize> {
        self.rows.clone()
    }

    pub fn col_range(&self) -> RangeInclusive<usize> {
        self.cols.clone()
    }

    /// Labels in the window, row by row.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        let grid = self.grid;
        let cols = self.cols.clone();
        self.rows.clone().flat_map(move |r| {
            let start = r * grid.side;
            grid.cells[start + cols.start()..=start + cols.end()].iter().copied()
        })
    }

    /// Number of homes in the window holding `label`.
    pub fn count(&self, label: u8) -> usize {
        self.iter().filter(|&l| l == label).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use schelling_common::GroupsSpec;

    fn ramp(side: usize) -> Grid {
        let rows = (0..side)
            .map(|r| (0..side).map(|c| ((r * side + c) % 3) as u8).collect())
            .collect();
        Grid::from_rows(rows).unwrap()
    }

    #[test]
    fn corner_window_is_clamped() {
        let grid = ramp(5);
        let window = grid.neighbourhood(0, 0, 1);
        assert_eq!(window.shape(), (2, 2));
        assert_eq!(window.size(), 4);
        assert_eq!(window.row_range(), 0..=1);
        assert_eq!(window.col_range(), 0..=1);
    }

    #[test]
    fn interior_and_edge_windows() {
        let grid = ramp(5);
        assert_eq!(grid.neighbourhood(2, 2, 1).shape(), (3, 3));
        assert_eq!(grid.neighbourhood(2, 2, 2).shape(), (5, 5));
        assert_eq!(grid.neighbourhood(4, 2, 1).shape(), (2, 3));
        assert_eq!(grid.neighbourhood(2, 4, 2).shape(), (5, 3));
    }

    #[test]
    fn oversized_depth_covers_whole_grid() {
        let grid = ramp(4);
        let window = grid.neighbourhood(3, 1, 10);
        assert_eq!(window.shape(), (4, 4));
        assert_eq!(window.iter().collect::<Vec<_>>(), grid.cells().to_vec());
    }

    #[test]
    fn window_iterates_row_major() {
        let grid = Grid::from_rows(vec![
            vec![1, 2, 0],
            vec![0, 1, 1],
            vec![2, 2, 2],
        ])
        .unwrap();
        let window = grid.neighbourhood(0, 2, 1);
        assert_eq!(window.iter().collect::<Vec<_>>(), vec![2, 0, 1, 1]);
        assert_eq!(window.count(1), 2);
        assert_eq!(window.count(EMPTY), 1);
    }

    #[test]
    fn accessors_round_trip() {
        let mut grid = ramp(3);
        grid.set(1, 2, 7);
        assert_eq!(grid.get(1, 2), 7);
        assert_eq!(grid.get_idx(grid.index(1, 2)), 7);
        assert_eq!(grid.coords(5), (1, 2));
        assert_eq!(grid.rows()[1][2], 7);
    }

    #[test]
    fn non_square_rows_rejected() {
        assert!(Grid::from_rows(vec![vec![0, 1], vec![1]]).is_err());
        assert!(Grid::from_rows(vec![]).is_err());
    }

    #[test]
    fn label_counts_and_vacancies() {
        let grid = Grid::from_rows(vec![vec![0, 1], vec![2, 0]]).unwrap();
        assert_eq!(grid.label_counts(2), vec![2, 1, 1]);
        assert_eq!(grid.vacancies(), vec![0, 3]);
        assert_eq!(grid.max_label(), 2);
    }

    #[test]
    fn initialize_samples_every_home() {
        let dist = GroupDistribution::resolve(100, &GroupsSpec::Count(3), 0.2).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        let grid = Grid::initialize(10, &dist, &mut rng).unwrap();
        assert_eq!(grid.len(), 100);
        assert!(grid.cells().iter().all(|&l| l <= 3));
    }
}
