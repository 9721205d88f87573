use serde::{Serialize, Deserialize};

/// Row-major copy of the grid labels at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridLabels {
    pub side: usize,
    /// `side * side` labels; 0 is an empty home, 1..=G a group.
    pub cells: Vec<u8>,
}

impl GridLabels {
    pub fn get(&self, row: usize, col: usize) -> u8 {
        self.cells[row * self.side + col]
    }
}

/// A snapshot of the simulation state and metrics after a given iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Number of completed iterations (0 = initial state).
    pub iteration: u32,
    /// Mean similarity score, `None` when no home has a non-empty neighbour.
    pub mean_similarity: Option<f64>,
    /// Thresholds in force for groups 1..=G (index 0 is group 1).
    pub thresholds: Vec<f64>,
    /// `label_counts[l]` is the number of homes holding label `l`; index 0 counts empty homes.
    pub label_counts: Vec<u64>,
    /// Agents relocated by the iteration that produced this state.
    pub moves: u64,
    /// Present when the run was configured to store grids. Always serialized so
    /// bincode files stay readable.
    #[serde(default)]
    pub grid: Option<GridLabels>,
}
