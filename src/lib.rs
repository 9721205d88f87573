//! `schelling-engine` — Schelling's model of segregation on a square grid.
//!
//! | Module           | Contents                                                   |
//! |------------------|------------------------------------------------------------|
//! | [`distribution`] | Group distribution and threshold vector resolution         |
//! | [`grid`]         | `Grid` storage and clamped neighbourhood windows           |
//! | [`similarity`]   | Local similarity ratio and the mean similarity score       |
//! | [`simulation`]   | `SchellingSimulation`: construction and relocation passes  |
//! | [`annealing`]    | Linear threshold schedules applied between steps           |
//! | [`error`]        | `SchellingError`, `SchellingResult`                        |
//!
//! ```rust,ignore
//! use schelling_common::ModelParams;
//! use schelling_engine::SchellingSimulation;
//!
//! let mut sim = SchellingSimulation::new(ModelParams { seed: Some(42), ..Default::default() })?;
//! let mut scores = vec![sim.mean_similarity()?];
//! for _ in 0..20 {
//!     sim.step()?;
//!     scores.push(sim.mean_similarity()?);
//! }
//! ```

pub mod annealing;
pub mod distribution;
pub mod error;
pub mod grid;
pub mod similarity;
pub mod simulation;

pub use annealing::LinearAnnealing;
pub use distribution::{GroupDistribution, ThresholdVector};
pub use error::{SchellingError, SchellingResult};
pub use grid::{Grid, Window, EMPTY};
pub use simulation::{SchellingSimulation, StepReport};
