pub mod config;
pub mod sim_params;
pub mod snapshot;

// Re-export key types for easier use by dependent crates
pub use config::{SimulationConfig, ModelConfig, TimingConfig, AnnealingConfig, OutputConfig};
pub use sim_params::{GroupsSpec, ModelParams, ThresholdsSpec, VacancyPolicy};
pub use snapshot::{GridLabels, Snapshot};
