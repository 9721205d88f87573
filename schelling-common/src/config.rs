use serde::{Deserialize, Serialize};
use anyhow::Result;
use crate::sim_params::{GroupsSpec, ModelParams, ThresholdsSpec, VacancyPolicy};
use std::path::Path;

// Model definition, loaded from the [model] table
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ModelConfig {
    pub population: u64,
    #[serde(default = "default_groups")]
    pub groups: GroupsSpec,
    #[serde(default = "default_thresholds")]
    pub thresholds: ThresholdsSpec,
    #[serde(default = "default_pct_empty")]
    pub pct_empty: f64,
    #[serde(default = "default_neighbour_depth")]
    pub neighbour_depth: usize,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub vacancy_policy: VacancyPolicy,
}

// Configuration for the run length
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TimingConfig {
    pub iterations: u32,
    #[serde(default = "default_record_interval")]
    pub record_interval: u32, // Record a snapshot every N iterations
}

// Linear threshold annealing. Start values are the model thresholds.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct AnnealingConfig {
    pub end_thresholds: ThresholdsSpec,
}

// Configuration for output settings
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    pub base_filename: String,
    #[serde(default = "default_true")]
    pub save_stats: bool,
    #[serde(default = "default_true")]
    pub save_similarity_csv: bool,
    #[serde(default)]
    pub save_grid_in_snapshot: bool,
    pub format: Option<String>, // Output format: "json", "bincode", "messagepack"
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            base_filename: String::from("schelling"),
            save_stats: true,
            save_similarity_csv: true,
            save_grid_in_snapshot: false,
            format: None,
        }
    }
}

// Main simulation configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SimulationConfig {
    pub model: ModelConfig,
    pub timing: TimingConfig,
    #[serde(default)]
    pub annealing: Option<AnnealingConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

impl SimulationConfig {
    /// Loads the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))
    }

    /// Parses and validates a configuration from TOML text.
    /// Model parameters are validated by the engine at construction; only run settings are checked here.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))?;

        if config.timing.iterations == 0 {
            anyhow::bail!("iterations must be greater than 0.");
        }
        if config.timing.record_interval == 0 {
            anyhow::bail!("record_interval must be greater than 0.");
        }
        if config.output.base_filename.trim().is_empty() {
            anyhow::bail!("base_filename must not be empty.");
        }

        Ok(config)
    }

    /// Converts the configuration into the parameters the engine is constructed from.
    pub fn get_model_params(&self) -> ModelParams {
        ModelParams {
            population: self.model.population,
            groups: self.model.groups.clone(),
            thresholds: self.model.thresholds.clone(),
            pct_empty: self.model.pct_empty,
            neighbour_depth: self.model.neighbour_depth,
            seed: self.model.seed,
            vacancy_policy: self.model.vacancy_policy,
        }
    }
}

fn default_groups() -> GroupsSpec {
    GroupsSpec::Count(2)
}

fn default_thresholds() -> ThresholdsSpec {
    ThresholdsSpec::Uniform(0.5)
}

fn default_pct_empty() -> f64 {
    0.25
}

fn default_neighbour_depth() -> usize {
    2 // 5x5 window
}

fn default_record_interval() -> u32 {
    1
}

fn default_true() -> bool {
    true
}
