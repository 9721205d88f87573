use serde::{Deserialize, Serialize};

/// Group sizes, either as a number of equally sized groups or as explicit
/// population fractions (one per group, summing to less than 1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupsSpec {
    Count(u32),
    Fractions(Vec<f64>),
}

/// Similarity thresholds, either one value shared by every group or one value per group.
/// Negative values mark diversity-seeking groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThresholdsSpec {
    Uniform(f64),
    PerGroup(Vec<f64>),
}

/// What the engine does when an agent must move but no home is empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VacancyPolicy {
    /// Abort the step with a `NoVacancy` error.
    #[default]
    Fail,
    /// Leave the agent where it is and carry on with the pass.
    Skip,
}

/// Model parameters derived from the configuration, consumed once by the engine at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParams {
    pub population: u64,
    pub groups: GroupsSpec,
    pub thresholds: ThresholdsSpec,
    pub pct_empty: f64,
    pub neighbour_depth: usize,
    pub seed: Option<u64>, // None = seed from OS entropy
    pub vacancy_policy: VacancyPolicy,
}

impl Default for ModelParams {
    fn default() -> Self {
        ModelParams {
            population: 2500,
            groups: GroupsSpec::Count(2),
            thresholds: ThresholdsSpec::Uniform(0.5),
            pct_empty: 0.25,
            neighbour_depth: 2,
            seed: None,
            vacancy_policy: VacancyPolicy::Fail,
        }
    }
}
