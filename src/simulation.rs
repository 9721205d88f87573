use crate::distribution::{GroupDistribution, ThresholdVector};
use crate::error::{invalid, SchellingError, SchellingResult};
use crate::grid::{Grid, EMPTY};
use crate::similarity::{is_unhappy, local_similarity, mean_similarity, signed_similarity};
use log::{debug, info, warn};
use rand::prelude::*;
use rand::rngs::StdRng;
use schelling_common::{ModelParams, Snapshot, VacancyPolicy};

/// Outcome of a single relocation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepReport {
    /// Occupied homes evaluated (every agent present at the start of the step).
    pub evaluated: u64,
    /// Agents skipped because no other agent lives in their window.
    pub isolated: u64,
    /// Agents relocated to an empty home.
    pub moved: u64,
    /// Unhappy agents left in place because no home was empty (`VacancyPolicy::Skip` only).
    pub blocked: u64,
}

/// Manages the grid and runs Schelling relocation passes over it.
pub struct SchellingSimulation {
    /// Sampling distribution the grid was drawn from. `None` for grids supplied by the caller.
    distribution: Option<GroupDistribution>,
    /// Current per-group thresholds, re-read at every step.
    thresholds: ThresholdVector,
    /// The live grid. Only `step` writes to it.
    grid: Grid,
    neighbour_depth: usize,
    vacancy_policy: VacancyPolicy,
    /// Drives initial sampling, the visiting order and the choice of new homes.
    rng: StdRng,
    /// Number of completed steps.
    current_iteration: u32,
    /// Stores snapshots recorded by the caller.
    recorded_snapshots: Vec<Snapshot>,
}

impl SchellingSimulation {
    /// Validates `params` and samples the initial grid.
    ///
    /// The grid side is `floor(sqrt(population))`. Every home is drawn
    /// independently from the resolved group distribution.
    pub fn new(params: ModelParams) -> SchellingResult<Self> {
        let distribution = GroupDistribution::resolve(params.population, &params.groups, params.pct_empty)?;
        let thresholds = ThresholdVector::resolve(&params.thresholds, distribution.group_count())?;
        check_depth(params.neighbour_depth)?;

        let mut rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let side = grid_side(params.population);
        let grid = Grid::initialize(side, &distribution, &mut rng)?;

        info!(
            "Initialised {}x{} grid: {} groups, {:.1}% empty, neighbour depth {}, vacancy policy {:?}.",
            side,
            side,
            distribution.group_count(),
            distribution.empty_fraction() * 100.0,
            params.neighbour_depth,
            params.vacancy_policy
        );
        debug!("Group distribution: {:?}", distribution.as_slice());
        debug!("Thresholds: {:?}", thresholds.group_values());

        Ok(Self {
            distribution: Some(distribution),
            thresholds,
            grid,
            neighbour_depth: params.neighbour_depth,
            vacancy_policy: params.vacancy_policy,
            rng,
            current_iteration: 0,
            recorded_snapshots: Vec::new(),
        })
    }

    /// Runs the model over a caller-supplied grid. Every label must have a threshold.
    pub fn from_grid(
        grid: Grid,
        thresholds: ThresholdVector,
        neighbour_depth: usize,
        vacancy_policy: VacancyPolicy,
        seed: u64,
    ) -> SchellingResult<Self> {
        check_depth(neighbour_depth)?;
        let max_label = grid.max_label() as usize;
        if max_label > thresholds.group_count() {
            return Err(invalid(format!(
                "grid holds label {max_label} but only {} thresholds were given",
                thresholds.group_count()
            )));
        }

        Ok(Self {
            distribution: None,
            thresholds,
            grid,
            neighbour_depth,
            vacancy_policy,
            rng: StdRng::seed_from_u64(seed),
            current_iteration: 0,
            recorded_snapshots: Vec::new(),
        })
    }

    /// Performs one relocation pass.
    ///
    /// Every home is visited once, in a fresh uniformly random order. Whether an
    /// agent is unhappy is decided on the grid as it was when the step began;
    /// moves are applied to the live grid immediately, so a home vacated earlier
    /// in the pass is already available to later movers.
    pub fn step(&mut self) -> SchellingResult<StepReport> {
        let depth = self.neighbour_depth;

        // --- 1. Freeze the evaluation state ---
        let snapshot = self.grid.clone();

        // --- 2. Visiting order (Fisher-Yates) ---
        let mut order: Vec<usize> = (0..snapshot.len()).collect();
        order.shuffle(&mut self.rng);

        // Empty homes of the live grid. A move consumes one slot and frees the
        // mover's old home, which takes over the consumed slot.
        let mut vacancies = self.grid.vacancies();
        let mut report = StepReport::default();

        for idx in order {
            // --- 3. Empty homes never move ---
            let label = snapshot.get_idx(idx);
            if label == EMPTY {
                continue;
            }
            report.evaluated += 1;
            debug_assert_eq!(self.grid.get_idx(idx), label, "home {idx} changed before its visit");

            // --- 4./5. Similarity on the frozen grid ---
            let (row, col) = snapshot.coords(idx);
            let Some(similarity) = local_similarity(&snapshot, row, col, depth) else {
                report.isolated += 1;
                continue;
            };

            // --- 6./7. Unhappiness under the current threshold ---
            let threshold = self.thresholds.get(label);
            if !is_unhappy(signed_similarity(similarity, threshold), threshold) {
                continue;
            }

            // --- 8. Relocate to a uniformly random empty home ---
            if vacancies.is_empty() {
                match self.vacancy_policy {
                    VacancyPolicy::Fail => return Err(SchellingError::NoVacancy { row, col }),
                    VacancyPolicy::Skip => {
                        report.blocked += 1;
                        continue;
                    }
                }
            }
            let slot = self.rng.random_range(0..vacancies.len());
            let target = vacancies[slot];
            self.grid.set_idx(target, label);
            self.grid.set_idx(idx, EMPTY);
            vacancies[slot] = idx;
            report.moved += 1;
        }

        if report.blocked > 0 {
            warn!(
                "Iteration {}: {} unhappy agents could not move, no empty home.",
                self.current_iteration + 1,
                report.blocked
            );
        }
        self.current_iteration += 1;
        debug!(
            "Iteration {}: evaluated {}, isolated {}, moved {}.",
            self.current_iteration, report.evaluated, report.isolated, report.moved
        );
        Ok(report)
    }

    /// Mean sign-adjusted similarity of the current grid.
    pub fn mean_similarity(&self) -> SchellingResult<f64> {
        mean_similarity(&self.grid, &self.thresholds, self.neighbour_depth)
    }

    /// Records the metrics of the current grid as a snapshot.
    /// `moves` is the number of agents moved by the step that produced this state.
    pub fn record_snapshot(&mut self, moves: u64, include_grid: bool) -> &Snapshot {
        let mean_similarity = match self.mean_similarity() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Iteration {}: {}", self.current_iteration, e);
                None
            }
        };

        let snapshot = Snapshot {
            iteration: self.current_iteration,
            mean_similarity,
            thresholds: self.thresholds.group_values(),
            label_counts: self.grid.label_counts(self.group_count()),
            moves,
            grid: include_grid.then(|| self.grid.to_labels()),
        };
        self.recorded_snapshots.push(snapshot);
        &self.recorded_snapshots[self.recorded_snapshots.len() - 1]
    }

    /// Provides access to the recorded snapshots.
    pub fn recorded_snapshots(&self) -> &[Snapshot] {
        &self.recorded_snapshots
    }

    /// Read-only view of the live grid, valid between steps.
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn thresholds(&self) -> &ThresholdVector {
        &self.thresholds
    }

    /// Thresholds for callers that adjust them between steps. The next `step` uses the new values.
    pub fn thresholds_mut(&mut self) -> &mut ThresholdVector {
        &mut self.thresholds
    }

    pub fn distribution(&self) -> Option<&GroupDistribution> {
        self.distribution.as_ref()
    }

    pub fn group_count(&self) -> usize {
        self.thresholds.group_count()
    }

    pub fn side(&self) -> usize {
        self.grid.side()
    }

    pub fn neighbour_depth(&self) -> usize {
        self.neighbour_depth
    }

    pub fn vacancy_policy(&self) -> VacancyPolicy {
        self.vacancy_policy
    }

    pub fn current_iteration(&self) -> u32 {
        self.current_iteration
    }
}

fn check_depth(depth: usize) -> SchellingResult<()> {
    if depth == 0 {
        return Err(invalid("neighbour depth must be a positive integer"));
    }
    Ok(())
}

/// `floor(sqrt(population))`, exact for every `u64`.
fn grid_side(population: u64) -> usize {
    let mut side = (population as f64).sqrt() as u64;
    while side.checked_mul(side).map_or(true, |sq| sq > population) {
        side -= 1;
    }
    while (side + 1).checked_mul(side + 1).is_some_and(|sq| sq <= population) {
        side += 1;
    }
    side as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use schelling_common::{GroupsSpec, ThresholdsSpec};

    fn params(population: u64, groups: GroupsSpec, thresholds: ThresholdsSpec, pct_empty: f64) -> ModelParams {
        ModelParams {
            population,
            groups,
            thresholds,
            pct_empty,
            neighbour_depth: 1,
            seed: Some(42),
            vacancy_policy: VacancyPolicy::Fail,
        }
    }

    fn grid(rows: &[&[u8]]) -> Grid {
        Grid::from_rows(rows.iter().map(|r| r.to_vec()).collect()).unwrap()
    }

    fn thresholds(values: &[f64]) -> ThresholdVector {
        ThresholdVector::from_group_values(values).unwrap()
    }

    #[test]
    fn grid_side_is_floor_sqrt() {
        assert_eq!(grid_side(1), 1);
        assert_eq!(grid_side(10), 3);
        assert_eq!(grid_side(16), 4);
        assert_eq!(grid_side(99), 9);
        assert_eq!(grid_side(10_000), 100);
        assert_eq!(grid_side(u64::MAX), 4_294_967_295);
    }

    #[test]
    fn construction_builds_square_grid_with_valid_labels() {
        let sim = SchellingSimulation::new(params(
            50,
            GroupsSpec::Count(3),
            ThresholdsSpec::Uniform(0.5),
            0.2,
        ))
        .unwrap();
        assert_eq!(sim.side(), 7);
        assert_eq!(sim.grid().len(), 49);
        assert!(sim.grid().cells().iter().all(|&l| l <= 3));
        assert_eq!(sim.group_count(), 3);
        assert_eq!(sim.current_iteration(), 0);
    }

    #[test]
    fn sampled_frequencies_match_distribution() {
        let sim = SchellingSimulation::new(params(
            10_000,
            GroupsSpec::Count(3),
            ThresholdsSpec::Uniform(0.5),
            0.2,
        ))
        .unwrap();
        let counts = sim.grid().label_counts(3);
        let total = sim.grid().len() as f64;
        let expected = [0.2, 0.8 / 3.0, 0.8 / 3.0, 0.8 / 3.0];
        for (label, (&count, &p)) in counts.iter().zip(expected.iter()).enumerate() {
            let observed = count as f64 / total;
            assert!(
                (observed - p).abs() < 0.025,
                "label {label}: observed {observed:.4}, expected {p:.4}"
            );
        }
    }

    #[test]
    fn invalid_groups_fail_construction() {
        let result = SchellingSimulation::new(params(
            100,
            GroupsSpec::Fractions(vec![0.5, 0.6]),
            ThresholdsSpec::Uniform(0.5),
            0.2,
        ));
        assert!(matches!(result, Err(SchellingError::InvalidParameter(_))));
    }

    #[test]
    fn zero_depth_fails_construction() {
        let mut p = params(100, GroupsSpec::Count(2), ThresholdsSpec::Uniform(0.5), 0.2);
        p.neighbour_depth = 0;
        assert!(matches!(
            SchellingSimulation::new(p),
            Err(SchellingError::InvalidParameter(_))
        ));
    }

    #[test]
    fn grid_labels_must_have_thresholds() {
        let result = SchellingSimulation::from_grid(
            grid(&[&[1, 3], &[0, 2]]),
            thresholds(&[0.5, 0.5]),
            1,
            VacancyPolicy::Fail,
            1,
        );
        assert!(matches!(result, Err(SchellingError::InvalidParameter(_))));
    }

    #[test]
    fn same_seed_same_run() {
        let p = params(400, GroupsSpec::Count(2), ThresholdsSpec::Uniform(0.6), 0.2);
        let mut a = SchellingSimulation::new(p.clone()).unwrap();
        let mut b = SchellingSimulation::new(p).unwrap();
        for _ in 0..3 {
            assert_eq!(a.step().unwrap(), b.step().unwrap());
        }
        assert_eq!(a.grid(), b.grid());
        assert_eq!(a.mean_similarity(), b.mean_similarity());
    }

    #[test]
    fn content_agents_leave_grid_unchanged() {
        let start = grid(&[
            &[1, 1, 0, 2],
            &[1, 1, 0, 2],
            &[0, 0, 0, 2],
            &[2, 0, 0, 2],
        ]);
        let mut sim =
            SchellingSimulation::from_grid(start.clone(), thresholds(&[0.5, 0.5]), 1, VacancyPolicy::Fail, 3)
                .unwrap();
        let report = sim.step().unwrap();
        assert_eq!(report.moved, 0);
        assert_eq!(report.evaluated, 9);
        // The agent in the bottom-left corner has no neighbours.
        assert_eq!(report.isolated, 1);
        assert_eq!(sim.grid(), &start);
        assert_eq!(sim.current_iteration(), 1);
    }

    #[test]
    fn vacated_home_is_reused_within_the_step() {
        // Whole-grid window; group 1 (threshold 1) is always unhappy, group 2 (threshold 0) never.
        // The single empty home is taken by the first mover, so the second mover
        // can only go to the home the first one just left.
        let start = grid(&[
            &[1, 2, 2],
            &[2, 2, 2],
            &[2, 1, 0],
        ]);
        let first = start.index(0, 0);
        let second = start.index(2, 1);
        let empty = start.index(2, 2);

        let mut sim =
            SchellingSimulation::from_grid(start, thresholds(&[1.0, 0.0]), 3, VacancyPolicy::Fail, 11)
                .unwrap();
        let report = sim.step().unwrap();
        assert_eq!(report.moved, 2);
        assert_eq!(report.blocked, 0);

        let live = sim.grid();
        assert_eq!(live.get_idx(empty), 1);
        let vacated: Vec<usize> = [first, second]
            .into_iter()
            .filter(|&idx| live.get_idx(idx) == EMPTY)
            .collect();
        assert_eq!(vacated.len(), 1);
        assert_eq!(live.label_counts(2), vec![1, 2, 6]);
    }

    #[test]
    fn full_grid_fails_with_no_vacancy() {
        let start = grid(&[&[1, 2], &[2, 1]]);
        let mut sim =
            SchellingSimulation::from_grid(start, thresholds(&[1.0, 0.0]), 1, VacancyPolicy::Fail, 5)
                .unwrap();
        let err = sim.step().unwrap_err();
        assert!(matches!(err, SchellingError::NoVacancy { row, col } if (row, col) == (0, 0) || (row, col) == (1, 1)));
        assert_eq!(sim.current_iteration(), 0);
    }

    #[test]
    fn full_grid_skips_under_skip_policy() {
        let start = grid(&[&[1, 2], &[2, 1]]);
        let mut sim =
            SchellingSimulation::from_grid(start.clone(), thresholds(&[1.0, 0.0]), 1, VacancyPolicy::Skip, 5)
                .unwrap();
        let report = sim.step().unwrap();
        assert_eq!(report.blocked, 2);
        assert_eq!(report.moved, 0);
        assert_eq!(sim.grid(), &start);
    }

    #[test]
    fn thresholds_are_read_at_every_step() {
        let start = grid(&[
            &[1, 2, 0],
            &[2, 1, 0],
            &[0, 0, 0],
        ]);
        let mut sim =
            SchellingSimulation::from_grid(start.clone(), thresholds(&[0.0, 0.0]), 1, VacancyPolicy::Fail, 8)
                .unwrap();
        assert_eq!(sim.step().unwrap().moved, 0);
        assert_eq!(sim.grid(), &start);

        sim.thresholds_mut().set(1, 1.0).unwrap();
        sim.thresholds_mut().set(2, 1.0).unwrap();
        assert_eq!(sim.step().unwrap().moved, 4);
        assert_eq!(sim.grid().label_counts(2), start.label_counts(2));
    }

    #[test]
    fn diversity_seekers_leave_homogeneous_neighbourhoods() {
        let start = grid(&[
            &[1, 1, 0],
            &[1, 1, 0],
            &[0, 0, 0],
        ]);
        // Raw similarity 1 becomes -1 < -0.5: every agent is unhappy.
        let mut sim =
            SchellingSimulation::from_grid(start, thresholds(&[-0.5]), 1, VacancyPolicy::Fail, 2).unwrap();
        assert_eq!(sim.step().unwrap().moved, 4);
    }

    #[test]
    fn single_group_scenario() {
        // 4x4 grid, one group, 25% empty. Find a seed with exactly four empty homes.
        let mut p = params(16, GroupsSpec::Count(1), ThresholdsSpec::Uniform(0.5), 0.25);
        let (seed, mut sim) = (0u64..)
            .find_map(|seed| {
                p.seed = Some(seed);
                let sim = SchellingSimulation::new(p.clone()).unwrap();
                (sim.grid().label_counts(1) == vec![4, 12]).then_some((seed, sim))
            })
            .unwrap();
        assert_eq!(sim.side(), 4);

        // With one group every occupied neighbour is similar, so nobody moves.
        let before = sim.grid().clone();
        let report = sim.step().unwrap();
        assert_eq!(report.moved, 0);
        assert_eq!(sim.grid(), &before);
        assert_eq!(sim.grid().label_counts(1), vec![4, 12]);
        assert_eq!(sim.mean_similarity(), Ok(1.0));

        p.seed = Some(seed);
        let mut replay = SchellingSimulation::new(p).unwrap();
        replay.step().unwrap();
        assert_eq!(replay.mean_similarity(), sim.mean_similarity());
    }

    #[test]
    fn snapshots_capture_metrics() {
        let mut sim = SchellingSimulation::new(params(
            100,
            GroupsSpec::Fractions(vec![0.4, 0.4]),
            ThresholdsSpec::PerGroup(vec![0.5, -0.3]),
            0.2,
        ))
        .unwrap();
        sim.record_snapshot(0, true);
        let moved = sim.step().unwrap().moved;
        let snapshot = sim.record_snapshot(moved, false).clone();

        assert_eq!(snapshot.iteration, 1);
        assert_eq!(snapshot.moves, moved);
        assert_eq!(snapshot.thresholds, vec![0.5, -0.3]);
        assert_eq!(snapshot.label_counts.iter().sum::<u64>(), 100);
        assert!(snapshot.grid.is_none());

        let first = &sim.recorded_snapshots()[0];
        assert_eq!(first.iteration, 0);
        assert_eq!(first.label_counts, snapshot.label_counts);
        assert_eq!(first.grid.as_ref().map(|g| g.side), Some(10));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn step_preserves_label_counts(
            population in 4u64..400,
            groups in 1u32..5,
            threshold in -1.0f64..=1.0,
            pct_empty in 0.05f64..0.95,
            depth in 1usize..4,
            seed in any::<u64>(),
            skip in any::<bool>(),
        ) {
            let mut p = params(population, GroupsSpec::Count(groups), ThresholdsSpec::Uniform(threshold), pct_empty);
            p.neighbour_depth = depth;
            p.seed = Some(seed);
            p.vacancy_policy = if skip { VacancyPolicy::Skip } else { VacancyPolicy::Fail };
            let mut sim = SchellingSimulation::new(p).unwrap();
            let before = sim.grid().label_counts(groups as usize);

            for _ in 0..3 {
                match sim.step() {
                    Ok(report) => {
                        prop_assert!(report.moved + report.isolated + report.blocked <= report.evaluated);
                    }
                    Err(SchellingError::NoVacancy { .. }) => prop_assert!(!skip),
                    Err(e) => prop_assert!(false, "unexpected error {e}"),
                }
                prop_assert_eq!(sim.grid().label_counts(groups as usize), before.clone());
            }
        }
    }
}
