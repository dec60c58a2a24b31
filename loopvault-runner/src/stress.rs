//! Stress batches: many synthetic scenarios, optionally in parallel.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ProtocolConfig;
use crate::runner::{run_scenario, RunError, ScenarioReport};
use crate::synthetic::synthetic_scenario;

/// Summary of one synthetic run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StressRun {
    pub seed: u64,
    pub run_id: String,
    pub steps: usize,
    pub failed_steps: usize,
    pub open_positions: usize,
    pub opened: usize,
    pub conserved: bool,
    /// Names of the checks that failed, if any.
    pub violations: Vec<String>,
}

impl StressRun {
    fn from_report(seed: u64, report: &ScenarioReport) -> Self {
        Self {
            seed,
            run_id: report.fingerprint.run_id.clone(),
            steps: report.steps.len(),
            failed_steps: report.failed_steps(),
            open_positions: report.positions.len(),
            opened: report
                .steps
                .iter()
                .filter(|s| s.ok && s.action == "open")
                .count(),
            conserved: report.conserved(),
            violations: report
                .conservation
                .iter()
                .filter(|c| !c.passed)
                .map(|c| c.name.clone())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressSummary {
    pub runs: Vec<StressRun>,
}

impl StressSummary {
    pub fn all_conserved(&self) -> bool {
        self.runs.iter().all(|r| r.conserved)
    }

    pub fn violations(&self) -> impl Iterator<Item = &StressRun> {
        self.runs.iter().filter(|r| !r.conserved)
    }

    pub fn total_steps(&self) -> usize {
        self.runs.iter().map(|r| r.steps).sum()
    }
}

/// Stress batch executor.
pub struct StressBatch {
    config: ProtocolConfig,
    steps: usize,
    parallel: bool,
}

impl StressBatch {
    pub fn new(config: ProtocolConfig) -> Self {
        Self {
            config,
            steps: 100,
            parallel: true,
        }
    }

    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self
    }

    /// Enables or disables parallel execution.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// One synthetic run per seed. Results are in seed order either way.
    pub fn run(&self, seeds: &[u64]) -> Result<StressSummary, RunError> {
        self.config.validate()?;
        let runs: Vec<StressRun> = if self.parallel {
            seeds
                .par_iter()
                .map(|&seed| self.run_seed(seed))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            seeds
                .iter()
                .map(|&seed| self.run_seed(seed))
                .collect::<Result<Vec<_>, _>>()?
        };

        let summary = StressSummary { runs };
        if summary.all_conserved() {
            info!(
                runs = summary.runs.len(),
                steps = summary.total_steps(),
                "stress batch conserved"
            );
        } else {
            warn!(
                violations = summary.violations().count(),
                "stress batch found conservation violations"
            );
        }
        Ok(summary)
    }

    fn run_seed(&self, seed: u64) -> Result<StressRun, RunError> {
        let scenario = synthetic_scenario(
            seed,
            self.steps,
            self.config.policy.max_cycles,
            &self.config.accounts.liquidator,
        );
        let report = run_scenario(&self.config, &scenario)?;
        Ok(StressRun::from_report(seed, &report))
    }
}

/// Run seeds `0..seeds`, each for `steps` steps.
pub fn run_stress(
    config: &ProtocolConfig,
    seeds: u64,
    steps: usize,
    parallel: bool,
) -> Result<StressSummary, RunError> {
    let seeds: Vec<u64> = (0..seeds).collect();
    StressBatch::new(config.clone())
        .with_steps(steps)
        .with_parallelism(parallel)
        .run(&seeds)
}
