//! LoopVault Runner: configuration, scenarios, stress batches, exports.
//!
//! This crate builds on `loopvault-core` to provide:
//! - Protocol configuration loaded from TOML
//! - A simulated world (engine plus in-memory token ledger, pool, and vault)
//! - Scenario files and a runner that records per-step outcomes
//! - Seeded synthetic scenarios and rayon-parallel stress batches
//! - Run fingerprints and JSON/CSV report export

pub mod config;
pub mod export;
pub mod fingerprint;
pub mod runner;
pub mod scenario;
pub mod stress;
pub mod synthetic;
pub mod world;

pub use config::{ConfigError, ProtocolConfig};
pub use export::{
    export_json, export_positions_csv, export_steps_csv, export_stress_csv, import_json,
    save_artifacts,
};
pub use fingerprint::RunFingerprint;
pub use runner::{run_scenario, RunError, ScenarioReport, StepOutcome, SCHEMA_VERSION};
pub use scenario::{Action, Actor, Scenario, ScenarioStep};
pub use stress::{run_stress, StressBatch, StressRun, StressSummary};
pub use synthetic::synthetic_scenario;
pub use world::{ConservationCheck, World};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn report_types_are_send_sync() {
        assert_send::<ScenarioReport>();
        assert_sync::<ScenarioReport>();
        assert_send::<StressSummary>();
        assert_sync::<StressSummary>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<ProtocolConfig>();
        assert_sync::<ProtocolConfig>();
        assert_send::<Scenario>();
        assert_sync::<Scenario>();
    }

    #[test]
    fn errors_are_send() {
        assert_send::<RunError>();
        assert_send::<ConfigError>();
    }
}
