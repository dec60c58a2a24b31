//! Integration tests for the scenario runner.
//!
//! 1. Authored scenarios: expectations, liquidation, settlement.
//! 2. Stress batches: conservation, determinism, serial == parallel.
//! 3. Export: JSON round trip, schema rejection, CSV tables, artifacts.

use loopvault_core::domain::Amount;
use loopvault_core::ErrorKind;
use loopvault_runner::{
    export_json, export_positions_csv, export_steps_csv, import_json, run_scenario, run_stress,
    save_artifacts, synthetic_scenario, Action, Actor, ProtocolConfig, Scenario, ScenarioStep,
    StressBatch, SCHEMA_VERSION,
};
use proptest::prelude::*;

fn units(n: u64) -> Amount {
    Amount::from_units(n)
}

fn open(actor: &str, label: &str, cycles: u32, collateral: u64) -> Action {
    Action::Open {
        actor: actor.into(),
        principal: units(100),
        cycles,
        collateral: units(collateral),
        label: Some(label.into()),
    }
}

fn close(actor: &str, label: &str) -> Action {
    Action::Close {
        actor: actor.into(),
        position: label.into(),
    }
}

fn funded(name: &str) -> Actor {
    Actor::new(name)
        .with_principal(units(1_000))
        .with_collateral(units(1_000))
}

/// Open, rebuffed closes, a rebase, a partial withdrawal, then liquidation.
fn lifecycle() -> Scenario {
    Scenario::new("lifecycle")
        .with_actor(funded("alice"))
        .with_actor(funded("bob"))
        .with_step(ScenarioStep::new(open("alice", "a", 2, 171)))
        .with_step(ScenarioStep::expecting(close("bob", "a"), ErrorKind::Unauthorized))
        .with_step(ScenarioStep::expecting(
            close("liquidator", "a"),
            ErrorKind::NotExpired,
        ))
        .with_step(ScenarioStep::new(Action::Rebase { gain: units(10) }))
        .with_step(ScenarioStep::new(Action::Settle))
        .with_step(ScenarioStep::new(Action::Withdraw {
            actor: "alice".into(),
            position: "a".into(),
            shares: units(50),
        }))
        .with_step(ScenarioStep::new(Action::AdvanceDays { days: 370 }))
        .with_step(ScenarioStep::new(close("liquidator", "a")))
}

// ──────────────────────────────────────────────
// Authored scenarios
// ──────────────────────────────────────────────

#[test]
fn lifecycle_meets_every_expectation() {
    let report = run_scenario(&ProtocolConfig::default(), &lifecycle()).unwrap();

    let unmet: Vec<_> = report.unmet().collect();
    assert!(unmet.is_empty(), "unmet: {unmet:?}");
    assert!(report.conserved(), "{:?}", report.conservation);
    assert_eq!(report.schema_version, SCHEMA_VERSION);
    assert_eq!(report.failed_steps(), 2);

    assert!(report.positions.is_empty());
    assert_eq!(report.balances.treasury_collateral, units(171));
    assert_eq!(report.balances.rebase_fees_collected, units(1));
    assert_eq!(report.balances.total_borrowed, Amount::ZERO);
    assert_eq!(report.balances.reserve_debt, units(1_000_000));
}

#[test]
fn open_step_records_position_and_audit() {
    let scenario = Scenario::new("open")
        .with_actor(funded("alice"))
        .with_step(ScenarioStep::new(open("alice", "a", 2, 171)));
    let report = run_scenario(&ProtocolConfig::default(), &scenario).unwrap();

    assert!(report.expectations_met());
    assert_eq!(report.positions.len(), 1);
    let position = &report.positions[0];
    assert_eq!(position.label.as_deref(), Some("a"));
    assert_eq!(position.borrowed, units(171));
    assert_eq!(position.principal, units(100));
    assert_eq!(report.steps[0].position, Some(position.id));
    assert!(!report.audit.is_empty());
}

#[test]
fn mismatched_expectations_are_reported() {
    let scenario = Scenario::new("mismatch")
        .with_actor(funded("alice"))
        // Succeeds, but the scenario says it should fail.
        .with_step(ScenarioStep::expecting(
            open("alice", "a", 1, 1_000),
            ErrorKind::InsufficientCollateral,
        ))
        // Fails, but the scenario expects success.
        .with_step(ScenarioStep::new(open("alice", "b", 2, 1)));
    let report = run_scenario(&ProtocolConfig::default(), &scenario).unwrap();

    assert!(!report.expectations_met());
    assert_eq!(report.unmet().count(), 2);
    assert_eq!(
        report.steps[1].error_kind,
        Some(ErrorKind::InsufficientCollateral)
    );
    assert!(report.conserved());
}

#[test]
fn rejected_requests_leave_the_world_conserved() {
    let scenario = Scenario::new("rejections")
        .with_actor(funded("alice"))
        .with_step(ScenarioStep::expecting(
            open("alice", "over", 11, 1_000),
            ErrorKind::CycleLimitExceeded,
        ))
        .with_step(ScenarioStep::expecting(
            open("alice", "poor", 2, 10),
            ErrorKind::InsufficientCollateral,
        ))
        .with_step(ScenarioStep::expecting(
            close("alice", "never-opened"),
            ErrorKind::NotFound,
        ));
    let report = run_scenario(&ProtocolConfig::default(), &scenario).unwrap();

    assert!(report.expectations_met(), "{:?}", report.steps);
    assert!(report.conserved());
    assert!(report.positions.is_empty());
    assert_eq!(report.balances.treasury_collateral, Amount::ZERO);
}

#[test]
fn transfer_moves_close_rights() {
    let scenario = Scenario::new("transfer")
        .with_actor(funded("alice"))
        .with_step(ScenarioStep::new(open("alice", "a", 1, 1_000)))
        .with_step(ScenarioStep::new(Action::Transfer {
            actor: "alice".into(),
            position: "a".into(),
            to: "bob".into(),
        }))
        .with_step(ScenarioStep::expecting(close("alice", "a"), ErrorKind::Unauthorized))
        .with_step(ScenarioStep::new(close("bob", "a")));
    let report = run_scenario(&ProtocolConfig::default(), &scenario).unwrap();
    assert!(report.expectations_met(), "{:?}", report.steps);
    assert!(report.conserved());
}

#[test]
fn loss_is_not_charged_as_yield() {
    let scenario = Scenario::new("loss")
        .with_actor(funded("alice"))
        .with_step(ScenarioStep::new(open("alice", "a", 1, 1_000)))
        .with_step(ScenarioStep::new(Action::Loss { amount: units(5) }))
        .with_step(ScenarioStep::new(Action::Rebase { gain: units(5) }))
        .with_step(ScenarioStep::new(Action::Settle));
    let report = run_scenario(&ProtocolConfig::default(), &scenario).unwrap();
    assert!(report.expectations_met());
    assert!(report.conserved(), "{:?}", report.conservation);
    assert_eq!(report.balances.rebase_fees_collected, Amount::ZERO);
}

#[test]
fn out_of_range_clock_steps_fail_without_moving_time() {
    let huge = 100_000_000_000;
    let scenario = Scenario::new("far-future")
        .with_step(ScenarioStep::expecting(
            Action::AdvanceDays { days: i64::MAX / 1000 },
            ErrorKind::InvalidAmount,
        ))
        .with_step(ScenarioStep::expecting(
            Action::AdvanceDays { days: huge },
            ErrorKind::InvalidAmount,
        ))
        .with_step(ScenarioStep::expecting(
            Action::AdvanceDays { days: huge },
            ErrorKind::InvalidAmount,
        ))
        .with_step(ScenarioStep::new(Action::AdvanceDays { days: 1 }));
    let report = run_scenario(&ProtocolConfig::default(), &scenario).unwrap();
    assert!(report.expectations_met(), "{:?}", report.steps);
    assert_eq!(report.finished_at, report.started_at + chrono::Duration::days(1));
}

#[test]
fn scenario_file_runs() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../demos/lifecycle.toml");
    let scenario = Scenario::from_file(&path).unwrap();
    let report = run_scenario(&ProtocolConfig::default(), &scenario).unwrap();
    assert!(report.expectations_met(), "{:?}", report.unmet().collect::<Vec<_>>());
    assert!(report.conserved());
}

#[test]
fn demo_config_is_the_default() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../demos/protocol.toml");
    assert_eq!(ProtocolConfig::from_file(&path).unwrap(), ProtocolConfig::default());
}

#[test]
fn same_inputs_same_report() {
    let config = ProtocolConfig::default();
    let a = run_scenario(&config, &lifecycle()).unwrap();
    let b = run_scenario(&config, &lifecycle()).unwrap();
    assert_eq!(a.fingerprint, b.fingerprint);
    assert_eq!(a.steps, b.steps);
    assert_eq!(a.balances, b.balances);
}

// ──────────────────────────────────────────────
// Stress
// ──────────────────────────────────────────────

#[test]
fn stress_batch_is_conserved() {
    let summary = run_stress(&ProtocolConfig::default(), 8, 150, true).unwrap();
    assert_eq!(summary.runs.len(), 8);
    let broken: Vec<_> = summary.violations().collect();
    assert!(broken.is_empty(), "{broken:?}");
    assert!(summary.runs.iter().any(|r| r.opened > 0));
    assert!(summary.runs.iter().any(|r| r.failed_steps > 0));
}

#[test]
fn serial_and_parallel_agree() {
    let seeds = [11, 12, 13, 14];
    let batch = || StressBatch::new(ProtocolConfig::default()).with_steps(80);
    let parallel = batch().with_parallelism(true).run(&seeds).unwrap();
    let serial = batch().with_parallelism(false).run(&seeds).unwrap();
    assert_eq!(parallel.runs, serial.runs);
}

#[test]
fn stress_respects_tighter_policy() {
    let mut config = ProtocolConfig::default();
    config.policy.max_cycles = 3;
    config.policy.origination_fee_bps = 0;
    let summary = run_stress(&config, 4, 100, false).unwrap();
    assert!(summary.all_conserved());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Whatever the seed, every request either applies fully or not at all.
    #[test]
    fn any_seed_is_conserved(seed in any::<u64>()) {
        let scenario = synthetic_scenario(seed, 60, 10, "liquidator");
        let report = run_scenario(&ProtocolConfig::default(), &scenario).unwrap();
        prop_assert!(report.conserved(), "{:?}", report.conservation);
    }
}

// ──────────────────────────────────────────────
// Export
// ──────────────────────────────────────────────

#[test]
fn json_round_trip() {
    let report = run_scenario(&ProtocolConfig::default(), &lifecycle()).unwrap();
    let json = export_json(&report).unwrap();
    let back = import_json(&json).unwrap();
    assert_eq!(back.fingerprint, report.fingerprint);
    assert_eq!(back.steps, report.steps);
    assert_eq!(back.balances, report.balances);
}

#[test]
fn newer_schema_is_rejected() {
    let report = run_scenario(&ProtocolConfig::default(), &lifecycle()).unwrap();
    let mut value: serde_json::Value = serde_json::from_str(&export_json(&report).unwrap()).unwrap();
    value["schema_version"] = serde_json::json!(SCHEMA_VERSION + 1);
    let err = import_json(&value.to_string()).unwrap_err();
    assert!(err.to_string().contains("unsupported schema version"));
}

#[test]
fn csv_tables_have_one_row_per_item() {
    let report = run_scenario(&ProtocolConfig::default(), &lifecycle()).unwrap();

    let steps = export_steps_csv(&report.steps).unwrap();
    let mut lines = steps.lines();
    assert!(lines.next().unwrap().starts_with("index,action,actor,position,ok"));
    assert_eq!(lines.count(), report.steps.len());
    assert!(steps.contains("unauthorized"));

    let scenario = Scenario::new("open")
        .with_actor(funded("alice"))
        .with_step(ScenarioStep::new(open("alice", "a", 2, 171)));
    let open_report = run_scenario(&ProtocolConfig::default(), &scenario).unwrap();
    let positions = export_positions_csv(&open_report.positions).unwrap();
    assert_eq!(positions.lines().count(), 2);
    assert!(positions.contains(",a,alice,100,"));
}

#[test]
fn artifacts_are_written() {
    let dir = tempfile::tempdir().unwrap();
    let report = run_scenario(&ProtocolConfig::default(), &lifecycle()).unwrap();
    let run_dir = save_artifacts(&report, dir.path()).unwrap();

    assert!(run_dir
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("lifecycle_"));
    for file in ["report.json", "steps.csv", "positions.csv"] {
        assert!(run_dir.join(file).exists(), "missing {file}");
    }
    let json = std::fs::read_to_string(run_dir.join("report.json")).unwrap();
    assert_eq!(import_json(&json).unwrap().scenario, "lifecycle");
}
