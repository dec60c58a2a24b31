//! Scenario runner: executes a scenario against a fresh simulated world.
//!
//! Every step is recorded with its outcome and whether it met the scenario's
//! expectation. A failing request is an outcome, not a runner error: the
//! runner only fails when the world itself cannot be built or inspected.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use loopvault_core::collab::{ClockError, ExternalError, YieldVault};
use loopvault_core::domain::{AccountId, Amount, Asset, PositionId};
use loopvault_core::engine::{EngineError, Redeem, RequestAudit};
use loopvault_core::ErrorKind;

use crate::config::{ConfigError, ProtocolConfig};
use crate::fingerprint::RunFingerprint;
use crate::scenario::{Action, Scenario};
use crate::world::{ConservationCheck, World};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("fingerprint failed: {0}")]
    Fingerprint(#[from] serde_json::Error),
    #[error("failed to fund actor '{actor}': {source}")]
    Funding {
        actor: String,
        #[source]
        source: ExternalError,
    },
    #[error("failed to inspect world: {0}")]
    Inspect(String),
}

/// Current schema version for persisted reports.
pub const SCHEMA_VERSION: u32 = 1;

/// What happened at one scenario step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub index: usize,
    pub action: String,
    pub actor: Option<String>,
    pub position: Option<PositionId>,
    pub ok: bool,
    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
    pub expected_error: Option<ErrorKind>,
    pub met_expectation: bool,
    pub detail: String,
}

/// A live position at the end of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub id: PositionId,
    pub label: Option<String>,
    pub owner: Option<AccountId>,
    pub principal: Amount,
    pub total_principal_value: Amount,
    pub borrowed: Amount,
    pub shares: Amount,
    pub value: Amount,
    pub interest_earned: Amount,
    pub opened_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSummary {
    pub treasury_principal: Amount,
    pub treasury_collateral: Amount,
    pub reserve_debt: Amount,
    pub total_borrowed: Amount,
    pub vault_assets: Amount,
    pub vault_shares: Amount,
    pub watermark: Amount,
    pub rebase_fees_collected: Amount,
    pub settlements: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub scenario: String,
    pub fingerprint: RunFingerprint,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<StepOutcome>,
    pub positions: Vec<PositionSnapshot>,
    pub balances: BalanceSummary,
    pub conservation: Vec<ConservationCheck>,
    pub audit: Vec<RequestAudit>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl ScenarioReport {
    pub fn expectations_met(&self) -> bool {
        self.steps.iter().all(|s| s.met_expectation)
    }

    pub fn conserved(&self) -> bool {
        self.conservation.iter().all(|c| c.passed)
    }

    pub fn unmet(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(|s| !s.met_expectation)
    }

    pub fn failed_steps(&self) -> usize {
        self.steps.iter().filter(|s| !s.ok).count()
    }
}

/// A request failure as recorded in the report.
#[derive(Debug)]
struct StepFailure {
    kind: ErrorKind,
    message: String,
}

impl StepFailure {
    fn new(kind: ErrorKind, message: impl fmt::Display) -> Self {
        Self {
            kind,
            message: message.to_string(),
        }
    }
}

impl From<EngineError> for StepFailure {
    fn from(e: EngineError) -> Self {
        Self::new(e.kind(), e)
    }
}

impl From<ClockError> for StepFailure {
    fn from(e: ClockError) -> Self {
        Self::new(ErrorKind::InvalidAmount, e)
    }
}

impl From<ExternalError> for StepFailure {
    fn from(e: ExternalError) -> Self {
        Self::new(ErrorKind::ExternalCallFailed, e)
    }
}

struct Executed {
    position: Option<PositionId>,
    detail: String,
}

/// Run `scenario` against a world built from `config`.
pub fn run_scenario(config: &ProtocolConfig, scenario: &Scenario) -> Result<ScenarioReport, RunError> {
    let fingerprint = RunFingerprint::of(config, scenario)?;
    let started_at = scenario.start_time();
    let mut world = World::new(config, started_at)?;

    for actor in &scenario.actors {
        let account = AccountId::new(&actor.name);
        let grants = [
            (Asset::Principal, actor.principal),
            (Asset::Collateral, actor.collateral),
            (Asset::Debt, actor.debt),
        ];
        for (asset, amount) in grants {
            world
                .fund(&account, asset, amount)
                .map_err(|source| RunError::Funding {
                    actor: actor.name.clone(),
                    source,
                })?;
        }
    }

    info!(
        scenario = %scenario.name,
        run_id = fingerprint.short(),
        steps = scenario.steps.len(),
        "scenario started"
    );

    let mut labels: HashMap<String, PositionId> = HashMap::new();
    let mut steps = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.iter().enumerate() {
        let result = execute(&mut world, &mut labels, &step.action);
        let met_expectation = match (&result, step.expect_error) {
            (Ok(_), None) => true,
            (Err(failure), Some(kind)) => failure.kind == kind,
            _ => false,
        };
        let outcome = match result {
            Ok(done) => StepOutcome {
                index,
                action: step.action.name().into(),
                actor: step.action.actor().map(String::from),
                position: done.position,
                ok: true,
                error_kind: None,
                error: None,
                expected_error: step.expect_error,
                met_expectation,
                detail: done.detail,
            },
            Err(failure) => StepOutcome {
                index,
                action: step.action.name().into(),
                actor: step.action.actor().map(String::from),
                position: step.action.position().and_then(|l| labels.get(l).copied()),
                ok: false,
                error_kind: Some(failure.kind),
                error: Some(failure.message.clone()),
                expected_error: step.expect_error,
                met_expectation,
                detail: failure.message,
            },
        };
        if met_expectation {
            debug!(index, action = %outcome.action, ok = outcome.ok, "step done");
        } else {
            warn!(
                index,
                action = %outcome.action,
                expected = ?outcome.expected_error,
                got = ?outcome.error_kind,
                "step did not meet expectation"
            );
        }
        steps.push(outcome);
    }

    let positions = snapshot_positions(&world, &labels)?;
    let balances = summarize(&world)?;
    let conservation = world
        .conservation()
        .map_err(|e| RunError::Inspect(e.to_string()))?;

    let report = ScenarioReport {
        schema_version: SCHEMA_VERSION,
        scenario: scenario.name.clone(),
        fingerprint,
        started_at,
        finished_at: world.engine.now(),
        steps,
        positions,
        balances,
        conservation,
        audit: world.engine.take_audit_trail(),
    };

    if report.conserved() {
        info!(
            scenario = %report.scenario,
            failed = report.failed_steps(),
            open_positions = report.positions.len(),
            "scenario finished"
        );
    } else {
        warn!(scenario = %report.scenario, "conservation check failed");
    }
    Ok(report)
}

fn resolve(labels: &HashMap<String, PositionId>, label: &str) -> Result<PositionId, StepFailure> {
    labels
        .get(label)
        .copied()
        .ok_or_else(|| StepFailure::new(ErrorKind::NotFound, format!("no position labelled '{label}'")))
}

fn execute(
    world: &mut World,
    labels: &mut HashMap<String, PositionId>,
    action: &Action,
) -> Result<Executed, StepFailure> {
    let done = |position: Option<PositionId>, detail: String| Executed { position, detail };
    match action {
        Action::Open {
            actor,
            principal,
            cycles,
            collateral,
            label,
        } => {
            let receipt = world
                .engine
                .open(&AccountId::new(actor), *principal, *cycles, *collateral)?;
            if let Some(label) = label {
                labels.insert(label.clone(), receipt.position_id);
            }
            Ok(done(
                Some(receipt.position_id),
                format!(
                    "borrowed {} over {} cycles, fee {}, collateral {}",
                    receipt.borrowed, receipt.cycles, receipt.origination_fee, receipt.collateral_paid
                ),
            ))
        }
        Action::Close { actor, position } => {
            let id = resolve(labels, position)?;
            let receipt = world.engine.close(&AccountId::new(actor), id, Redeem::All)?;
            Ok(done(
                Some(id),
                format!(
                    "repaid {}, paid out {} principal and {} debt",
                    receipt.debt_repaid, receipt.payout, receipt.debt_refund
                ),
            ))
        }
        Action::Withdraw {
            actor,
            position,
            shares,
        } => {
            let id = resolve(labels, position)?;
            let receipt = world.engine.withdraw(&AccountId::new(actor), id, *shares)?;
            Ok(done(
                Some(id),
                format!(
                    "redeemed {} shares, repaid {}, paid out {}",
                    receipt.shares_redeemed, receipt.debt_repaid, receipt.payout
                ),
            ))
        }
        Action::Deposit {
            actor,
            position,
            amount,
        } => {
            let id = resolve(labels, position)?;
            let receipt = world
                .engine
                .deposit_to_position(&AccountId::new(actor), id, *amount)?;
            Ok(done(
                Some(id),
                format!("deposited {} for {} shares", receipt.amount, receipt.shares),
            ))
        }
        Action::Transfer {
            actor,
            position,
            to,
        } => {
            let id = resolve(labels, position)?;
            world
                .engine
                .transfer_position(&AccountId::new(actor), id, &AccountId::new(to))?;
            Ok(done(Some(id), format!("now owned by {to}")))
        }
        Action::Rebase { gain } => {
            world.accrue(*gain)?;
            Ok(done(None, format!("vault gained {gain}")))
        }
        Action::Loss { amount } => {
            let lost = world.write_down(*amount)?;
            Ok(done(None, format!("vault lost {lost}")))
        }
        Action::Settle => {
            let outcome = world.engine.settle_rebase()?;
            Ok(done(
                None,
                format!("gain {}, fee {}", outcome.gain, outcome.fee),
            ))
        }
        Action::AdvanceDays { days } => {
            let now = world.advance_days(*days)?;
            Ok(done(None, format!("now {}", now.to_rfc3339())))
        }
    }
}

fn snapshot_positions(
    world: &World,
    labels: &HashMap<String, PositionId>,
) -> Result<Vec<PositionSnapshot>, RunError> {
    let engine = &world.engine;
    let inspect = |e: EngineError| RunError::Inspect(e.to_string());
    let mut snapshots = Vec::with_capacity(engine.ledger().len());
    for (id, record) in engine.ledger().iter() {
        let label = labels
            .iter()
            .filter(|(_, v)| **v == id)
            .map(|(k, _)| k.clone())
            .min();
        snapshots.push(PositionSnapshot {
            id,
            label,
            owner: engine.owner_of(id).cloned(),
            principal: record.principal,
            total_principal_value: record.total_principal_value,
            borrowed: record.borrowed,
            shares: record.yield_shares,
            value: engine.get_total(id).map_err(inspect)?,
            interest_earned: engine.get_interest_earned(id).map_err(inspect)?,
            opened_at: record.opened_at,
            expires_at: record.expires_at(),
        });
    }
    Ok(snapshots)
}

fn summarize(world: &World) -> Result<BalanceSummary, RunError> {
    let engine = &world.engine;
    let accounts = &engine.config().accounts;
    let vault = &engine.collaborators().vault;
    Ok(BalanceSummary {
        treasury_principal: world.balance(Asset::Principal, &accounts.treasury),
        treasury_collateral: world.balance(Asset::Collateral, &accounts.treasury),
        reserve_debt: world.balance(Asset::Debt, &accounts.reserve),
        total_borrowed: engine
            .ledger()
            .total_borrowed()
            .map_err(|e| RunError::Inspect(e.to_string()))?,
        vault_assets: vault.total_assets(),
        vault_shares: vault.total_shares(),
        watermark: engine.settlement().watermark(),
        rebase_fees_collected: engine.settlement().total_collected(),
        settlements: engine.settlement().settlements(),
    })
}
