//! Report export: JSON and CSV artifacts.
//!
//! - **JSON**: the full `ScenarioReport`, schema-versioned; unknown versions
//!   are rejected on load
//! - **CSV**: step outcomes, end-of-run positions, and stress summaries for
//!   spreadsheet analysis

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::runner::{PositionSnapshot, ScenarioReport, StepOutcome, SCHEMA_VERSION};
use crate::stress::StressSummary;

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_json(report: &ScenarioReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize ScenarioReport to JSON")
}

/// Deserialize a `ScenarioReport`, rejecting schema versions newer than ours.
pub fn import_json(json: &str) -> Result<ScenarioReport> {
    let report: ScenarioReport =
        serde_json::from_str(json).context("failed to deserialize ScenarioReport from JSON")?;
    if report.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            report.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(report)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Columns: index, action, actor, position, ok, error_kind, expected_error,
/// met_expectation, detail
pub fn export_steps_csv(steps: &[StepOutcome]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "index",
        "action",
        "actor",
        "position",
        "ok",
        "error_kind",
        "expected_error",
        "met_expectation",
        "detail",
    ])?;
    for s in steps {
        wtr.write_record([
            s.index.to_string(),
            s.action.clone(),
            s.actor.clone().unwrap_or_default(),
            s.position.map(|p| p.to_string()).unwrap_or_default(),
            s.ok.to_string(),
            s.error_kind.map(|k| k.to_string()).unwrap_or_default(),
            s.expected_error.map(|k| k.to_string()).unwrap_or_default(),
            s.met_expectation.to_string(),
            s.detail.clone(),
        ])?;
    }
    finish(wtr)
}

/// Columns: id, label, owner, principal, total_principal_value, borrowed,
/// shares, value, interest_earned, opened_at, expires_at
pub fn export_positions_csv(positions: &[PositionSnapshot]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "id",
        "label",
        "owner",
        "principal",
        "total_principal_value",
        "borrowed",
        "shares",
        "value",
        "interest_earned",
        "opened_at",
        "expires_at",
    ])?;
    for p in positions {
        wtr.write_record([
            p.id.to_string(),
            p.label.clone().unwrap_or_default(),
            p.owner.as_ref().map(|o| o.to_string()).unwrap_or_default(),
            p.principal.to_string(),
            p.total_principal_value.to_string(),
            p.borrowed.to_string(),
            p.shares.to_string(),
            p.value.to_string(),
            p.interest_earned.to_string(),
            p.opened_at.to_rfc3339(),
            p.expires_at.to_rfc3339(),
        ])?;
    }
    finish(wtr)
}

/// Columns: seed, run_id, steps, failed_steps, opened, open_positions,
/// conserved, violations
pub fn export_stress_csv(summary: &StressSummary) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "seed",
        "run_id",
        "steps",
        "failed_steps",
        "opened",
        "open_positions",
        "conserved",
        "violations",
    ])?;
    for r in &summary.runs {
        wtr.write_record([
            r.seed.to_string(),
            r.run_id.clone(),
            r.steps.to_string(),
            r.failed_steps.to_string(),
            r.opened.to_string(),
            r.open_positions.to_string(),
            r.conserved.to_string(),
            r.violations.join(";"),
        ])?;
    }
    finish(wtr)
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the artifact set for one scenario run.
///
/// Creates `{scenario}_{run_id prefix}/` under `output_dir` containing:
/// - `report.json`: the full `ScenarioReport`
/// - `steps.csv`: per-step outcomes
/// - `positions.csv`: positions still open at the end
///
/// Returns the path to the created directory.
pub fn save_artifacts(report: &ScenarioReport, output_dir: &Path) -> Result<PathBuf> {
    let dirname = format!(
        "{}_{}",
        sanitize(&report.scenario),
        report.fingerprint.short()
    );
    let run_dir = output_dir.join(dirname);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    std::fs::write(run_dir.join("report.json"), export_json(report)?)?;
    std::fs::write(run_dir.join("steps.csv"), export_steps_csv(&report.steps)?)?;
    std::fs::write(
        run_dir.join("positions.csv"),
        export_positions_csv(&report.positions)?,
    )?;
    Ok(run_dir)
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
