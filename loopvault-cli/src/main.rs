//! LoopVault CLI: quote, simulate, and stress commands.
//!
//! Commands:
//! - `quote`: leverage, collateral cost, and fee for a prospective open
//! - `simulate`: run a scenario file and write JSON + CSV artifacts
//! - `stress`: run a batch of seeded synthetic scenarios and check conservation
//! - `init-config`: write the default protocol config

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use loopvault_core::domain::Amount;
use loopvault_core::policy::LeveragePolicy;
use loopvault_runner::{
    export_stress_csv, run_scenario, run_stress, save_artifacts, ProtocolConfig, Scenario,
    ScenarioReport, StressSummary,
};

#[derive(Parser)]
#[command(
    name = "loopvault",
    about = "LoopVault CLI: leveraged yield position accounting"
)]
struct Cli {
    /// Debug logging (overrides RUST_LOG).
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Quote leverage, collateral cost, and origination fee.
    Quote {
        /// Principal to open with (decimal, e.g. 100 or 12.5).
        #[arg(long)]
        principal: Amount,

        /// Number of borrow → swap → deposit cycles.
        #[arg(long)]
        cycles: u32,

        /// Protocol config TOML. Defaults to the built-in deployment values.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Run a scenario against a simulated world.
    Simulate {
        /// Scenario TOML file.
        #[arg(long)]
        scenario: PathBuf,

        /// Protocol config TOML. Defaults to the built-in deployment values.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output directory for report artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
    /// Run seeded synthetic scenarios and check conservation.
    Stress {
        /// Number of seeds (runs `0..seeds`).
        #[arg(long, default_value_t = 32)]
        seeds: u64,

        /// Steps per scenario.
        #[arg(long, default_value_t = 200)]
        steps: usize,

        /// Protocol config TOML. Defaults to the built-in deployment values.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Run seeds one after another instead of in parallel.
        #[arg(long, default_value_t = false)]
        serial: bool,

        /// Write the per-seed summary as CSV to this file.
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Write the default protocol config.
    InitConfig {
        /// Destination file.
        #[arg(long, default_value = "loopvault.toml")]
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Quote {
            principal,
            cycles,
            config,
        } => run_quote(principal, cycles, config.as_deref()),
        Commands::Simulate {
            scenario,
            config,
            output_dir,
        } => run_simulate(&scenario, config.as_deref(), &output_dir),
        Commands::Stress {
            seeds,
            steps,
            config,
            serial,
            csv,
        } => run_stress_cmd(seeds, steps, config.as_deref(), serial, csv.as_deref()),
        Commands::InitConfig { path, force } => run_init_config(&path, force),
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<ProtocolConfig> {
    match path {
        Some(path) => ProtocolConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(ProtocolConfig::default()),
    }
}

fn run_quote(principal: Amount, cycles: u32, config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let policy = LeveragePolicy::new(config.policy_params(), config.governance())?;
    let quote = policy.quote(principal, cycles)?;

    println!();
    println!("=== Leverage Quote ===");
    println!("Principal:        {}", quote.principal);
    println!("Cycles:           {}", quote.cycles);
    println!("Leverage:         {}", quote.leverage);
    println!("Collateral cost:  {}", quote.collateral_cost);
    println!("Origination fee:  {}", quote.origination_fee);
    if !quote.schedule.is_empty() {
        println!();
        println!("--- Schedule ---");
        for (i, amount) in quote.schedule.iter().enumerate() {
            println!("Cycle {:>2}:         {amount}", i + 1);
        }
    }
    Ok(())
}

fn run_simulate(scenario_path: &Path, config: Option<&Path>, output_dir: &Path) -> Result<()> {
    let config = load_config(config)?;
    let scenario = Scenario::from_file(scenario_path)
        .with_context(|| format!("failed to load scenario {}", scenario_path.display()))?;

    let report = run_scenario(&config, &scenario)?;
    print_report(&report);

    let run_dir = save_artifacts(&report, output_dir)?;
    println!("Artifacts saved to: {}", run_dir.display());

    if !report.conserved() {
        bail!("conservation check failed");
    }
    if !report.expectations_met() {
        bail!("{} step(s) did not meet expectations", report.unmet().count());
    }
    Ok(())
}

fn run_stress_cmd(
    seeds: u64,
    steps: usize,
    config: Option<&Path>,
    serial: bool,
    csv: Option<&Path>,
) -> Result<()> {
    let config = load_config(config)?;
    info!(seeds, steps, parallel = !serial, "starting stress batch");
    let summary = run_stress(&config, seeds, steps, !serial)?;
    print_stress(&summary);

    if let Some(path) = csv {
        std::fs::write(path, export_stress_csv(&summary)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Summary written to: {}", path.display());
    }

    if !summary.all_conserved() {
        bail!(
            "{} run(s) violated conservation",
            summary.violations().count()
        );
    }
    Ok(())
}

fn run_init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let text = ProtocolConfig::default().to_toml()?;
    std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

fn print_report(report: &ScenarioReport) {
    println!();
    println!("=== Scenario Result ===");
    println!("Scenario:       {}", report.scenario);
    println!("Run ID:         {}", report.fingerprint.short());
    println!(
        "Steps:          {} ({} failed)",
        report.steps.len(),
        report.failed_steps()
    );
    println!("Open positions: {}", report.positions.len());
    println!();
    println!("--- Balances ---");
    let b = &report.balances;
    println!("Treasury principal:  {}", b.treasury_principal);
    println!("Treasury collateral: {}", b.treasury_collateral);
    println!("Reserve debt:        {}", b.reserve_debt);
    println!("Outstanding debt:    {}", b.total_borrowed);
    println!("Vault assets:        {}", b.vault_assets);
    println!("Rebase fees:         {} ({} settlements)", b.rebase_fees_collected, b.settlements);

    let unmet: Vec<_> = report.unmet().collect();
    if !unmet.is_empty() {
        println!();
        for step in unmet {
            println!(
                "UNMET step {} ({}): expected {}, got {}",
                step.index,
                step.action,
                step.expected_error.map_or("success".to_string(), |k| k.to_string()),
                step.error_kind.map_or("success".to_string(), |k| k.to_string()),
            );
        }
    }
    for check in report.conservation.iter().filter(|c| !c.passed) {
        println!(
            "WARNING: {} expected {}, found {}",
            check.name, check.expected, check.actual
        );
    }
}

fn print_stress(summary: &StressSummary) {
    println!();
    println!("=== Stress Result ===");
    println!("Runs:           {}", summary.runs.len());
    println!("Steps:          {}", summary.total_steps());
    let opened: usize = summary.runs.iter().map(|r| r.opened).sum();
    let failed: usize = summary.runs.iter().map(|r| r.failed_steps).sum();
    println!("Opens:          {opened}");
    println!("Failed steps:   {failed}");
    for run in summary.violations() {
        println!(
            "WARNING: seed {} violated {}",
            run.seed,
            run.violations.join(", ")
        );
    }
}
