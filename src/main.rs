//! mockr CLI - run mock scenarios against an in-memory host
//!
//! Commands:
//!   mockr run <scenario.json>    - Run a scenario and report each step
//!   mockr check <scenario.json>  - Validate a scenario without running it

use clap::{Parser, Subcommand};
use mockr::scenario::{self, Scenario, ScenarioReport};
use mockr::MockConfig;
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mockr")]
#[command(about = "Run command mocking scenarios", long_about = None)]
struct Cli {
    /// Log filter, e.g. `info` or `mockr=debug`
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario and report the outcome of each step
    Run {
        /// Path to the scenario JSON file
        scenario: PathBuf,

        /// Engine configuration JSON file
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Parse a scenario and list its steps
    Check {
        /// Path to the scenario JSON file
        scenario: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match cli.command {
        Commands::Run {
            scenario,
            config,
            json,
        } => run_command(&scenario, config.as_deref(), json),
        Commands::Check { scenario } => check_command(&scenario),
    }
}

fn load_scenario(path: &Path) -> anyhow::Result<Scenario> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    Ok(Scenario::from_json_str(&text)?)
}

fn run_command(path: &Path, config: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let scenario = load_scenario(path)?;
    let config = match config {
        Some(config) => MockConfig::from_path(config)?,
        None => MockConfig::default(),
    };

    let report = scenario::run(&scenario, config)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !report.passed() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_report(report: &ScenarioReport) {
    for step in &report.steps {
        let mark = if step.ok { "ok  " } else { "FAIL" };
        println!("{} [{}] {}", mark, step.index, step.step);
        if let Some(output) = &step.output {
            for value in output {
                println!("       -> {}", value);
            }
        }
        if let Some(detail) = &step.detail {
            for line in detail.lines().filter(|l| !l.trim().is_empty()) {
                println!("       {}", line.trim());
            }
        }
    }

    let failed = report.failures().count();
    println!();
    println!(
        "{} steps, {} passed, {} failed",
        report.steps.len(),
        report.steps.len() - failed,
        failed
    );
}

fn check_command(path: &Path) -> anyhow::Result<()> {
    let scenario = load_scenario(path)?;
    println!(
        "{}: {} commands, {} aliases, {} steps",
        path.display(),
        scenario.commands.len(),
        scenario.aliases.len(),
        scenario.steps.len()
    );
    for (index, step) in scenario.steps.iter().enumerate() {
        println!("  [{}] {}", index, step.label());
    }
    Ok(())
}
