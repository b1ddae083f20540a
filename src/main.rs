//! `mba-check` CLI entry point.
//!
//! Provides `policies`, `refstate`, and `verify` subcommands for listing the
//! built-in policies, checking a reference-state document, and verifying a
//! parsed measured-boot log.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;

use mba_policy::config::{default_config_path, load_config, load_config_or_default, Config};
use mba_policy::event::{retain_pcrs, EventLog};
use mba_policy::logging;
use mba_policy::policy::PolicyRegistry;
use mba_policy::report::VerificationReport;

/// mba-check: verify measured-boot logs against reference policies.
#[derive(Parser)]
#[command(name = "mba-check", version, about)]
struct Cli {
    /// Config file (default: ~/.mba-check/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// List registered policies and the PCRs each inspects.
    Policies,
    /// Check that a reference-state document compiles under a policy.
    Refstate {
        /// Reference-state JSON file.
        file: PathBuf,
        /// Policy name (default from config).
        #[arg(long)]
        policy: Option<String>,
    },
    /// Verify a parsed event log against a reference state.
    Verify {
        /// Reference-state JSON file.
        #[arg(long)]
        refstate: PathBuf,
        /// Event log JSON file (`{"events": [...]}`).
        #[arg(long)]
        log: PathBuf,
        /// Policy name (default from config).
        #[arg(long)]
        policy: Option<String>,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => match default_config_path() {
            Ok(path) => load_config_or_default(&path)?,
            Err(_) => Config::default(),
        },
    };

    let _logging_guard = match &config.logging.dir {
        Some(dir) => Some(logging::init_with_file(dir, &config.logging.level)?),
        None => {
            logging::init_cli(&config.logging.level);
            None
        }
    };

    let registry = PolicyRegistry::builtin().context("failed to register built-in policies")?;

    match cli.command {
        Command::Policies => handle_policies(&registry),
        Command::Refstate { file, policy } => {
            let name = policy.unwrap_or_else(|| config.policy.name.clone());
            handle_refstate(&registry, &name, &file)
        }
        Command::Verify {
            refstate,
            log,
            policy,
            json,
        } => {
            let name = policy.unwrap_or_else(|| config.policy.name.clone());
            handle_verify(&registry, &config, &name, &refstate, &log, json)
        }
    }
}

/// Print every registered policy.
fn handle_policies(registry: &PolicyRegistry) -> anyhow::Result<()> {
    for name in registry.names() {
        let policy = registry.get(name)?;
        let pcrs: Vec<String> = policy
            .relevant_pcrs()
            .iter()
            .map(ToString::to_string)
            .collect();
        println!("{name}\tpcrs={}", pcrs.join(","));
    }
    Ok(())
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
}

/// Compile a reference state without validating any log.
fn handle_refstate(registry: &PolicyRegistry, name: &str, file: &Path) -> anyhow::Result<()> {
    let refstate = read_json(file)?;
    let policy = registry.get(name)?;
    policy
        .compile(&refstate)
        .with_context(|| format!("{} rejected by policy {name}", file.display()))?;
    println!("{}: accepted by policy {name}", file.display());
    Ok(())
}

/// Verify an event log and print the report.
fn handle_verify(
    registry: &PolicyRegistry,
    config: &Config,
    name: &str,
    refstate_path: &Path,
    log_path: &Path,
    json: bool,
) -> anyhow::Result<()> {
    let refstate = read_json(refstate_path)?;
    let mut log: EventLog = serde_json::from_value(read_json(log_path)?)
        .with_context(|| format!("{} is not an event log", log_path.display()))?;

    if config.policy.only_relevant_pcrs {
        let policy = registry.get(name)?;
        let before = log.events.len();
        retain_pcrs(&mut log, policy.relevant_pcrs());
        info!(
            dropped = before.saturating_sub(log.events.len()),
            "events outside relevant PCRs dropped"
        );
    }

    let log_value = log.to_value().context("failed to convert event log")?;
    let outcome = registry.verify(name, &refstate, &log_value);
    let report = VerificationReport::new(name, log.events.len(), &outcome);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if let Some(failure) = &report.failure {
        println!("FAIL [{:?}] {}", failure.kind, failure.message);
    } else {
        println!("PASS policy={name} events={}", report.events);
    }

    outcome.map_err(|e| anyhow::anyhow!("verification failed: {e}"))
}
