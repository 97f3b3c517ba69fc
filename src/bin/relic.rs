// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use relic::{
    archive::ArchiveBuilder,
    config::ReleaseConfig,
    path::default_config_path,
    release::{
        operator::{InquireOperator, Operator, ScriptedOperator},
        recover_state, ReleaseOrchestrator, ReleaseReport,
    },
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::{fs::write, path::PathBuf, process::exit};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "relic [options] <relic-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to release configuration file.
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let config_path = match self.config {
            Some(path) => path,
            None => default_config_path()?,
        };

        match self.command {
            Command::Init(opts) => run_init(config_path, opts),
            Command::Release(opts) => run_release(config_path, opts),
            Command::Status => run_status(config_path),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Write default release configuration.
    #[command(override_usage = "relic init [options]")]
    Init(InitOptions),

    /// Archive project and record new release.
    #[command(override_usage = "relic release [options]")]
    Release(ReleaseOptions),

    /// Show last recorded release of every tier.
    #[command(override_usage = "relic status [options]")]
    Status,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InitOptions {
    /// Name of project to release.
    #[arg(short, long, value_name = "name")]
    pub name: Option<String>,

    /// Overwrite existing configuration.
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ReleaseOptions {
    /// Run without prompts, accepting answers from flags.
    #[arg(short, long)]
    pub yes: bool,

    /// Version to release instead of the suggested one.
    #[arg(long = "set-version", requires = "yes", value_name = "X.Y.Z")]
    pub version: Option<String>,

    /// Release note.
    #[arg(short, long, requires = "yes", value_name = "text")]
    pub note: Option<String>,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn run_init(config_path: PathBuf, opts: InitOptions) -> Result<()> {
    if config_path.exists() && !opts.force {
        bail!(
            "configuration already exists at {:?}, use --force to overwrite",
            config_path.display()
        );
    }

    let mut config = ReleaseConfig::default();
    if let Some(name) = opts.name {
        config.project.name = name;
    }

    // INVARIANT: Written configuration must load back.
    let contents = config.to_string();
    contents.parse::<ReleaseConfig>()?;

    if let Some(parent) = config_path.parent() {
        mkdirp::mkdirp(parent)
            .with_context(|| format!("failed to create {:?}", parent.display()))?;
    }
    write(&config_path, contents)
        .with_context(|| format!("failed to write {:?}", config_path.display()))?;
    info!("wrote configuration to {:?}", config_path.display());

    Ok(())
}

fn run_release(config_path: PathBuf, opts: ReleaseOptions) -> Result<()> {
    let config = ReleaseConfig::load(&config_path)?;
    let exclusions = config.exclusions().to_string();
    let project_root = config.project.root.clone();

    let report = if opts.yes {
        let mut operator = ScriptedOperator::new();
        operator = match opts.version {
            Some(version) => operator.with_version(version),
            None => operator.with_suggested_version(),
        };
        operator = operator
            .with_note(opts.note.unwrap_or_default())
            .with_confirmation(true);
        release(config, operator)?
    } else {
        release(config, InquireOperator::new())?
    };

    for warning in &report.archive.warnings {
        warn!("{warning}");
    }

    println!();
    println!("Release D{:03} {} {}", report.sequence_id, report.tier, report.version.label());
    println!("  Note:     {}", report.note);
    println!("  Skipped:  {exclusions}");
    println!("  Project:  {}", project_root.display());
    println!("  Archive:  {}", report.archive.path.display());
    println!("  Ledger:   {}", report.ledger_path.display());
    println!(
        "  Packed:   {} files, {} bytes",
        report.archive.entry_count, report.archive.total_bytes_written
    );

    Ok(())
}

fn release<O: Operator>(config: ReleaseConfig, operator: O) -> Result<ReleaseReport> {
    let style = ProgressStyle::with_template("{spinner:.green} {pos:>6} files  {wide_msg}")?;
    let bar = ProgressBar::new_spinner().with_style(style);

    let archiver = ArchiveBuilder::new().with_progress(bar.clone());
    let result = ReleaseOrchestrator::new(config, operator)
        .with_archiver(archiver)
        .run();
    bar.finish_and_clear();

    Ok(result?)
}

fn run_status(config_path: PathBuf) -> Result<()> {
    let config = ReleaseConfig::load(&config_path)?;
    let state = recover_state(&config);
    println!("Project {}, active tier {}", config.project.name, state.tier);

    for tier in config.versioning.tiers.iter() {
        let ledger = config.ledger(tier);
        if !ledger.exists() {
            continue;
        }

        match ledger.recover_last() {
            Ok(Some(entry)) => println!(
                "  {tier:<10} D{:03}  {}  {}  {}  {}",
                entry.sequence_id,
                entry.version.label(),
                entry.timestamp,
                entry.note,
                entry.archive_name
            ),
            Ok(None) => println!("  {tier:<10} no entries"),
            Err(err) => println!("  {tier:<10} {err}"),
        }
    }

    Ok(())
}
