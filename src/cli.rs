//! Command-line interface module for dirsorter.
//!
//! This module handles all CLI-related functionality including:
//! - Argument parsing
//! - Loading configuration and applying command-line overrides
//! - Running a watch session until Ctrl-C
//! - One-off organization with a progress bar
//! - Dry-run planning

use crate::activity::{Activity, EventSink, JsonLinesSink};
use crate::config::OrganizerConfig;
use crate::file_organizer::{FileOrganizer, MoveOutcome, SweepReport};
use crate::output::{ConsoleSink, OutputFormatter};
use crate::session::Session;
use crate::stop::StopSignal;
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Sort files into category folders, once or continuously.
#[derive(Debug, Parser)]
#[command(name = "dirsorter", version, about)]
pub struct Cli {
    /// Configuration file (JSON, or TOML with a .toml extension)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory to organize, overriding `watch_directory` from the config
    #[arg(short, long, global = true)]
    pub dir: Option<PathBuf>,

    /// Print activity as JSON lines instead of colored text
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Represents a CLI command to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Sort existing files, then keep sorting new ones until Ctrl-C (default)
    Watch {
        /// Skip sorting the files already in the directory
        #[arg(long)]
        no_sweep: bool,
    },
    /// Sort the files currently in the directory and exit
    Organize,
    /// Show where files would go without moving anything
    Plan,
}

impl Cli {
    pub fn action(&self) -> Command {
        self.command.unwrap_or(Command::Watch { no_sweep: false })
    }
}

/// Runs the CLI application.
///
/// # Errors
///
/// Configuration problems, an unusable directory, or a failed watch session.
pub async fn run_cli(cli: Cli) -> anyhow::Result<()> {
    let mut config =
        OrganizerConfig::load(cli.config.as_deref()).context("Error loading configuration")?;
    if let Some(dir) = &cli.dir {
        config.watch_directory = dir.to_string_lossy().to_string();
    }

    match cli.action() {
        Command::Watch { no_sweep } => watch(config, cli.json, !no_sweep).await,
        Command::Organize => organize(config, cli.json).await,
        Command::Plan => plan(&config),
    }
}

/// Runs a watch session until Ctrl-C.
async fn watch(config: OrganizerConfig, json: bool, sweep_first: bool) -> anyhow::Result<()> {
    let sink: Arc<dyn EventSink> = if json {
        Arc::new(JsonLinesSink)
    } else {
        Arc::new(ConsoleSink::new())
    };

    let session = Session::new(config, sink).context("Error compiling ignore rules")?;
    stop_on_ctrl_c(session.stop_signal());

    let summary = session.run(sweep_first).await?;
    if !json {
        OutputFormatter::info(&format!("Files organized: {}", summary.files_moved));
    }
    Ok(())
}

/// Sorts the files currently in the directory, with a progress bar.
async fn organize(config: OrganizerConfig, json: bool) -> anyhow::Result<()> {
    let target = config.watch_target()?;
    let organizer = FileOrganizer::from_config(&config).context("Error compiling ignore rules")?;
    let base_dir = target.path().to_path_buf();

    let console = Arc::new(ConsoleSink::new());
    let sink: Arc<dyn EventSink> = if json {
        Arc::new(JsonLinesSink)
    } else {
        console.clone()
    };
    let activity = Activity::new(sink);
    let stop = StopSignal::new();
    stop_on_ctrl_c(stop.clone());

    if !json {
        OutputFormatter::info(&format!("Organizing contents of: {}", base_dir.display()));
    }

    let report = tokio::task::spawn_blocking(move || {
        let pb = (!json).then(|| {
            let pb = OutputFormatter::create_progress_bar(0);
            console.attach_progress(pb.clone());
            pb
        });

        let report = organizer.classify_existing_with(&base_dir, &stop, &activity, |progress| {
            if let Some(pb) = &pb {
                pb.set_length(progress.total as u64);
                pb.set_position(progress.processed as u64);
            }
        });

        if let Some(pb) = pb {
            pb.finish_and_clear();
            console.detach_progress();
        }
        report.map(|report| (report, base_dir))
    })
    .await
    .context("Organization task failed")??;

    if !json {
        let (report, base_dir) = &report;
        print_sweep_summary(report, base_dir);
    }
    Ok(())
}

/// Prints what a sweep would do, without moving anything.
fn plan(config: &OrganizerConfig) -> anyhow::Result<()> {
    let target = config.watch_target()?;
    let organizer = FileOrganizer::from_config(config).context("Error compiling ignore rules")?;
    let planned = organizer.plan_existing(target.path())?;

    OutputFormatter::dry_run_notice(&format!("Analyzing contents of: {}", target.path().display()));
    if planned.is_empty() {
        OutputFormatter::plain("No files found to organize.");
        return Ok(());
    }

    let mut category_counts: HashMap<String, usize> = HashMap::new();
    for entry in &planned {
        let name = entry
            .from
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let destination = entry
            .to
            .strip_prefix(target.path())
            .unwrap_or(&entry.to)
            .display()
            .to_string();
        OutputFormatter::plain(&format!(" - {}", name));
        OutputFormatter::plain(&format!("   → Would move to {}", destination));

        *category_counts
            .entry(entry.category.display().to_string())
            .or_insert(0) += 1;
    }

    OutputFormatter::summary_table(&category_counts, planned.len());
    OutputFormatter::dry_run_notice("No files were modified.");
    Ok(())
}

fn print_sweep_summary(report: &SweepReport, base_dir: &Path) {
    let mut category_counts: HashMap<String, usize> = HashMap::new();
    for outcome in &report.outcomes {
        if let MoveOutcome::Moved { to, .. } = outcome
            && let Some(folder) = to.parent()
        {
            let folder = folder.strip_prefix(base_dir).unwrap_or(folder);
            *category_counts
                .entry(folder.display().to_string())
                .or_insert(0) += 1;
        }
    }

    if !category_counts.is_empty() {
        OutputFormatter::summary_table(&category_counts, report.moved());
    }
    if report.failed() > 0 {
        OutputFormatter::error(&format!(
            "{} file(s) could not be organized. Please review errors above.",
            report.failed()
        ));
    }
    if report.cancelled {
        OutputFormatter::plain(&format!(
            "Stopped after {} of {} files.",
            report.processed, report.total
        ));
    }
}

fn stop_on_ctrl_c(stop: StopSignal) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.stop();
        }
    });
}
