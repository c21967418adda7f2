//! stagetree binary
//!
//! Stages a plan of file mutations over a directory, previews the commit
//! with a dry run, and writes it to disk only if the preview is clean.
//!
//! ## Usage
//!
//! ```bash
//! # Preview and apply
//! stagetree plan.ron --root ./project
//!
//! # Preview only
//! stagetree plan.ron --dry-run
//!
//! # Replay another producer's log first; let staged actions win collisions
//! stagetree plan.ron --replay other.json --force
//! ```

mod plan;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use stagetree_core::{
    Action, ActionRecord, Committer, DryRunSink, LocalBackend, Reporter, StageConfig,
    TreeMutate, VirtualTree,
};
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::plan::Plan;

/// Stage file mutations, preview them, then commit.
#[derive(Parser, Debug)]
#[command(name = "stagetree")]
#[command(about = "Stage a plan of file mutations and commit it to a directory")]
struct Args {
    /// RON plan file
    plan: PathBuf,

    /// RON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory to stage over and commit to
    #[arg(long)]
    root: Option<PathBuf>,

    /// Preview only; never write
    #[arg(long)]
    dry_run: bool,

    /// Staged actions replace existing files on collision
    #[arg(long)]
    force: bool,

    /// Commit the log as recorded
    #[arg(long)]
    no_optimize: bool,

    /// Write the final action log as JSON records
    #[arg(long, value_name = "FILE")]
    emit_log: Option<PathBuf>,

    /// Apply a JSON action-record log before the plan is merged
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,
}

impl Args {
    fn config(&self) -> Result<StageConfig> {
        let mut config = match &self.config {
            Some(path) => StageConfig::load(path)?,
            None => StageConfig::default(),
        };
        if let Some(root) = &self.root {
            config.root = root.clone();
        }
        config.dry_run |= self.dry_run;
        config.force |= self.force;
        config.optimize &= !self.no_optimize;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    match run(&args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns `false` when the dry run found problems.
async fn run(args: &Args) -> Result<bool> {
    let config = args.config()?;
    let strategy = config.effective_strategy();
    let plan = Plan::load(&args.plan)?;
    info!(root = %config.root.display(), steps = plan.steps.len(), %strategy, "staging");

    let disk = Arc::new(LocalBackend::new(&config.root));
    let mut tree = VirtualTree::new(disk.clone());
    let mut staged = tree.branch();

    if let Some(path) = &args.replay {
        for action in load_records(path)? {
            tree.apply(&action, strategy)
                .await
                .with_context(|| format!("replaying {action}"))?;
        }
    }

    plan.stage(&mut staged).await.context("staging plan")?;
    tree.merge(&staged, strategy)
        .await
        .context("merging plan")?;

    if config.optimize {
        tree.optimize();
    }
    if let Some(path) = &args.emit_log {
        let records: Vec<ActionRecord> = tree.actions().iter().map(ActionRecord::from).collect();
        std::fs::write(path, serde_json::to_vec_pretty(&records)?)
            .with_context(|| format!("writing {}", path.display()))?;
    }

    if tree.actions().is_empty() {
        println!("Nothing to be done.");
        return Ok(true);
    }

    let reporter = Reporter::new(config.event_capacity);
    let dry = Committer::new(Arc::new(DryRunSink::new(disk.clone()))).with_reporter(reporter);
    let summary = dry.commit(tree.actions()).await?;

    if summary.has_errors() {
        for event in summary.errors() {
            println!("{event}");
        }
        return Ok(false);
    }
    for event in &summary.events {
        println!("{event}");
    }

    if config.dry_run {
        info!("dry run, nothing written");
        return Ok(true);
    }

    let live = Committer::new(disk).on_post_action(|action| {
        debug!(%action, "written");
        Ok(())
    });
    let summary = live.commit(tree.actions()).await.context("committing")?;
    info!(written = summary.applied.len(), "done");
    Ok(true)
}

fn load_records(path: &Path) -> Result<Vec<Action>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let records: Vec<ActionRecord> = serde_json::from_str(&text)?;
    records
        .into_iter()
        .map(|r| Action::try_from(r).map_err(Into::into))
        .collect()
}
