//! # rag-backup CLI
//!
//! Snapshots and restores the persisted state of a local document
//! question-answering stack.
//!
//! ## Usage
//!
//! ```bash
//! rag-backup --config ./config/backup.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag-backup backup [label]` | Create a backup set (`--yes` skips the running-app prompt) |
//! | `rag-backup list` | List backup sets with size and date (`--json` for scripts) |
//! | `rag-backup restore <name>` | Restore a set over live data (always asks) |
//! | `rag-backup cleanup [days]` | Delete sets older than `days` (default from config) |
//! | `rag-backup info <name>` | Print a set's summary |
//! | `rag-backup verify <name>` | Check archive checksums against descriptors |
//!
//! ## Examples
//!
//! ```bash
//! # Snapshot before upgrading models
//! rag-backup backup before_upgrade
//!
//! # Nightly cron job: don't prompt, keep two weeks
//! rag-backup backup nightly --yes && rag-backup cleanup 14
//!
//! # Roll back
//! rag-backup restore before_upgrade_20240309_070501
//! ```

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use rag_backup::config;
use rag_backup::confirm::{AlwaysConfirm, ConfirmationPolicy, TerminalConfirm};
use rag_backup::inspect::ChromaInspector;
use rag_backup::logging;
use rag_backup::orchestrator::{BackupOrchestrator, VerifyStatus};
use rag_backup::supervisor::SystemSupervisor;

/// rag-backup: backup, restore, and retention for a local document
/// question-answering stack.
#[derive(Parser)]
#[command(
    name = "rag-backup",
    about = "Backup, restore, and retention for a local document question-answering stack",
    version,
    long_about = "Snapshots the persisted vector store, the document corpus, and configuration \
    files of a locally hosted question-answering application into timestamped backup sets, \
    restores them without deleting live data, and prunes old sets."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/backup.toml` when present; built-in defaults
    /// are used otherwise.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter (trace, debug, info, warn, error). `RUST_LOG` overrides it.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a backup set.
    ///
    /// Archives the vector store and documents, copies configuration files,
    /// and writes BACKUP_INFO.txt last. If the application is running, asks
    /// for confirmation first because the vector store may be mid-write.
    Backup {
        /// Label prefix for the set name (letters, digits, '-', '_', '.').
        label: Option<String>,

        /// Proceed without prompting when the application is running.
        #[arg(long, short)]
        yes: bool,
    },

    /// List backup sets, oldest first.
    List {
        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Restore a backup set over live data.
    ///
    /// Stops the application, renames existing data to
    /// `<dir>.backup.<unix-seconds>`, and extracts the archives. Always asks
    /// for confirmation.
    Restore {
        /// Backup set name as shown by `list`.
        name: String,
    },

    /// Delete backup sets older than a number of days.
    Cleanup {
        /// Maximum age in days. Defaults to `backup.retention_days` (7).
        days: Option<u64>,
    },

    /// Print a backup set's summary.
    Info {
        /// Backup set name as shown by `list`.
        name: String,
    },

    /// Verify archive checksums of a backup set.
    Verify {
        /// Backup set name as shown by `list`.
        name: String,
    },
}

fn orchestrator(cfg: config::Config, confirm: Box<dyn ConfirmationPolicy>) -> BackupOrchestrator {
    BackupOrchestrator::new(cfg, Box::new(SystemSupervisor), confirm)
        .with_inspector(Box::new(ChromaInspector::new()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_or_default(cli.config.as_deref())?;
    let level = cli.log_level.as_deref().unwrap_or(&cfg.logging.level);
    logging::init(level)?;

    match cli.command {
        Commands::Backup { label, yes } => {
            let confirm: Box<dyn ConfirmationPolicy> = if yes {
                Box::new(AlwaysConfirm)
            } else {
                Box::new(TerminalConfirm)
            };
            let orch = orchestrator(cfg, confirm);
            let set = orch.create(label.as_deref()).await?;
            println!("Backup created: {}", set.name);
            if let Some(summary) = orch.info(&set.name)? {
                println!();
                print!("{}", summary);
            }
        }
        Commands::List { json } => {
            let orch = orchestrator(cfg, Box::new(TerminalConfirm));
            if json {
                println!("{}", serde_json::to_string_pretty(&orch.list()?)?);
            } else {
                print!("{}", orch.list_report()?);
            }
        }
        Commands::Restore { name } => {
            // Restore is destructive: never pre-confirmed.
            let orch = orchestrator(cfg, Box::new(TerminalConfirm));
            let report = orch.restore(&name).await?;

            for pattern in &report.stop_failures {
                eprintln!("warning: could not stop processes matching '{}'", pattern);
            }
            for (from, to) in &report.renamed_aside {
                println!("Moved {} -> {}", from.display(), to.display());
            }
            if report.restored.is_empty() {
                println!("Nothing to restore in {}.", report.name);
            } else {
                let names: Vec<&str> = report.restored.iter().map(|c| c.as_str()).collect();
                println!("Restored {} from {}.", names.join(", "), report.name);
                println!("Restart the application to pick up the restored data.");
            }
        }
        Commands::Cleanup { days } => {
            let effective = days.unwrap_or(cfg.backup.retention_days);
            let orch = orchestrator(cfg, Box::new(TerminalConfirm));
            let removed = orch.cleanup(Some(effective))?;
            println!(
                "Removed {} backup{} older than {} day{}.",
                removed,
                if removed == 1 { "" } else { "s" },
                effective,
                if effective == 1 { "" } else { "s" }
            );
        }
        Commands::Info { name } => {
            let orch = orchestrator(cfg, Box::new(TerminalConfirm));
            match orch.info(&name)? {
                Some(summary) => print!("{}", summary),
                None => bail!(
                    "backup {} is incomplete: BACKUP_INFO.txt is missing (interrupted or aborted)",
                    name
                ),
            }
        }
        Commands::Verify { name } => {
            let orch = orchestrator(cfg, Box::new(TerminalConfirm));
            let report = orch.verify(&name)?;
            if report.checks.is_empty() {
                println!("{}: no archives to verify", name);
            }
            for (component, status) in &report.checks {
                let line = match status {
                    VerifyStatus::Ok => "ok".to_string(),
                    VerifyStatus::Missing(file) => format!("MISSING {}", file),
                    VerifyStatus::Mismatch { expected, actual } => {
                        format!("MISMATCH expected {} got {}", expected, actual)
                    }
                    VerifyStatus::Unreadable(reason) => format!("UNREADABLE {}", reason),
                };
                println!("{:<14} {}", component.as_str(), line);
            }
            if !report.is_ok() {
                bail!("backup {} failed verification", name);
            }
        }
    }

    Ok(())
}
