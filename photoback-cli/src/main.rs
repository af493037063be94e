//! Photoback: keep one borg repository per folder, and back them all up.
//!
//! # Usage
//!
//! ```text
//! photoback <CONFIG> [--archive-name NAME] [--borg PATH] [--json]
//! ```
//!
//! Every directory next to `CONFIG` is archived into
//! `<repo_root>/<directory name>`, creating the repository on first use.

mod report;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use photoback_backup::{backup_all, BackupSettings, BatchAborted, BatchReport};
use photoback_core::{config, BackupConfig};
use photoback_engine::BorgEngine;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "photoback",
    version,
    about = "Back up every folder next to a config file into its own borg repository",
    long_about = None,
)]
struct Cli {
    /// The repository set configuration file. Has to be in the same
    /// directory as the folders to back up.
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// The new archive name (overrides `standard_archive_name`).
    #[arg(long, short = 'a', value_name = "NAME")]
    archive_name: Option<String>,

    /// Archive engine executable.
    #[arg(long, value_name = "PATH", default_value = BorgEngine::DEFAULT_PROGRAM)]
    borg: PathBuf,

    /// Emit the batch report as JSON.
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn run(self) -> Result<ExitCode> {
        let config = config::load(&self.config)
            .with_context(|| format!("failed to load config '{}'", self.config.display()))?
            .with_archive_name(self.archive_name.clone());

        tracing::info!(
            archive = %config.archive_name,
            source_root = %config.source_root.display(),
            repo_root = %config.repo_root,
            "starting total backup"
        );

        let engine = BorgEngine::new(config.engine_env.clone()).with_program(self.borg.clone());
        let settings = BackupSettings::new(config.archive_name.clone(), config.policy);

        let report = match backup_all(&engine, &config.repo_root, &config.source_root, &settings) {
            Ok(report) => report,
            Err(BatchAborted { report, source }) => {
                if !report.entries.is_empty() {
                    self.print_report(&config, &report, false)?;
                }
                if source.is_access_aborted() {
                    return Err(source).with_context(|| {
                        format!(
                            "repository access aborted because of a chosen policy; the repository was \
                             probably relocated. Set BORG_RELOCATED_REPO_ACCESS_IS_OK in '{}'",
                            config.path.display()
                        )
                    });
                }
                return Err(source).with_context(|| {
                    format!("cannot back up folders in '{}'", config.source_root.display())
                });
            }
        };

        self.print_report(&config, &report, true)?;

        if report.has_failures() {
            return Ok(ExitCode::FAILURE);
        }
        Ok(ExitCode::SUCCESS)
    }

    fn print_report(&self, config: &BackupConfig, report: &BatchReport, complete: bool) -> Result<()> {
        if self.json {
            report::print_json(config, report, complete)
        } else {
            report::print_table(config, report, complete);
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();
    cli.run()
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
