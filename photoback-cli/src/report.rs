//! Batch report rendering: table for humans, JSON for scripts.

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use photoback_backup::{
    freshness::format_age, BackupOutcome, BatchReport, Readiness, RepositoryReport,
};
use photoback_core::BackupConfig;

#[derive(Serialize)]
struct BatchReportJson {
    archive_name: String,
    repo_root: String,
    /// `false` when the run stopped before visiting every folder.
    complete: bool,
    summary: SummaryJson,
    repositories: Vec<RepositoryJson>,
}

#[derive(Serialize)]
struct SummaryJson {
    attempted: usize,
    succeeded: usize,
    skipped: usize,
    failed: usize,
}

#[derive(Serialize)]
struct RepositoryJson {
    folder: String,
    source: String,
    repository: Option<String>,
    status: &'static str,
    ran_backup: bool,
    archive: Option<String>,
    detail: String,
}

#[derive(Tabled)]
struct ReportRow {
    #[tabled(rename = "folder")]
    folder: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "archive")]
    archive: String,
    #[tabled(rename = "detail")]
    detail: String,
}

pub fn print_json(config: &BackupConfig, report: &BatchReport, complete: bool) -> Result<()> {
    let summary = report.summary();
    let payload = BatchReportJson {
        archive_name: config.archive_name.to_string(),
        repo_root: config.repo_root.clone(),
        complete,
        summary: SummaryJson {
            attempted: summary.attempted,
            succeeded: summary.succeeded,
            skipped: summary.skipped,
            failed: summary.failed,
        },
        repositories: report
            .entries
            .iter()
            .map(|entry| RepositoryJson {
                folder: entry.folder.clone(),
                source: entry.source.display().to_string(),
                repository: entry.repository.as_ref().map(|r| r.to_string()),
                status: status_key(entry),
                ran_backup: matches!(&entry.result, Ok(o) if o.ran_backup()),
                archive: entry
                    .result
                    .as_ref()
                    .ok()
                    .and_then(|o| o.archive_name())
                    .map(|n| n.to_string()),
                detail: detail(entry),
            })
            .collect(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize report JSON")?
    );
    Ok(())
}

pub fn print_table(config: &BackupConfig, report: &BatchReport, complete: bool) {
    let summary = report.summary();

    if report.entries.is_empty() {
        println!("No folders found next to {}.", config.path.display());
    } else {
        let rows: Vec<ReportRow> = report
            .entries
            .iter()
            .map(|entry| ReportRow {
                folder: entry.folder.clone(),
                status: status_key(entry).to_uppercase(),
                archive: entry
                    .result
                    .as_ref()
                    .ok()
                    .and_then(|o| o.archive_name())
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                detail: detail(entry),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }

    let line = format!(
        "Backed up {} out of {} repositories ({} skipped, {} failed).",
        summary.succeeded, summary.attempted, summary.skipped, summary.failed
    );
    if summary.failed > 0 || !complete {
        println!("{} {line}", "✗".red().bold());
    } else {
        println!("{} {line}", "✓".green().bold());
        println!(
            "Total backup for a new archive prefixed {} has completed successfully.",
            config.archive_name
        );
    }
}

fn status_key(entry: &RepositoryReport) -> &'static str {
    match &entry.result {
        Ok(BackupOutcome::Created { .. }) => "created",
        Ok(BackupOutcome::Skipped { .. }) => "skipped",
        Err(_) => "failed",
    }
}

fn detail(entry: &RepositoryReport) -> String {
    match &entry.result {
        Ok(BackupOutcome::Created { readiness, .. }) => match readiness {
            Readiness::Verified => "repository verified".to_string(),
            Readiness::Initialized => "repository initialized".to_string(),
            Readiness::AlreadyPresent => "repository appeared during init".to_string(),
        },
        Ok(BackupOutcome::Skipped {
            latest,
            age,
            remaining,
        }) => format!(
            "{} is {} old, next due in {}",
            latest.name,
            format_age(*age),
            format_age(*remaining)
        ),
        Err(err) => err.to_string(),
    }
}
