use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use sqlmig_common::{Error, RunSummary};
use sqlmig_config::AppConfig;
use sqlmig_db::SqliteExecutor;
use sqlmig_engine::{HistoryRecord, MigrationRunner, MigrationState, StatusReport};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    Text,
    Json,
}

/// Where a `migrate` or `status` command points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub connection: String,
    pub migrations: PathBuf,
}

/// Flag (or env var, which clap folds into the flag) first, then the config file.
pub fn resolve_connection(flag: Option<String>, config: &AppConfig) -> Result<String> {
    flag.or_else(|| config.connection.clone())
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| {
            Error::Config(
                "no connection string: pass --connection, set SQLMIG_CONNECTION or add `connection` to the config file"
                    .into(),
            )
            .into()
        })
}

pub fn resolve_target(
    connection: Option<String>,
    migrations: Option<PathBuf>,
    config: &AppConfig,
) -> Result<Target> {
    let connection = resolve_connection(connection, config)?;
    let migrations = migrations
        .or_else(|| config.migrations_dir.clone())
        .ok_or_else(|| {
            Error::Config(
                "no migrations directory: pass --migrations, set SQLMIG_MIGRATIONS or add `migrations_dir` to the config file"
                    .into(),
            )
        })?;
    Ok(Target {
        connection,
        migrations,
    })
}

/// Only a real `migrate` may create the database file; reads fail on a missing one.
fn build_runner(connection: &str, config: &AppConfig, create: bool) -> Result<MigrationRunner> {
    let executor = SqliteExecutor::new(connection)?.create_if_missing(create);
    debug!(
        "using {} with ledger table {} and batch timeout {}s",
        executor.target(),
        config.ledger_table,
        config.batch_timeout_secs
    );
    Ok(MigrationRunner::new(Arc::new(executor))
        .with_ledger_table(config.ledger_table.as_str())
        .with_batch_timeout(config.batch_timeout()))
}

pub async fn migrate(
    target: &Target,
    dry_run: bool,
    config: &AppConfig,
    output: Output,
) -> Result<()> {
    let runner = build_runner(&target.connection, config, !dry_run)?;
    match runner.run_migrations(&target.migrations, dry_run).await {
        Ok(summary) => emit(output, &summary, render_summary),
        Err(err) => {
            // Show how far the run got. JSON output carries it in the error document.
            if let (Error::Execution { summary, .. }, Output::Text) = (&err, output) {
                print!("{}", render_summary(summary));
            }
            Err(err.into())
        }
    }
}

pub async fn status(target: &Target, config: &AppConfig, output: Output) -> Result<()> {
    let runner = build_runner(&target.connection, config, false)?;
    let report = runner.show_status(&target.migrations).await?;
    emit(output, &report, render_status)
}

pub async fn history(connection: &str, config: &AppConfig, output: Output) -> Result<()> {
    let runner = build_runner(connection, config, false)?;
    let records = runner.ledger().list_history().await?;
    emit(output, records.as_slice(), render_history)
}

fn emit<T: Serialize + ?Sized>(
    output: Output,
    value: &T,
    render: impl Fn(&T) -> String,
) -> Result<()> {
    match output {
        Output::Text => print!("{}", render(value)),
        Output::Json => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

pub fn render_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    if summary.dry_run {
        let _ = writeln!(out, "Migration Plan (dry run)");
        let _ = writeln!(out, "────────────────────────");
        if summary.pending.is_empty() {
            let _ = writeln!(out, "  Nothing to apply.");
        }
        for p in &summary.pending {
            let _ = writeln!(out, "  would apply {} ({})", p.migration_id, p.file_name);
        }
        let _ = writeln!(
            out,
            "  {} pending, {} already applied",
            summary.pending.len(),
            summary.skipped
        );
        return out;
    }

    let _ = writeln!(out, "Migration Report");
    let _ = writeln!(out, "────────────────");
    let _ = writeln!(out, "  Applied: {}", summary.applied);
    let _ = writeln!(out, "  Skipped: {}", summary.skipped);
    if summary.failed > 0 {
        let _ = writeln!(out, "  Failed:  {}", summary.failed);
    }
    out
}

pub fn render_status(report: &StatusReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Migration Status");
    let _ = writeln!(out, "────────────────");
    if report.entries.is_empty() {
        let _ = writeln!(out, "  (no migration files found)");
    }

    let width = report
        .entries
        .iter()
        .map(|e| e.migration_id.len())
        .max()
        .unwrap_or(0);
    for entry in &report.entries {
        let state = match entry.state {
            MigrationState::Applied => "applied",
            MigrationState::Failed => "FAILED",
            MigrationState::Pending => "pending",
        };
        let drift = if entry.drifted { "  (changed since applied)" } else { "" };
        let _ = writeln!(
            out,
            "  {:<width$}  {:<7}  {}{drift}",
            entry.migration_id, state, entry.file_name
        );
    }

    let _ = writeln!(
        out,
        "  {} total: {} applied, {} failed, {} pending",
        report.total(),
        report.applied(),
        report.failed(),
        report.pending()
    );
    if report.drifted() > 0 {
        let _ = writeln!(out, "  {} changed on disk since applied", report.drifted());
    }
    if !report.orphaned.is_empty() {
        let _ = writeln!(
            out,
            "  In ledger but missing on disk ({}):",
            report.orphaned.len()
        );
        for id in &report.orphaned {
            let _ = writeln!(out, "    - {id}");
        }
    }
    out
}

pub fn render_history(records: &[HistoryRecord]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Migration History");
    let _ = writeln!(out, "─────────────────");
    if records.is_empty() {
        let _ = writeln!(out, "  (ledger is empty)");
    }
    for r in records {
        let time = r
            .execution_time_ms
            .map(|ms| format!("{ms}ms"))
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "  #{} {} [{}] {} {} ({})",
            r.id,
            r.migration_id,
            r.status,
            time,
            r.applied_date.format("%Y-%m-%d %H:%M:%S UTC"),
            r.file_name
        );
        if let Some(message) = &r.error_message {
            let _ = writeln!(out, "      error: {message}");
        }
    }
    out
}
