use sqlmig_common::{Error, MigrationStatus, Result, RunSummary};
use sqlmig_db::SqlExecutor;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::batch::split_batches;
use crate::file::{MigrationFile, discover};
use crate::ledger::{DEFAULT_LEDGER_TABLE, HistoryLedger, NewHistoryRecord};
use crate::report::{MigrationState, StatusEntry, StatusReport};

pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(300);

/// Applies pending migrations from a directory, one at a time, in file-name order.
///
/// A migration is pending when its id is absent from the ledger. Each attempt
/// writes exactly one ledger row; the first failure stops the run.
pub struct MigrationRunner {
    executor: Arc<dyn SqlExecutor>,
    ledger: HistoryLedger,
    batch_timeout: Duration,
}

impl MigrationRunner {
    pub fn new(executor: Arc<dyn SqlExecutor>) -> Self {
        let ledger = HistoryLedger::new(executor.clone(), DEFAULT_LEDGER_TABLE);
        Self {
            executor,
            ledger,
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_ledger_table(mut self, table: impl Into<String>) -> Self {
        self.ledger = HistoryLedger::new(self.executor.clone(), table);
        self
    }

    #[must_use]
    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = timeout;
        self
    }

    pub fn ledger(&self) -> &HistoryLedger {
        &self.ledger
    }

    pub async fn run_migrations(&self, dir: &Path, dry_run: bool) -> Result<RunSummary> {
        let files = discover(dir)?;
        let statuses = self.ledger.applied_statuses().await?;
        let applied: HashSet<&str> = statuses.keys().map(String::as_str).collect();
        let pending = pending_migrations(&files, &applied);

        let mut summary = RunSummary {
            skipped: files.len() - pending.len(),
            pending: pending.iter().map(|f| f.as_pending()).collect(),
            dry_run,
            ..RunSummary::default()
        };

        warn_failed_rows(&statuses);

        if dry_run {
            info!(
                "dry run: {} pending, {} already applied",
                summary.pending.len(),
                summary.skipped
            );
            for p in &summary.pending {
                info!("would apply {} ({})", p.migration_id, p.file_name);
            }
            return Ok(summary);
        }

        if pending.is_empty() {
            info!("database is up to date ({} migrations applied)", summary.skipped);
            return Ok(summary);
        }

        for file in pending {
            self.apply(file, &mut summary).await?;
        }

        info!(
            "migration run complete: {} applied, {} skipped",
            summary.applied, summary.skipped
        );
        Ok(summary)
    }

    async fn apply(&self, file: &MigrationFile, summary: &mut RunSummary) -> Result<()> {
        let batches = split_batches(&file.content);
        info!(
            "applying {} ({}, {} batches)",
            file.migration_id,
            file.file_name,
            batches.len()
        );

        let started = Instant::now();
        let outcome = self
            .executor
            .execute_batches(&batches, self.batch_timeout)
            .await;
        let elapsed_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

        match outcome {
            Ok(()) => {
                let record = NewHistoryRecord::success(file, elapsed_ms);
                if let Err(err) = self.ledger.record(&record).await {
                    if !matches!(err, Error::IntegrityConflict(_))
                        || !self.registered_itself(&file.migration_id).await?
                    {
                        return Err(err);
                    }
                    info!("{} registered itself in the ledger", file.migration_id);
                }
                summary.applied += 1;
                info!("applied {} in {elapsed_ms}ms", file.migration_id);
                Ok(())
            }
            // Nothing ran, so there is nothing to record.
            Err(e @ Error::Connectivity(_)) => Err(e),
            Err(e) => {
                let message = failure_message(e);
                error!("migration {} failed: {message}", file.migration_id);
                summary.failed += 1;

                let record = NewHistoryRecord::failed(file, elapsed_ms, &message);
                if let Err(record_err) = self.ledger.record(&record).await {
                    error!(
                        "could not record failure of {} in the ledger: {record_err}",
                        file.migration_id
                    );
                }

                Err(Error::Execution {
                    migration_id: file.migration_id.clone(),
                    message,
                    summary: Box::new(summary.clone()),
                })
            }
        }
    }

    async fn registered_itself(&self, migration_id: &str) -> Result<bool> {
        let statuses = self.ledger.applied_statuses().await?;
        Ok(statuses.get(migration_id) == Some(&MigrationStatus::Success))
    }

    /// Compare discovered files with the ledger without executing anything.
    pub async fn show_status(&self, dir: &Path) -> Result<StatusReport> {
        let files = discover(dir)?;
        let history = self.ledger.list_history().await?;

        let recorded: HashMap<&str, (MigrationStatus, &str)> = history
            .iter()
            .map(|r| (r.migration_id.as_str(), (r.status, r.checksum.as_str())))
            .collect();

        let entries: Vec<StatusEntry> = files
            .iter()
            .map(|file| {
                let (state, drifted) = match recorded.get(file.migration_id.as_str()) {
                    None => (MigrationState::Pending, false),
                    Some((MigrationStatus::Failed, _)) => (MigrationState::Failed, false),
                    Some((MigrationStatus::Success, checksum)) => {
                        // The bootstrap script registers itself without a checksum.
                        let drifted = !checksum.is_empty() && *checksum != file.checksum;
                        (MigrationState::Applied, drifted)
                    }
                };
                if drifted {
                    warn!(
                        "{} changed on disk since it was applied (checksum mismatch)",
                        file.file_name
                    );
                }
                StatusEntry {
                    migration_id: file.migration_id.clone(),
                    file_name: file.file_name.clone(),
                    state,
                    drifted,
                }
            })
            .collect();

        let on_disk: HashSet<&str> = files.iter().map(|f| f.migration_id.as_str()).collect();
        let orphaned = history
            .iter()
            .filter(|r| !on_disk.contains(r.migration_id.as_str()))
            .map(|r| r.migration_id.clone())
            .collect();

        Ok(StatusReport { entries, orphaned })
    }
}

/// Files whose id is not in the ledger, keeping the input order.
pub fn pending_migrations<'a>(
    files: &'a [MigrationFile],
    applied: &HashSet<&str>,
) -> Vec<&'a MigrationFile> {
    files
        .iter()
        .filter(|f| !applied.contains(f.migration_id.as_str()))
        .collect()
}

fn warn_failed_rows(statuses: &HashMap<String, MigrationStatus>) {
    let mut failed: Vec<&str> = statuses
        .iter()
        .filter(|(_, status)| **status == MigrationStatus::Failed)
        .map(|(id, _)| id.as_str())
        .collect();
    failed.sort_unstable();
    for id in failed {
        warn!("{id} is recorded as Failed and will not be retried; fix the ledger manually");
    }
}

fn failure_message(err: Error) -> String {
    match err {
        Error::Database(message) => message,
        other => other.to_string(),
    }
}
