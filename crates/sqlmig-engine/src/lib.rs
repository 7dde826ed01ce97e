//! Migration engine: discovers SQL scripts, works out which are pending against
//! the history ledger and applies them in order, exactly once each.

pub mod batch;
pub mod file;
pub mod ledger;
pub mod report;
pub mod runner;

#[cfg(test)]
mod test_support;

pub use batch::split_batches;
pub use file::{MigrationFile, checksum, discover, migration_order};
pub use ledger::{HistoryLedger, HistoryRecord, NewHistoryRecord};
pub use report::{MigrationState, StatusEntry, StatusReport};
pub use runner::{DEFAULT_BATCH_TIMEOUT, MigrationRunner};
