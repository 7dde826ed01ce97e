use serde::Serialize;

/// Where a discovered migration stands against the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MigrationState {
    Applied,
    /// Recorded as failed; needs manual ledger intervention before it can run again.
    Failed,
    Pending,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusEntry {
    pub migration_id: String,
    pub file_name: String,
    pub state: MigrationState,
    /// File content no longer matches the checksum recorded when it ran.
    pub drifted: bool,
}

/// Result of `show_status`: one entry per discovered file, in execution order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusReport {
    pub entries: Vec<StatusEntry>,
    /// Ledger ids with no matching file on disk.
    pub orphaned: Vec<String>,
}

impl StatusReport {
    pub fn applied(&self) -> usize {
        self.count(MigrationState::Applied)
    }

    pub fn failed(&self) -> usize {
        self.count(MigrationState::Failed)
    }

    pub fn pending(&self) -> usize {
        self.count(MigrationState::Pending)
    }

    pub fn drifted(&self) -> usize {
        self.entries.iter().filter(|e| e.drifted).count()
    }

    pub fn total(&self) -> usize {
        self.entries.len()
    }

    fn count(&self, state: MigrationState) -> usize {
        self.entries.iter().filter(|e| e.state == state).count()
    }
}
