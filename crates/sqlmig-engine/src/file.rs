use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use regex::Regex;
use ring::digest;
use sqlmig_common::{Error, PendingMigration, Result};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;
use walkdir::WalkDir;

const MIGRATION_EXTENSION: &str = "sql";
const BYTE_ORDER_MARK: char = '\u{FEFF}';

static MIGRATION_ID_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^-- MigrationId: (.+)$").expect("marker pattern is valid"));

/// One migration script loaded from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub migration_id: String,
    pub file_name: String,
    pub path: PathBuf,
    pub content: String,
    /// Base64 SHA-256 of `content`.
    pub checksum: String,
}

impl MigrationFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::file_access(path, e))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::file_access(path, "path has no file name"))?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.clone());

        Ok(Self::from_content(file_name, stem, path.to_path_buf(), content))
    }

    /// A leading byte-order mark is dropped before the id and checksum are taken.
    fn from_content(file_name: String, stem: String, path: PathBuf, content: String) -> Self {
        let content = match content.strip_prefix(BYTE_ORDER_MARK) {
            Some(rest) => rest.to_string(),
            None => content,
        };
        let migration_id = extract_migration_id(&content).unwrap_or(stem);
        let checksum = checksum(&content);
        Self {
            migration_id,
            file_name,
            path,
            content,
            checksum,
        }
    }

    pub fn as_pending(&self) -> PendingMigration {
        PendingMigration {
            migration_id: self.migration_id.clone(),
            file_name: self.file_name.clone(),
        }
    }
}

/// First `-- MigrationId: <value>` marker in the script, trimmed.
pub fn extract_migration_id(content: &str) -> Option<String> {
    MIGRATION_ID_MARKER
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|id| !id.is_empty())
}

/// SHA-256 over the UTF-8 bytes of `content`, standard padded base64 (44 chars).
pub fn checksum(content: &str) -> String {
    let d = digest::digest(&digest::SHA256, content.as_bytes());
    BASE64.encode(d.as_ref())
}

/// Execution order: ordinal comparison of file names.
pub fn migration_order(a: &MigrationFile, b: &MigrationFile) -> Ordering {
    a.file_name.cmp(&b.file_name)
}

/// Load every `.sql` file directly inside `dir`, sorted by [`migration_order`].
///
/// Any unreadable entry fails the whole discovery.
pub fn discover(dir: &Path) -> Result<Vec<MigrationFile>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true) {
        let entry = entry.map_err(|e| {
            let path = e.path().map_or_else(|| dir.to_path_buf(), Path::to_path_buf);
            Error::file_access(path, e)
        })?;

        let path = entry.path();
        let is_sql = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(MIGRATION_EXTENSION));
        if !entry.file_type().is_file() || !is_sql {
            continue;
        }

        let file = MigrationFile::load(path)?;
        debug!(
            "discovered migration {} ({}, checksum {})",
            file.migration_id, file.file_name, file.checksum
        );
        files.push(file);
    }

    files.sort_by(migration_order);
    ensure_unique_ids(&files)?;
    Ok(files)
}

fn ensure_unique_ids(files: &[MigrationFile]) -> Result<()> {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    for file in files {
        if let Some(first) = seen.insert(&file.migration_id, &file.file_name) {
            return Err(Error::IntegrityConflict(format!(
                "migration id {} is declared by both {first} and {}",
                file.migration_id, file.file_name
            )));
        }
    }
    Ok(())
}
