use std::path::{Path, PathBuf};

use sqlmig_common::{Error, Result};

use crate::model::AppConfig;

pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            config_dir: Self::default_config_dir(),
        }
    }

    pub fn default_config_dir() -> PathBuf {
        let home_config = dirs::home_dir().map(|h| h.join(".sqlmig"));
        let xdg_config = dirs::config_dir().map(|c| c.join("sqlmig"));

        match (xdg_config, home_config) {
            (Some(xdg), Some(home)) => {
                // XDG wins unless only the legacy home directory exists.
                if !xdg.exists() && home.exists() {
                    home
                } else {
                    xdg
                }
            }
            (Some(xdg), None) => xdg,
            (None, Some(home)) => home,
            (None, None) => PathBuf::from(".sqlmig"),
        }
    }

    pub fn with_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// The file `load` reads: `config.yml`, else `config.toml`, else none.
    pub fn config_file(&self) -> Option<PathBuf> {
        ["config.yml", "config.toml"]
            .into_iter()
            .map(|name| self.config_dir.join(name))
            .find(|path| path.exists())
    }

    /// Load [`Self::config_file`], else defaults. The result is validated.
    pub fn load(&self) -> Result<AppConfig> {
        let config = match self.config_file() {
            Some(path) => {
                let contents = std::fs::read_to_string(&path)?;
                if path.extension().is_some_and(|e| e == "yml") {
                    serde_yaml::from_str(&contents)
                        .map_err(|e| Error::Config(format!("failed to parse YAML config: {e}")))?
                } else {
                    toml::from_str(&contents)
                        .map_err(|e| Error::Config(format!("failed to parse TOML config: {e}")))?
                }
            }
            None => AppConfig::default(),
        };

        validate(&config)?;
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// The ledger table name is spliced into SQL text, so it must be a plain identifier.
pub fn validate(config: &AppConfig) -> Result<()> {
    let table = &config.ledger_table;
    let valid_start = table
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::Config(format!(
            "ledger_table '{table}' must be a plain identifier (letters, digits, underscores)"
        )));
    }
    if config.batch_timeout_secs == 0 {
        return Err(Error::Config(
            "batch_timeout_secs must be greater than zero".into(),
        ));
    }
    Ok(())
}
