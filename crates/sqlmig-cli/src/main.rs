use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use sqlmig_common::Error;
use sqlmig_config::{AppConfig, ConfigLoader};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::Output;

#[derive(Parser)]
#[command(
    name = "sqlmig",
    version,
    about = "SQLMig - ordered, exactly-once SQL script migrations"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Directory holding config.yml or config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply every pending migration in order
    Migrate {
        #[command(flatten)]
        target: TargetArgs,

        /// Report what would be applied without touching the database
        #[arg(long)]
        dry_run: bool,
    },

    /// Show applied, failed and pending migrations
    Status {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// List the rows of the history ledger
    History {
        /// Database connection string
        #[arg(long, env = "SQLMIG_CONNECTION")]
        connection: Option<String>,
    },
}

#[derive(Args)]
struct TargetArgs {
    /// Database connection string
    #[arg(long, env = "SQLMIG_CONNECTION")]
    connection: Option<String>,

    /// Directory containing the .sql migration files
    #[arg(long, env = "SQLMIG_MIGRATIONS")]
    migrations: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let output = if cli.json {
        Output::Json
    } else {
        Output::Text
    };

    let config_loader = match &cli.config {
        Some(dir) => ConfigLoader::with_dir(dir),
        None => ConfigLoader::new(),
    };
    let config = match config_loader.load() {
        Ok(config) => config,
        Err(e) => return report(Err(e.into()), output, &mut std::io::stdout().lock()),
    };

    let log_level = cli
        .log_level
        .clone()
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match config_loader.config_file() {
        Some(path) => info!("loaded config from {}", path.display()),
        None => debug!(
            "no config file in {}, using defaults",
            config_loader.config_dir().display()
        ),
    }

    let result = run(cli.command, &config, output).await;
    report(result, output, &mut std::io::stdout().lock())
}

async fn run(command: Commands, config: &AppConfig, output: Output) -> Result<()> {
    match command {
        Commands::Migrate { target, dry_run } => {
            let target = commands::resolve_target(target.connection, target.migrations, config)?;
            commands::migrate(&target, dry_run, config, output).await
        }
        Commands::Status { target } => {
            let target = commands::resolve_target(target.connection, target.migrations, config)?;
            commands::status(&target, config, output).await
        }
        Commands::History { connection } => {
            let connection = commands::resolve_connection(connection, config)?;
            commands::history(&connection, config, output).await
        }
    }
}

/// Map a command result to the process exit code, writing any error to `out`.
///
/// With JSON output the error is a single document carrying the partial run
/// summary, so stdout stays parseable.
fn report(result: Result<()>, output: Output, out: &mut impl Write) -> ExitCode {
    ExitCode::from(exit_status(result, output, out))
}

fn exit_status(result: Result<()>, output: Output, out: &mut impl Write) -> u8 {
    let Err(e) = result else {
        return 0;
    };

    match output {
        Output::Text => {
            let _ = writeln!(out, "Error: {e:#}");
        }
        Output::Json => {
            let summary = match e.downcast_ref::<Error>() {
                Some(Error::Execution { summary, .. }) => Some(summary.as_ref()),
                _ => None,
            };
            let document = json!({ "error": format!("{e:#}"), "summary": summary });
            let text = serde_json::to_string_pretty(&document)
                .unwrap_or_else(|_| document.to_string());
            let _ = writeln!(out, "{text}");
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlmig_common::RunSummary;
    use std::fs;

    const BOOTSTRAP: &str =
        include_str!("../../../demos/migrations/0000_create_migration_history.sql");

    fn exit_text(result: Result<()>, output: Output) -> (u8, String) {
        let mut out = Vec::new();
        let code = exit_status(result, output, &mut out);
        (code, String::from_utf8(out).unwrap())
    }

    #[test]
    fn success_exits_zero_and_prints_nothing() {
        let (code, text) = exit_text(Ok(()), Output::Text);
        assert_eq!(code, 0);
        assert!(text.is_empty());
    }

    #[test]
    fn error_exits_one_with_message() {
        let err = Error::Config("no connection string".into());
        let (code, text) = exit_text(Err(err.into()), Output::Text);
        assert_eq!(code, 1);
        assert_eq!(text, "Error: configuration error: no connection string\n");
    }

    #[test]
    fn json_error_is_one_document_with_partial_summary() {
        let err = Error::Execution {
            migration_id: "0002_b".into(),
            message: "no such table: accounts".into(),
            summary: Box::new(RunSummary {
                applied: 1,
                failed: 1,
                ..RunSummary::default()
            }),
        };
        let (code, text) = exit_text(Err(err.into()), Output::Json);
        assert_eq!(code, 1);

        let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            doc["error"],
            "migration 0002_b failed: no such table: accounts"
        );
        assert_eq!(doc["summary"]["applied"], 1);
        assert_eq!(doc["summary"]["failed"], 1);
    }

    #[tokio::test]
    async fn missing_connection_fails_the_command() {
        let command = Commands::Status {
            target: TargetArgs {
                connection: None,
                migrations: Some("migrations".into()),
            },
        };
        let result = run(command, &AppConfig::default(), Output::Text).await;
        let (code, text) = exit_text(result, Output::Text);
        assert_eq!(code, 1);
        assert!(text.starts_with("Error: configuration error: no connection string"));
    }

    #[tokio::test]
    async fn parsed_migrate_command_exits_zero() {
        let dir = tempfile::tempdir().unwrap();
        let migrations = dir.path().join("migrations");
        fs::create_dir(&migrations).unwrap();
        fs::write(migrations.join("0000_create_migration_history.sql"), BOOTSTRAP).unwrap();
        fs::write(migrations.join("0001_t.sql"), "CREATE TABLE t (x INTEGER);\n").unwrap();
        let db = dir.path().join("app.db");

        let cli = Cli::try_parse_from([
            "sqlmig".to_string(),
            "migrate".to_string(),
            "--connection".to_string(),
            db.display().to_string(),
            "--migrations".to_string(),
            migrations.display().to_string(),
        ])
        .unwrap();

        let result = run(cli.command, &AppConfig::default(), Output::Text).await;
        let (code, text) = exit_text(result, Output::Text);
        assert_eq!(code, 0, "{text}");
        assert!(db.exists());
    }
}
