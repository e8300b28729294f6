//! monshin-admin
//!
//! Operator tool for the Monshin persistence layer: initialize storage,
//! probe health, move questionnaire settings and sessions in and out as
//! JSON, and batch-migrate sessions between backends. Configuration comes
//! from the same `MONSHIN_*` environment variables the service reads.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use eyre::{Result, WrapErr};
use tracing::info;

use monshin_core::models::snapshot::{ImportMode, QuestionnaireSnapshot, SessionSnapshot};
use monshin_store::backend::SessionQuery;
use monshin_store::config::{BackendKind, StoreConfig};
use monshin_store::context::PersistenceContext;

#[derive(Parser)]
#[command(name = "monshin-admin", about = "Monshin storage administration")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize the configured backend (schema, seed admin, purges).
    Init,
    /// Probe the configured backend and report reachability.
    Health,
    /// Write the questionnaire-settings snapshot to a JSON file.
    ExportSettings { file: PathBuf },
    /// Apply a questionnaire-settings snapshot from a JSON file.
    ImportSettings {
        file: PathBuf,
        #[arg(long, default_value = "merge")]
        mode: String,
    },
    /// Write all sessions to a JSON file.
    ExportSessions { file: PathBuf },
    /// Apply a session snapshot from a JSON file.
    ImportSessions {
        file: PathBuf,
        #[arg(long, default_value = "merge")]
        mode: String,
    },
    /// Copy every session from the active backend into another backend.
    /// Offline batch operation: run it with the service stopped.
    MigrateSessions {
        #[arg(long)]
        to: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = StoreConfig::from_env()?;
    let context = PersistenceContext::connect(&config)
        .await
        .wrap_err("failed to connect the configured persistence backend")?;

    match cli.command {
        Command::Init => {
            // `connect` already ran init.
            println!("initialized {} backend", context.backend_kind().as_str());
        }
        Command::Health => {
            let healthy = context.check_cloud_health().await;
            println!(
                "{} backend: {}",
                context.backend_kind().as_str(),
                if healthy { "ok" } else { "unreachable" }
            );
            if !healthy {
                std::process::exit(1);
            }
        }
        Command::ExportSettings { file } => {
            let snapshot = context.export_questionnaire_settings().await?;
            write_json(&file, &snapshot)?;
            println!(
                "exported {} templates, {} prompts to {}",
                snapshot.templates.len(),
                snapshot.prompts.len(),
                file.display()
            );
        }
        Command::ImportSettings { file, mode } => {
            let mode = ImportMode::parse(&mode)?;
            let snapshot: QuestionnaireSnapshot = read_json(&file)?;
            context.import_questionnaire_settings(snapshot, mode).await?;
            println!("settings imported ({} mode)", mode.as_str());
        }
        Command::ExportSessions { file } => {
            let snapshot = context.export_sessions().await?;
            write_json(&file, &snapshot)?;
            println!("exported {} sessions to {}", snapshot.sessions.len(), file.display());
        }
        Command::ImportSessions { file, mode } => {
            let mode = ImportMode::parse(&mode)?;
            let snapshot: SessionSnapshot = read_json(&file)?;
            let count = snapshot.sessions.len();
            context.import_sessions(snapshot, mode).await?;
            println!("imported {count} sessions ({} mode)", mode.as_str());
        }
        Command::MigrateSessions { to } => {
            let target_kind = BackendKind::parse(&to)?;
            if target_kind == context.backend_kind() {
                eyre::bail!("target backend is already the active backend");
            }
            let target_config = StoreConfig {
                backend: target_kind,
                ..config
            };
            let target = PersistenceContext::connect(&target_config)
                .await
                .wrap_err("failed to connect the migration target backend")?;

            let sessions = context.list_sessions(&SessionQuery::default()).await?;
            let total = sessions.len();
            for session in sessions {
                let id = session.id.clone();
                target.save_session(session).await.wrap_err_with(|| {
                    format!("migration stopped at session {id}")
                })?;
            }
            info!(total, to = target_kind.as_str(), "session migration complete");
            println!("migrated {total} sessions to {}", target_kind.as_str());
        }
    }

    Ok(())
}

fn write_json<T: serde::Serialize>(file: &PathBuf, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(file, json).wrap_err_with(|| format!("cannot write {}", file.display()))
}

fn read_json<T: serde::de::DeserializeOwned>(file: &PathBuf) -> Result<T> {
    let raw = std::fs::read_to_string(file)
        .wrap_err_with(|| format!("cannot read {}", file.display()))?;
    Ok(serde_json::from_str(&raw)?)
}
