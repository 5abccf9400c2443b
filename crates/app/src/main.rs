use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use completion_core::model::{CompletionRecord, UserId};
use services::{AppServices, Clock};

mod cli;
mod render;
mod seed;

use cli::{Cli, Commands, OutputFormat};

const DEFAULT_LOG_FILTER: &str = "progress_report=info,services=info,storage=warn";

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == "sqlite::memory:" || trimmed.starts_with("sqlite://") {
        return trimmed.to_string();
    }

    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> anyhow::Result<()> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let Some(path) = db_url.strip_prefix("sqlite://") else {
        bail!("invalid --db value: {db_url}");
    };
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        bail!("invalid --db value: {db_url}");
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
    }
    Ok(())
}

fn print_record(record: &CompletionRecord) {
    let completed = record
        .time_completed()
        .map_or_else(|| "-".to_string(), |at| at.to_rfc3339());
    println!(
        "activity {} user {}: {} (completed {completed})",
        record.activity_id(),
        record.user_id(),
        record.state()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let clock = cli.now.map_or(Clock::System, Clock::fixed);
    let db_url = normalize_sqlite_url(&cli.db);
    prepare_sqlite_file(&db_url)?;
    let app = AppServices::new_sqlite(&db_url, clock)
        .await
        .with_context(|| format!("failed to open {db_url}"))?;

    match cli.command {
        Commands::InitDb => {
            println!("Schema ready at {db_url}.");
        }
        Commands::Seed => {
            seed::seed(&app, clock).await?;
            println!("Demo course seeded.");
        }
        Commands::Report(args) => {
            let page = app.reports().report(&args.to_request()).await?;
            let mut out = io::stdout().lock();
            match args.format {
                OutputFormat::Table => render::write_table(&mut out, &page)?,
                OutputFormat::Csv => render::write_csv(&mut out, &page)?,
                OutputFormat::Json => render::write_json(&mut out, &page)?,
            }
            out.flush()?;
        }
        Commands::View(target) => {
            let (activity, user) = target.ids();
            print_record(&app.tracking().mark_viewed(activity, user).await?);
        }
        Commands::Complete(target) => {
            let (activity, user) = target.ids();
            print_record(&app.tracking().mark_manual_complete(activity, user).await?);
        }
        Commands::Grade { target, grade } => {
            let (activity, user) = target.ids();
            print_record(&app.tracking().record_grade(activity, user, grade).await?);
        }
        Commands::Override { target, actor } => {
            let (activity, user) = target.ids();
            let record = app
                .tracking()
                .toggle_override(activity, user, UserId::new(actor))
                .await?;
            print_record(&record);
        }
        Commands::Reset { target, actor } => {
            let (activity, user) = target.ids();
            print_record(&app.tracking().reset(activity, user, UserId::new(actor)).await?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_become_absolute_urls() {
        let url = normalize_sqlite_url("data/progress.sqlite3");
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("data/progress.sqlite3"));
        assert_eq!(normalize_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(
            normalize_sqlite_url("sqlite:///tmp/x.db"),
            "sqlite:///tmp/x.db"
        );
    }

    #[test]
    fn memory_database_needs_no_file() {
        assert!(prepare_sqlite_file("sqlite::memory:").is_ok());
        assert!(prepare_sqlite_file("postgres://db").is_err());
    }
}
