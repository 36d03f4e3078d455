use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tradelog::api::{create_router, AppState};
use tradelog::cache::{human_age, CacheStore};
use tradelog::config::Config;
use tradelog::db::{Database, LibSqlPersistence, Persistence};
use tradelog::fetch::{HttpTransport, WindowedFetcher};
use tradelog::models::{fallback_name, Counterparty, PlayerRecord, TradeDirection};
use tradelog::services::{
    export_file_name, BackupService, ExportFormat, PlayerView, RefreshOverrides, TrackerService,
};

#[derive(Parser)]
#[command(name = "tradelog")]
#[command(about = "Track trade history per counterparty from the Torn activity log")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve,
    /// Fetch fresh stats for a counterparty
    Refresh {
        #[arg(required_unless_present = "title")]
        id: Option<String>,
        /// Profile page title or URL to take the id and name from
        #[arg(long, conflicts_with = "id")]
        title: Option<String>,
        #[arg(long)]
        name: Option<String>,
        /// Years of history to sweep (1-5)
        #[arg(long)]
        years: Option<u32>,
        /// Disable matching by display name
        #[arg(long)]
        no_name_fallback: bool,
    },
    /// Show a counterparty, refreshing when stale
    Show {
        #[arg(required_unless_present = "title")]
        id: Option<String>,
        /// Profile page title or URL to take the id and name from
        #[arg(long, conflicts_with = "id")]
        title: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Log a trade by hand
    Log {
        id: String,
        #[arg(value_enum)]
        dir: TradeDirection,
        /// When the trade happened (RFC 3339); defaults to now
        #[arg(long)]
        at: Option<chrono::DateTime<chrono::Utc>>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Remove the most recently logged manual trade
    Undo { id: String },
    /// List every tracked counterparty
    List,
    /// Mark a counterparty, or clear the mark with --off
    Mark {
        id: String,
        #[arg(long)]
        off: bool,
    },
    /// Replace the notes of a counterparty
    Note { id: String, text: String },
    /// Export the store
    Export {
        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
        /// Output file; `-` writes to stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Merge a previously exported JSON store
    Import { file: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tradelog=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env();

    if !config.tracker.has_credential() {
        tracing::warn!("TRADELOG_API_KEY is not set; refreshes are disabled");
    }

    tracing::info!("Initializing database...");
    let db = Database::new(&config.database).await?;
    let persistence: Arc<dyn Persistence> = Arc::new(LibSqlPersistence::new(db.clone()));
    let cache = Arc::new(CacheStore::open(persistence).await?);

    let transport = Arc::new(HttpTransport::new(config.fetch.request_timeout_secs)?);
    let fetcher = WindowedFetcher::new(
        transport,
        config.fetch.clone(),
        config.tracker.api_key.clone(),
    );

    let result = match args.command {
        Command::Serve => serve(config, cache.clone(), fetcher).await,
        command => {
            let tracker = TrackerService::new(cache.clone(), fetcher, config.tracker.clone());
            let backup = BackupService::new(cache.clone());
            run_command(command, &tracker, &backup).await
        }
    };

    cache.shutdown();
    db.sync().await?;
    result
}

async fn serve(config: Config, cache: Arc<CacheStore>, fetcher: WindowedFetcher) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config, cache.clone(), fetcher);
    let app = create_router(state);

    let cancel_token = CancellationToken::new();

    let token = cancel_token.child_token();
    let rechecks = cache.clone();
    tokio::spawn(async move {
        token.cancelled().await;
        tracing::info!("Cancelling pending re-verifications...");
        rechecks.shutdown();
    });

    tracing::info!("Tradelog starting on http://{}", addr);
    tracing::info!("  Health check: http://{}/api/v1/health", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel_token))
        .await?;

    Ok(())
}

async fn run_command(
    command: Command,
    tracker: &TrackerService,
    backup: &BackupService,
) -> anyhow::Result<()> {
    match command {
        Command::Serve => anyhow::bail!("serve is not a one-shot command"),
        Command::Refresh {
            id,
            title,
            name,
            years,
            no_name_fallback,
        } => {
            let (id, name) = resolve_target(id, title.as_deref(), name)?;
            let overrides = RefreshOverrides {
                history_years: years,
                name_fallback: no_name_fallback.then_some(false),
            };
            let record = tracker.refresh(Some(&id), name.as_deref(), overrides).await?;
            print_record(&record);
        }
        Command::Show { id, title, name } => {
            let (id, name) = resolve_target(id, title.as_deref(), name)?;
            let view = tracker.view(&id, name.as_deref()).await?;
            print_view(&view);
        }
        Command::Log { id, dir, at, name } => {
            let record = tracker.log_entry(&id, name.as_deref(), dir, at).await?;
            print_record(&record);
        }
        Command::Undo { id } => {
            let record = tracker.undo_entry(&id).await?;
            print_record(&record);
        }
        Command::List => {
            let records = tracker.list().await;
            if records.is_empty() {
                println!("No tracked players.");
            }
            for record in &records {
                let count = record.stats.as_ref().map_or(0, |s| s.count);
                let mark = if record.marked { "*" } else { " " };
                println!("{mark} {:>10}  {:<30}  {count:>5} trades", record.id, record.name);
            }
        }
        Command::Mark { id, off } => {
            let record = tracker.set_marked(&id, Some(!off)).await?;
            print_record(&record);
        }
        Command::Note { id, text } => {
            let record = tracker.set_notes(&id, &text).await?;
            print_record(&record);
        }
        Command::Export { format, out } => {
            let body = backup.export(format).await?;
            let path = out.unwrap_or_else(|| PathBuf::from(export_file_name(format, chrono::Utc::now())));
            if path.as_os_str() == "-" {
                println!("{body}");
            } else {
                std::fs::write(&path, body)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("Exported to {}", path.display());
            }
        }
        Command::Import { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let summary = backup.import_json(&text).await?;
            println!(
                "Merged {} players ({} new), {} tracked",
                summary.received, summary.created, summary.total
            );
        }
    }
    Ok(())
}

/// Take the id from the command line, or discover it in a page title. An
/// explicit `--name` beats the one found in the title.
fn resolve_target(
    id: Option<String>,
    title: Option<&str>,
    name: Option<String>,
) -> anyhow::Result<(String, Option<String>)> {
    let Some(title) = title else {
        let id = id.context("a counterparty id or --title is required")?;
        return Ok((id, name));
    };

    let found = Counterparty::from_title(title)
        .with_context(|| format!("no counterparty id found in '{title}'"))?;
    let discovered = (found.name != fallback_name(&found.id)).then_some(found.name);
    Ok((found.id, name.or(discovered)))
}

fn print_record(record: &PlayerRecord) {
    println!("{} [{}]{}", record.name, record.id, if record.marked { "  (marked)" } else { "" });
    match &record.stats {
        Some(stats) => {
            let fmt = |t: Option<chrono::DateTime<chrono::Utc>>| {
                t.map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d").to_string())
            };
            println!("  trades:  {}", stats.count);
            println!("  first:   {}", fmt(stats.first_timestamp));
            println!("  last:    {}", fmt(stats.last_timestamp));
            println!(
                "  window:  {} years, synced {} ago",
                stats.window_years,
                human_age(stats.fetched_at, chrono::Utc::now())
            );
        }
        None => println!("  no stats yet"),
    }
    if !record.entries.is_empty() {
        let manual = record.manual_summary();
        println!(
            "  manual:  {} logged ({} as buyer, {} as seller)",
            manual.count, manual.buys, manual.sells
        );
    }
    if !record.notes.is_empty() {
        println!("  notes:   {}", record.notes.replace('\n', "\n           "));
    }
}

fn print_view(view: &PlayerView) {
    print_record(&view.record);
    let stale = if view.stale { " (stale)" } else { "" };
    println!("  source:  {}{stale}", view.source.as_str());
    if let Some(error) = &view.refresh_error {
        println!("  refresh failed: {error}");
    }
}

async fn shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    cancel_token.cancel();
}
