// Quiz server entry point.
//
// Startup sequence:
// 1. Initialize tracing
// 2. Load config (defaults, .env, environment overrides)
// 3. Open the database
// 4. Load the ARD bank and build the LLM client
// 5. Spawn the realtime WebSocket feed
// 6. Serve the HTTP API until the process is stopped

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use quizsync_core::clock::{Clock, SystemClock};
use quizsync_core::db::Database;
use quizsync_core::store::TableStore;
use quizsync_llm::LlmClient;
use quizsync_server::ard::ArdBank;
use quizsync_server::config;
use quizsync_server::http::{self, AppState};
use quizsync_server::quiz::QuizGenerator;
use quizsync_server::ws_server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    info!("quizsync starting up");

    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: http port {}, realtime port {}, model {}",
        config.server.port, config.realtime_port, config.llm.model
    );

    let db = Database::open(&config.db_path).context("failed to open database")?;
    info!("Database opened at {}", config.db_path);
    let store: Arc<dyn TableStore> = Arc::new(db);

    let bank = match &config.quiz.ard_bank_path {
        Some(path) => ArdBank::load(Path::new(path)).context("failed to load ARD bank")?,
        None => ArdBank::bundled().context("bundled ARD bank is invalid")?,
    };
    info!("ARD bank ready with {} questions", bank.len());

    let llm = LlmClient::from_settings(&config.chat_settings());
    if llm.is_active() {
        info!("LLM client initialized (API key configured)");
    } else {
        warn!("LLM client disabled (no GROQ_API_KEY); only ARD quizzes will succeed");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = AppState {
        store: store.clone(),
        quiz: Arc::new(QuizGenerator::new(bank, Arc::new(llm), clock.clone())),
        clock,
    };

    let ws_addr = format!("{}:{}", config.server.host, config.realtime_port);
    let ws_listener = TcpListener::bind(&ws_addr)
        .await
        .with_context(|| format!("failed to bind realtime feed on {ws_addr}"))?;
    let ws_handle = tokio::spawn(async move {
        if let Err(e) = ws_server::serve(ws_listener, store).await {
            error!("Realtime feed error: {e:#}");
        }
    });

    let http_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("failed to bind HTTP server on {http_addr}"))?;
    info!("HTTP API listening on http://{http_addr}");

    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    ws_handle.abort();
    info!("quizsync shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for Ctrl+C: {e}");
    }
    info!("shutdown requested");
}

/// Log to stdout, filtered by `RUST_LOG` when set.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("quizsync_server=info,quizsync_core=info,quizsync_llm=info,tower_http=info,warn")
        }))
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
