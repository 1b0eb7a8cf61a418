pub mod api;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod market;
pub mod notifications;
pub mod report;
pub mod state;

use commands::live_chart::start_live_chart;
use config::Config;
use db::initialize_pool;
use error::AppError;
use market::controller::ChartEvent;
use state::AppState;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "signal_desk=info,signal_desk_lib=info";

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    // a second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn log_event(event: &ChartEvent) {
    match event {
        ChartEvent::Notification(notification) => {
            info!(level = ?notification.level, message = %notification.message, "notification");
        }
        ChartEvent::LevelHit { hit, price, .. } => {
            warn!(?hit, price, "analysis level hit");
        }
        ChartEvent::Status(status) => {
            info!(
                state = ?status.state,
                socket = ?status.socket,
                candles = status.candles,
                reason = status.reason.as_deref().unwrap_or(""),
                "chart status"
            );
        }
        other => match serde_json::to_string(other) {
            Ok(payload) => debug!(event = other.name(), %payload, "chart event"),
            Err(error) => warn!(event = other.name(), %error, "chart event not serializable"),
        },
    }
}

async fn run_headless(config: Config) -> Result<(), AppError> {
    let db_pool = initialize_pool(&config).await?;
    info!(db = %config.db_path().display(), api = %config.dashboard_api_url, "database ready");

    let state = AppState::new(config, db_pool)?;
    state.refresh_plan().await;

    let mut events = state.chart.subscribe();
    state.chart.on_tick(|tick| {
        debug!(symbol = %tick.symbol, price = tick.price, change = ?tick.change, "tick");
    });
    let session = start_live_chart(&state, None).await?;
    info!(symbol = %session.symbol, timeframe = session.timeframe.as_str(), "live chart running");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("shutdown signal received");
                break;
            }
            received = events.recv() => match received {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event log fell behind"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    let stopped = state.chart.disconnect().await;
    info!(stopped = stopped.stopped, "live chart stopped");
    state.db_pool.close().await;
    Ok(())
}

/// Loads `.env` and the configuration, then runs the live chart until Ctrl-C.
pub fn run() -> Result<(), AppError> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = Config::from_env()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_headless(config))
}
