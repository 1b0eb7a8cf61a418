use crate::api::plan::Plan;
use crate::api::DashboardApi;
use crate::config::Config;
use crate::error::AppError;
use crate::market::binance::BinanceSource;
use crate::market::controller::LiveChartController;
use crate::market::source::MarketSource;
use parking_lot::RwLock;
use reqwest::Client;
use sqlx::SqlitePool;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct AppState<S: MarketSource = BinanceSource> {
    pub started_at: Instant,
    pub db_pool: SqlitePool,
    pub config: Config,
    pub api: DashboardApi,
    pub chart: LiveChartController<S>,
    plan: RwLock<Plan>,
}

impl AppState<BinanceSource> {
    pub fn new(config: Config, db_pool: SqlitePool) -> Result<Self, AppError> {
        let client = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        let source = BinanceSource::new(
            client.clone(),
            &config.dashboard_api_url,
            &config.exchange_rest_url,
            &config.exchange_stream_url,
        );
        let api = DashboardApi::new(client, &config.dashboard_api_url);
        Ok(Self::with_source(config, db_pool, api, source))
    }
}

impl<S: MarketSource> AppState<S> {
    pub fn with_source(config: Config, db_pool: SqlitePool, api: DashboardApi, source: S) -> Self {
        let chart = LiveChartController::new(source, config.feed_settings());
        Self {
            started_at: Instant::now(),
            db_pool,
            config,
            api,
            chart,
            plan: RwLock::new(Plan::Free),
        }
    }

    pub fn plan(&self) -> Plan {
        *self.plan.read()
    }

    pub fn set_plan(&self, plan: Plan) {
        *self.plan.write() = plan;
    }

    /// Asks the dashboard for the user's plan. Failures keep the last known
    /// plan, so gated features stay closed until a refresh succeeds.
    pub async fn refresh_plan(&self) -> Plan {
        match self.api.user_info().await {
            Ok(plan) => {
                info!(plan = plan.as_str(), "user plan loaded");
                self.set_plan(plan);
                plan
            }
            Err(error) => {
                let plan = self.plan();
                warn!(%error, plan = plan.as_str(), "could not load user plan");
                plan
            }
        }
    }
}
