use crate::api::plan::Plan;
use crate::market::feed::FeedState;
use crate::market::source::MarketSource;
use crate::state::AppState;
use serde::Serialize;
use sqlx::SqlitePool;
use std::time::Instant;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_ms: u128,
    pub db: &'static str,
    pub feed: FeedState,
    pub plan: Plan,
}

pub async fn build_health_response(
    started_at: Instant,
    pool: &SqlitePool,
    feed: FeedState,
    plan: Plan,
) -> HealthResponse {
    let db_status = match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(pool)
        .await
    {
        Ok(_) => "ok",
        Err(_) => "error",
    };

    HealthResponse {
        status: "ok",
        uptime_ms: started_at.elapsed().as_millis(),
        db: db_status,
        feed,
        plan,
    }
}

pub async fn health<S: MarketSource>(state: &AppState<S>) -> HealthResponse {
    build_health_response(
        state.started_at,
        &state.db_pool,
        state.chart.status().state,
        state.plan(),
    )
    .await
}
