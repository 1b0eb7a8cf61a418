use crate::api::plan::GatedFeature;
use crate::api::{AnalyzeArgs, AnalyzeResponse, StrategyAnalysis};
use crate::db::preferences::{get_preferences, Language};
use crate::error::AppError;
use crate::market::controller::{AppliedOverlay, LiveChartController};
use crate::market::overlay::TradingStyle;
use crate::market::source::MarketSource;
use crate::notifications::Notification;
use crate::report::{format_summary, render_report, render_strategy_table};
use crate::state::AppState;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const STATS_BUNDLE_FILENAME: &str = "user_stats_bundle.zip";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOutcome {
    pub symbol: Option<String>,
    pub language: Language,
    pub report_html: String,
    /// Zip with the full analysis, when the server attached one.
    #[serde(skip)]
    pub bundle: Option<Vec<u8>>,
    pub overlay: Option<AppliedOverlay>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyAnalysisView {
    pub has_data: bool,
    pub summary_html: String,
    pub table_html: String,
    #[serde(skip)]
    pub heatmap_png: Option<Vec<u8>>,
}

impl StrategyAnalysisView {
    pub fn from_analysis(analysis: StrategyAnalysis) -> Self {
        Self {
            has_data: !analysis.is_empty(),
            summary_html: format_summary(analysis.auto_summary.as_deref()),
            table_html: render_strategy_table(&analysis.strategy_stats),
            heatmap_png: analysis.heatmap_png,
        }
    }
}

/// Renders the report and puts the trade levels on the chart when the
/// analysis is for the charted symbol.
pub fn build_outcome<S: MarketSource>(
    chart: &LiveChartController<S>,
    response: &AnalyzeResponse,
    language: Language,
    style: Option<TradingStyle>,
) -> Result<AnalysisOutcome, AppError> {
    let report_html = response
        .report_for(language)
        .map(render_report)
        .unwrap_or_default();
    let bundle = response.decode_bundle()?;
    let overlay = match response.overlay() {
        Some(overlay) => chart.apply_analysis(overlay, style)?,
        None => None,
    };

    Ok(AnalysisOutcome {
        symbol: response.symbol.clone(),
        language,
        report_html,
        bundle,
        overlay,
    })
}

pub async fn run_analysis<S: MarketSource>(
    state: &AppState<S>,
    args: AnalyzeArgs,
) -> Result<AnalysisOutcome, AppError> {
    let preferences = get_preferences(&state.db_pool).await?;
    let request = args.normalize(preferences.language)?;
    let style = TradingStyle::parse_str(&request.trading_type);

    let response = match state.api.analyze(&request).await {
        Ok(response) => response,
        Err(error) => {
            state.chart.notify(Notification::analysis_error(&error));
            return Err(error);
        }
    };

    let outcome = build_outcome(&state.chart, &response, request.language, style)?;
    info!(
        symbol = %request.symbol,
        overlay = outcome.overlay.is_some(),
        bundle = outcome.bundle.is_some(),
        "analysis finished"
    );
    state.chart.notify(Notification::success("Analysis complete"));
    Ok(outcome)
}

pub async fn load_strategy_analysis<S: MarketSource>(
    state: &AppState<S>,
) -> Result<StrategyAnalysisView, AppError> {
    if let Err(error) = state.plan().require(GatedFeature::StrategyAnalysis) {
        state.chart.notify(Notification::analysis_error(&error));
        return Err(error);
    }

    let preferences = get_preferences(&state.db_pool).await?;
    match state.api.strategy_analysis(preferences.language).await {
        Ok(analysis) => Ok(StrategyAnalysisView::from_analysis(analysis)),
        Err(error) => {
            warn!(%error, "strategy analysis failed");
            state.chart.notify(Notification::error(error.to_string()));
            Err(error)
        }
    }
}

pub async fn write_bundle(dir: &Path, filename: &str, bytes: &[u8]) -> Result<PathBuf, AppError> {
    if filename.contains(['/', '\\']) || filename.trim().is_empty() {
        return Err(AppError::InvalidArgument(format!(
            "invalid bundle file name: {filename}"
        )));
    }
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(filename);
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}

/// Saves the user's statistics bundle into the data directory.
pub async fn download_stats<S: MarketSource>(state: &AppState<S>) -> Result<PathBuf, AppError> {
    state.plan().require(GatedFeature::StatsDownload)?;

    let bytes = match state.api.download_stats_bundle().await {
        Ok(bytes) => bytes,
        Err(error) => {
            state
                .chart
                .notify(Notification::error("No data for the report or the download failed"));
            return Err(error);
        }
    };
    let path = write_bundle(&state.config.data_dir, STATS_BUNDLE_FILENAME, &bytes).await?;
    info!(path = %path.display(), size = bytes.len(), "stats bundle saved");
    state.chart.notify(Notification::success("Archive saved"));
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::plan::Plan;
    use crate::commands::live_chart::start_live_chart;
    use crate::commands::testing::app_state;
    use crate::config::Config;
    use crate::market::types::StartLiveChartArgs;
    use std::time::Duration;

    const RESPONSE_BODY: &str = r#"{
        "report_text": "=== BTCUSDT ===\n### Notes\n- entry on retest",
        "symbol": "BTCUSDT",
        "entry_price": 100.0,
        "stop_loss": 95.0,
        "take_profit": 110.0,
        "direction": "long",
        "zip_base64": "UEsDBA=="
    }"#;

    /// Pauses the clock only after the pool is open; sqlx's acquire timeout
    /// runs on tokio time.
    async fn started_state(symbol: &str) -> AppState<crate::commands::testing::QuietSource> {
        let state = app_state(Config::default()).await;
        tokio::time::pause();
        start_live_chart(
            &state,
            Some(StartLiveChartArgs {
                symbol: Some(symbol.to_string()),
                timeframe: None,
            }),
        )
        .await
        .expect("chart starts");
        tokio::time::sleep(Duration::from_millis(10)).await;
        state
    }

    #[tokio::test]
    async fn outcome_renders_report_and_applies_overlay() {
        let state = started_state("BTCUSDT").await;
        let response = AnalyzeResponse::from_body(200, RESPONSE_BODY.as_bytes()).expect("parses");

        let outcome = build_outcome(
            &state.chart,
            &response,
            Language::En,
            Some(TradingStyle::Scalping),
        )
        .expect("outcome builds");

        assert!(outcome.report_html.contains(r#"<ul class="report-list"><li>entry on retest</li></ul>"#));
        assert_eq!(outcome.bundle.as_deref(), Some(&b"PK\x03\x04"[..]));
        let overlay = outcome.overlay.expect("overlay applied");
        assert_eq!(overlay.expires_in_ms, 5 * 60 * 1_000);
        assert!(state.chart.snapshot().overlay.is_some());
    }

    #[tokio::test]
    async fn outcome_for_other_symbol_leaves_chart_alone() {
        let state = started_state("ETHUSDT").await;
        let response = AnalyzeResponse::from_body(200, RESPONSE_BODY.as_bytes()).expect("parses");

        let outcome =
            build_outcome(&state.chart, &response, Language::Ru, None).expect("outcome builds");

        assert!(outcome.overlay.is_none());
        assert!(!outcome.report_html.is_empty());
        assert!(state.chart.snapshot().overlay.is_none());
    }

    #[tokio::test]
    async fn free_plan_cannot_load_strategy_analysis() {
        let state = app_state(Config::default()).await;
        let mut events = state.chart.subscribe();

        let error = load_strategy_analysis(&state)
            .await
            .expect_err("free plan is gated");

        assert!(matches!(error, AppError::PlanRequired { .. }));
        assert!(matches!(
            events.try_recv(),
            Ok(crate::market::controller::ChartEvent::Notification(_))
        ));

        let error = download_stats(&state).await.expect_err("free plan is gated");
        assert!(matches!(error, AppError::PlanRequired { .. }));

        state.set_plan(Plan::Pro);
        assert!(state.plan().allows(GatedFeature::StatsDownload));
    }

    #[test]
    fn strategy_view_uses_placeholders_without_data() {
        let view = StrategyAnalysisView::from_analysis(StrategyAnalysis::default());
        assert!(!view.has_data);
        assert!(view.table_html.starts_with("<p>"));
        assert!(!view.summary_html.is_empty());
    }

    #[tokio::test]
    async fn bundle_names_cannot_escape_the_directory() {
        let dir = std::env::temp_dir().join(format!(
            "signal-desk-bundle-{}",
            std::process::id()
        ));
        let error = write_bundle(&dir, "../evil.zip", b"x")
            .await
            .expect_err("path separators are rejected");
        assert!(matches!(error, AppError::InvalidArgument(_)));

        let path = write_bundle(&dir, "ok.zip", b"PK").await.expect("writes");
        assert_eq!(std::fs::read(&path).expect("readable"), b"PK");
        let _ = std::fs::remove_dir_all(dir);
    }
}
