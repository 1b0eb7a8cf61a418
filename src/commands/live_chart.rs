use crate::error::AppError;
use crate::market::controller::ChartSnapshot;
use crate::market::overlay::TradingStyle;
use crate::market::source::MarketSource;
use crate::market::types::{
    LiveChartSession, LiveChartStatusSnapshot, LiveChartStopResult, StartLiveChartArgs,
};
use crate::state::AppState;

/// Missing fields fall back to the configured default pair.
pub async fn start_live_chart<S: MarketSource>(
    state: &AppState<S>,
    args: Option<StartLiveChartArgs>,
) -> Result<LiveChartSession, AppError> {
    let args = args.unwrap_or_default();
    let config = StartLiveChartArgs {
        symbol: args
            .symbol
            .or_else(|| Some(state.config.default_symbol.clone())),
        timeframe: args.timeframe.or(Some(state.config.default_timeframe)),
    }
    .normalize()?;

    state.chart.connect(config).await
}

pub async fn stop_live_chart<S: MarketSource>(state: &AppState<S>) -> LiveChartStopResult {
    state.chart.disconnect().await
}

pub fn live_chart_status<S: MarketSource>(state: &AppState<S>) -> LiveChartStatusSnapshot {
    state.chart.status()
}

pub fn live_chart_snapshot<S: MarketSource>(state: &AppState<S>) -> ChartSnapshot {
    state.chart.snapshot()
}

/// Switches the chart to the timeframe recommended for `style`, keeping the
/// current symbol.
pub async fn apply_trading_style<S: MarketSource>(
    state: &AppState<S>,
    style: &str,
) -> Result<LiveChartSession, AppError> {
    let style = TradingStyle::parse_str(style)
        .ok_or_else(|| AppError::InvalidArgument(format!("unknown trading style: {style}")))?;
    let symbol = state.chart.status().symbol;

    start_live_chart(
        state,
        Some(StartLiveChartArgs {
            symbol,
            timeframe: Some(style.recommended_timeframe()),
        }),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::app_state;
    use crate::config::Config;
    use crate::market::feed::FeedState;
    use crate::market::types::MarketTimeframe;
    use std::time::Duration;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn start_uses_configured_defaults() {
        let state = app_state(Config {
            default_symbol: "ETHUSDT".to_string(),
            default_timeframe: MarketTimeframe::M15,
            ..Config::default()
        })
        .await;
        tokio::time::pause();

        let session = start_live_chart(&state, None).await.expect("chart starts");
        settle().await;

        assert_eq!(session.symbol, "ETHUSDT");
        assert_eq!(session.timeframe, MarketTimeframe::M15);
        assert_eq!(live_chart_status(&state).state, FeedState::Live);
        assert_eq!(live_chart_snapshot(&state).points.len(), 3);
    }

    #[tokio::test]
    async fn trading_style_switches_timeframe_and_keeps_symbol() {
        let state = app_state(Config::default()).await;
        tokio::time::pause();
        start_live_chart(
            &state,
            Some(StartLiveChartArgs {
                symbol: Some("solusdt".to_string()),
                timeframe: None,
            }),
        )
        .await
        .expect("chart starts");
        settle().await;

        let session = apply_trading_style(&state, "swing")
            .await
            .expect("style applies");

        assert_eq!(session.symbol, "SOLUSDT");
        assert_eq!(session.timeframe, MarketTimeframe::H4);

        let error = apply_trading_style(&state, "hodl")
            .await
            .expect_err("unknown style");
        assert!(matches!(error, AppError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn stop_keeps_candles() {
        let state = app_state(Config::default()).await;
        tokio::time::pause();
        start_live_chart(&state, None).await.expect("chart starts");
        settle().await;

        assert!(stop_live_chart(&state).await.stopped);
        assert_eq!(live_chart_status(&state).state, FeedState::Disconnected);
        assert_eq!(live_chart_snapshot(&state).points.len(), 3);
        assert!(!stop_live_chart(&state).await.stopped);
    }
}
