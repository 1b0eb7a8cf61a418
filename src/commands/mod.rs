pub mod analysis;
pub mod health;
pub mod live_chart;
pub mod preferences;

#[cfg(test)]
pub(crate) mod testing {
    use crate::api::DashboardApi;
    use crate::config::Config;
    use crate::db::initialize_memory_pool;
    use crate::error::AppError;
    use crate::market::source::{FrameStream, MarketSource};
    use crate::market::types::{Candle, MarketTimeframe};
    use crate::state::AppState;
    use futures_util::StreamExt;

    /// Serves a fixed history and a socket that never sends anything.
    pub(crate) struct QuietSource {
        pub candles: Vec<Candle>,
    }

    impl MarketSource for QuietSource {
        async fn fetch_history(
            &self,
            _symbol: &str,
            _timeframe: MarketTimeframe,
            _limit: u16,
        ) -> Result<Vec<Candle>, AppError> {
            Ok(self.candles.clone())
        }

        async fn fetch_latest_price(
            &self,
            _symbol: &str,
            _timeframe: MarketTimeframe,
        ) -> Result<f64, AppError> {
            Err(AppError::NotRunning)
        }

        async fn connect_stream(
            &self,
            _symbol: &str,
            _timeframe: MarketTimeframe,
        ) -> Result<FrameStream, AppError> {
            Ok(futures_util::stream::pending().boxed())
        }
    }

    pub(crate) fn candles(count: i64) -> Vec<Candle> {
        (1..=count)
            .map(|index| Candle {
                open_time: index * 60_000,
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0 + index as f64,
                volume: 1.0,
            })
            .collect()
    }

    pub(crate) async fn app_state(config: Config) -> AppState<QuietSource> {
        let pool = initialize_memory_pool().await.expect("memory pool");
        // port 9 (discard): tests must not depend on the dashboard being up
        let api = DashboardApi::new(reqwest::Client::new(), "http://127.0.0.1:9");
        AppState::with_source(config, pool, api, QuietSource { candles: candles(3) })
    }
}
