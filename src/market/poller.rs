use crate::market::controller::FeedContext;
use crate::market::source::MarketSource;
use crate::market::types::MarketTimeframe;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Keeps the last candle moving while the socket is down. Only writes while
/// the feed is degraded and stops itself as soon as it is not.
pub(crate) async fn run_fallback_poller<S: MarketSource>(
    context: FeedContext<S>,
    symbol: String,
    timeframe: MarketTimeframe,
    generation: u64,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(context.settings.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let still_degraded = {
            let state = context.shared.lock();
            state.accepts(generation) && state.feed.polling_enabled()
        };
        if !still_degraded {
            break;
        }

        let price = tokio::select! {
            _ = cancel_token.cancelled() => break,
            result = context.source.fetch_latest_price(&symbol, timeframe) => result,
        };

        match price {
            Ok(price) => {
                if !context.apply_fallback_price(generation, price) {
                    break;
                }
            }
            Err(error) => {
                debug!(symbol = %symbol, generation, %error, "fallback price unavailable");
            }
        }
    }

    cancel_token.cancel();
    info!(symbol = %symbol, generation, "fallback polling stopped");
}
