use crate::error::AppError;
use crate::market::types::{Candle, MarketTimeframe};
use futures_util::stream::BoxStream;
use std::future::Future;

/// One frame from the live kline socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    Payload(Vec<u8>),
    /// The peer closed the socket. `None` when no close code was sent.
    Closed { code: Option<u16> },
}

pub type FrameStream = BoxStream<'static, Result<StreamFrame, AppError>>;

/// Everything the live chart needs from the outside world.
pub trait MarketSource: Send + Sync + 'static {
    fn fetch_history(
        &self,
        symbol: &str,
        timeframe: MarketTimeframe,
        limit: u16,
    ) -> impl Future<Output = Result<Vec<Candle>, AppError>> + Send;

    fn fetch_latest_price(
        &self,
        symbol: &str,
        timeframe: MarketTimeframe,
    ) -> impl Future<Output = Result<f64, AppError>> + Send;

    fn connect_stream(
        &self,
        symbol: &str,
        timeframe: MarketTimeframe,
    ) -> impl Future<Output = Result<FrameStream, AppError>> + Send;
}
