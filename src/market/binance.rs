use crate::error::AppError;
use crate::market::source::{FrameStream, MarketSource, StreamFrame};
use crate::market::types::{
    candle_from_row, Candle, KlineRowWire, MarketTimeframe, TickerPriceWire,
};
use futures_util::StreamExt;
use reqwest::{Client, Response};
use tokio_tungstenite::connect_async_with_config;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

pub const BINANCE_STREAM_BASE_URL: &str = "wss://stream.binance.com:9443/ws";
pub const BINANCE_REST_BASE_URL: &str = "https://api.binance.com";

fn kline_stream_endpoint(stream_base_url: &str, symbol: &str, timeframe: MarketTimeframe) -> String {
    format!(
        "{stream_base_url}/{}@kline_{}",
        symbol.to_ascii_lowercase(),
        timeframe.as_str()
    )
}

fn proxy_klines_endpoint(
    api_base_url: &str,
    symbol: &str,
    timeframe: MarketTimeframe,
    limit: u16,
) -> String {
    format!(
        "{api_base_url}/api/klines?symbol={}&interval={}&limit={limit}",
        symbol.to_ascii_uppercase(),
        timeframe.as_str()
    )
}

fn ticker_price_endpoint(rest_base_url: &str, symbol: &str) -> String {
    format!("{rest_base_url}/api/v3/ticker/price?symbol={}", symbol.to_ascii_uppercase())
}

fn trim_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Maps a non-OK response to `Upstream`, keeping the server's `error` text.
pub(crate) async fn check_status(response: Response) -> Result<Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.bytes().await?;
    Err(AppError::upstream(status.as_u16(), &body))
}

/// History goes through the dashboard proxy; the ticker and the socket hit the
/// exchange directly.
#[derive(Debug, Clone)]
pub struct BinanceSource {
    client: Client,
    api_base_url: String,
    rest_base_url: String,
    stream_base_url: String,
}

impl BinanceSource {
    pub fn new(
        client: Client,
        api_base_url: &str,
        rest_base_url: &str,
        stream_base_url: &str,
    ) -> Self {
        Self {
            client,
            api_base_url: trim_base_url(api_base_url),
            rest_base_url: trim_base_url(rest_base_url),
            stream_base_url: trim_base_url(stream_base_url),
        }
    }

    async fn fetch_proxy_rows(
        &self,
        symbol: &str,
        timeframe: MarketTimeframe,
        limit: u16,
    ) -> Result<Vec<Candle>, AppError> {
        let endpoint = proxy_klines_endpoint(&self.api_base_url, symbol, timeframe, limit);
        let response = check_status(self.client.get(endpoint).send().await?).await?;
        let payload = response.json::<Vec<KlineRowWire>>().await?;

        let mut candles = Vec::with_capacity(payload.len());
        for row in payload {
            candles.push(candle_from_row(&row)?);
        }
        Ok(candles)
    }

    async fn fetch_ticker_price(&self, symbol: &str) -> Result<f64, AppError> {
        let endpoint = ticker_price_endpoint(&self.rest_base_url, symbol);
        let response = self.client.get(endpoint).send().await?.error_for_status()?;
        let payload = response.json::<TickerPriceWire>().await?;
        if !payload.symbol.eq_ignore_ascii_case(symbol) {
            return Err(AppError::InvalidArgument(format!(
                "ticker answered for {} instead of {symbol}",
                payload.symbol
            )));
        }

        let price = payload.price.trim().parse::<f64>()?;
        if !price.is_finite() || price <= 0.0 {
            return Err(AppError::InvalidArgument(format!(
                "ticker price for {symbol} is not positive"
            )));
        }
        Ok(price)
    }
}

impl MarketSource for BinanceSource {
    async fn fetch_history(
        &self,
        symbol: &str,
        timeframe: MarketTimeframe,
        limit: u16,
    ) -> Result<Vec<Candle>, AppError> {
        self.fetch_proxy_rows(symbol, timeframe, limit).await
    }

    async fn fetch_latest_price(
        &self,
        symbol: &str,
        timeframe: MarketTimeframe,
    ) -> Result<f64, AppError> {
        match self.fetch_ticker_price(symbol).await {
            Ok(price) => return Ok(price),
            Err(error) => {
                debug!(symbol, %error, "ticker price unavailable, trying kline proxy");
            }
        }

        let candles = self.fetch_proxy_rows(symbol, timeframe, 1).await?;
        candles
            .last()
            .map(|candle| candle.close)
            .ok_or_else(|| AppError::InvalidArgument(format!("no klines returned for {symbol}")))
    }

    async fn connect_stream(
        &self,
        symbol: &str,
        timeframe: MarketTimeframe,
    ) -> Result<FrameStream, AppError> {
        let ws_config = WebSocketConfig {
            max_message_size: Some(16 << 20),
            max_frame_size: Some(4 << 20),
            ..Default::default()
        };

        let request = kline_stream_endpoint(&self.stream_base_url, symbol, timeframe);
        let (stream, _) = connect_async_with_config(request, Some(ws_config), true).await?;

        let frames = stream.filter_map(|message| async move {
            match message {
                Ok(Message::Text(text_payload)) => {
                    Some(Ok(StreamFrame::Payload(text_payload.into_bytes())))
                }
                Ok(Message::Binary(binary_payload)) => Some(Ok(StreamFrame::Payload(binary_payload))),
                Ok(Message::Close(frame)) => Some(Ok(StreamFrame::Closed {
                    code: frame.map(|frame| u16::from(frame.code)),
                })),
                Ok(_) => None,
                Err(error) => {
                    warn!(%error, "kline socket read failed");
                    Some(Err(AppError::from(error)))
                }
            }
        });

        Ok(frames.boxed())
    }
}
