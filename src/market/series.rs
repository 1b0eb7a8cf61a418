use crate::market::labels::candle_label;
use crate::market::types::{Candle, KlineEvent, MarketTimeframe};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    pub open_time: i64,
    pub label: String,
    pub close: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Ohlc {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesUpdate {
    /// The in-progress candle was rewritten in place.
    Replaced,
    Appended { evicted: bool },
    /// The message belongs to a candle older than the last one on the chart.
    Stale,
}

/// Close-price series and its OHLC twin. Both deques always have the same
/// length and index `i` of each describes the same candle.
#[derive(Debug, Clone)]
pub struct ChartSeries {
    prices: VecDeque<PricePoint>,
    ohlc: VecDeque<Ohlc>,
    limit: usize,
    timeframe: MarketTimeframe,
}

impl ChartSeries {
    pub fn new(limit: u16, timeframe: MarketTimeframe) -> Self {
        let limit = usize::from(limit.max(1));
        Self {
            prices: VecDeque::with_capacity(limit + 1),
            ohlc: VecDeque::with_capacity(limit + 1),
            limit,
            timeframe,
        }
    }

    pub fn reset(&mut self, limit: u16, timeframe: MarketTimeframe) {
        *self = Self::new(limit, timeframe);
    }

    pub fn clear(&mut self) {
        self.prices.clear();
        self.ohlc.clear();
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn timeframe(&self) -> MarketTimeframe {
        self.timeframe
    }

    pub fn last_close(&self) -> Option<f64> {
        self.prices.back().map(|point| point.close)
    }

    pub fn last_entry(&self) -> Option<(&PricePoint, &Ohlc)> {
        self.prices.back().zip(self.ohlc.back())
    }

    pub fn points(&self) -> impl Iterator<Item = &PricePoint> {
        self.prices.iter()
    }

    pub fn ohlc(&self) -> impl Iterator<Item = &Ohlc> {
        self.ohlc.iter()
    }

    pub fn labels(&self) -> Vec<String> {
        self.prices.iter().map(|point| point.label.clone()).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.prices.iter().map(|point| point.close).collect()
    }

    /// Replaces the whole series with a REST history window.
    pub fn replace_with_history(&mut self, candles: &[Candle]) {
        let mut ordered: Vec<&Candle> = candles.iter().collect();
        ordered.sort_by_key(|candle| candle.open_time);
        ordered.dedup_by_key(|candle| candle.open_time);
        let skip = ordered.len().saturating_sub(self.limit);

        self.clear();
        for candle in ordered.into_iter().skip(skip) {
            self.push(
                candle.open_time,
                Ohlc {
                    open: candle.open,
                    high: candle.high,
                    low: candle.low,
                    close: candle.close,
                },
            );
        }
    }

    pub fn apply_kline(&mut self, kline: &KlineEvent) -> SeriesUpdate {
        let last_open_time = self.prices.back().map(|point| point.open_time);

        match last_open_time {
            Some(last) if kline.open_time < last => SeriesUpdate::Stale,
            Some(last) if kline.open_time == last => {
                if let Some(point) = self.prices.back_mut() {
                    point.close = kline.close;
                }
                if let Some(bar) = self.ohlc.back_mut() {
                    bar.high = bar.high.max(kline.high);
                    bar.low = bar.low.min(kline.low);
                    bar.close = kline.close;
                }
                SeriesUpdate::Replaced
            }
            _ => {
                self.push(
                    kline.open_time,
                    Ohlc {
                        open: kline.open,
                        high: kline.high,
                        low: kline.low,
                        close: kline.close,
                    },
                );
                let evicted = self.trim();
                SeriesUpdate::Appended { evicted }
            }
        }
    }

    /// Fallback polling only knows the latest price, so it can only touch the
    /// last candle. Returns `false` when there is nothing to overwrite.
    pub fn overwrite_last_close(&mut self, price: f64) -> bool {
        let (Some(point), Some(bar)) = (self.prices.back_mut(), self.ohlc.back_mut()) else {
            return false;
        };

        point.close = price;
        bar.close = price;
        bar.high = bar.high.max(price);
        bar.low = bar.low.min(price);
        true
    }

    fn push(&mut self, open_time: i64, bar: Ohlc) {
        self.prices.push_back(PricePoint {
            open_time,
            label: candle_label(open_time, self.timeframe),
            close: bar.close,
        });
        self.ohlc.push_back(bar);
    }

    fn trim(&mut self) -> bool {
        let mut evicted = false;
        while self.prices.len() > self.limit {
            self.prices.pop_front();
            self.ohlc.pop_front();
            evicted = true;
        }
        evicted
    }
}
