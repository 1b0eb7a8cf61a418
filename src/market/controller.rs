use crate::error::AppError;
use crate::market::feed::{FeedEvent, FeedState, SocketPhase};
use crate::market::labels::now_unix_ms;
use crate::market::overlay::{
    overlay_duration, ActiveOverlay, AnalysisOverlay, LevelHit, OverlayLines, TradingStyle,
};
use crate::market::poller::run_fallback_poller;
use crate::market::series::{ChartSeries, Ohlc, PricePoint, SeriesUpdate};
use crate::market::source::{FrameStream, MarketSource, StreamFrame};
use crate::market::types::{
    parse_kline_payload, LiveChartConfig, LiveChartSession, LiveChartStatusSnapshot,
    LiveChartStopResult, MarketTimeframe, PriceTick, TickSource, DEFAULT_TIMEFRAME,
};
use crate::notifications::Notification;
use futures_util::StreamExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    CANDLE_UPDATE_EVENT, CHART_STATUS_EVENT, HISTORY_LOADED_EVENT, LEVEL_HIT_EVENT,
    NOTIFICATION_EVENT, OVERLAY_APPLIED_EVENT, OVERLAY_CLEARED_EVENT, PRICE_UPDATE_EVENT,
    TRAILING_STOP_EVENT,
};

pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
const EVENT_CHANNEL_CAPACITY: usize = 1_024;
const NORMAL_CLOSE_CODE: u16 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedSettings {
    pub reconnect_delay: Duration,
    pub poll_interval: Duration,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

pub type TickHandler = Arc<dyn Fn(&PriceTick) + Send + Sync>;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverlayClearReason {
    Expired,
    ChartReset,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum ChartEvent {
    Status(LiveChartStatusSnapshot),
    #[serde(rename_all = "camelCase")]
    HistoryLoaded {
        generation: u64,
        symbol: String,
        timeframe: MarketTimeframe,
        candles: usize,
    },
    #[serde(rename_all = "camelCase")]
    CandleUpdate {
        generation: u64,
        point: PricePoint,
        ohlc: Ohlc,
        appended: bool,
    },
    Tick(PriceTick),
    #[serde(rename_all = "camelCase")]
    TrailingStopMoved { overlay_id: u64, stop: f64 },
    #[serde(rename_all = "camelCase")]
    LevelHit {
        overlay_id: u64,
        hit: LevelHit,
        price: f64,
    },
    Notification(Notification),
    #[serde(rename_all = "camelCase")]
    OverlayApplied { overlay_id: u64, lines: OverlayLines },
    #[serde(rename_all = "camelCase")]
    OverlayCleared {
        overlay_id: u64,
        reason: OverlayClearReason,
    },
}

impl ChartEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Status(_) => CHART_STATUS_EVENT,
            Self::HistoryLoaded { .. } => HISTORY_LOADED_EVENT,
            Self::CandleUpdate { .. } => CANDLE_UPDATE_EVENT,
            Self::Tick(_) => PRICE_UPDATE_EVENT,
            Self::TrailingStopMoved { .. } => TRAILING_STOP_EVENT,
            Self::LevelHit { .. } => LEVEL_HIT_EVENT,
            Self::Notification(_) => NOTIFICATION_EVENT,
            Self::OverlayApplied { .. } => OVERLAY_APPLIED_EVENT,
            Self::OverlayCleared { .. } => OVERLAY_CLEARED_EVENT,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSnapshot {
    pub status: LiveChartStatusSnapshot,
    pub points: Vec<PricePoint>,
    pub ohlc: Vec<Ohlc>,
    pub overlay: Option<OverlayLines>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedOverlay {
    pub overlay_id: u64,
    pub lines: OverlayLines,
    pub expires_in_ms: u64,
}

/// Everything the feed task, the poller and the overlay timer mutate. Every
/// writer re-checks its captured generation under the lock first.
#[derive(Debug)]
pub(crate) struct ChartState {
    generation: u64,
    symbol: Option<String>,
    timeframe: MarketTimeframe,
    series: ChartSeries,
    pub(crate) feed: FeedState,
    socket: SocketPhase,
    manually_stopped: bool,
    last_price: Option<f64>,
    overlay: Option<ActiveOverlay>,
    overlay_seq: u64,
    overlay_timer: Option<CancellationToken>,
    poller: Option<CancellationToken>,
    feed_token: Option<CancellationToken>,
    reason: Option<String>,
}

impl ChartState {
    fn new() -> Self {
        Self {
            generation: 0,
            symbol: None,
            timeframe: DEFAULT_TIMEFRAME,
            series: ChartSeries::new(DEFAULT_TIMEFRAME.history_limit(), DEFAULT_TIMEFRAME),
            feed: FeedState::Disconnected,
            socket: SocketPhase::Idle,
            manually_stopped: false,
            last_price: None,
            overlay: None,
            overlay_seq: 0,
            overlay_timer: None,
            poller: None,
            feed_token: None,
            reason: Some("chart idle".to_string()),
        }
    }

    /// Whether a handler started for `generation` may still write.
    pub(crate) fn accepts(&self, generation: u64) -> bool {
        self.generation == generation && !self.manually_stopped
    }

    fn apply_feed_event(&mut self, event: FeedEvent) {
        match self.feed.next(event) {
            Some(next) => {
                if next != self.feed {
                    info!(
                        symbol = self.symbol.as_deref().unwrap_or_default(),
                        generation = self.generation,
                        from = ?self.feed,
                        to = ?next,
                        "feed state changed"
                    );
                }
                self.feed = next;
            }
            None => debug!(state = ?self.feed, ?event, "feed event ignored"),
        }
    }

    fn advance_socket(&mut self, next: SocketPhase) {
        if self.socket.can_enter(next) {
            self.socket = next;
        } else {
            debug!(from = ?self.socket, to = ?next, "socket phase change ignored");
        }
    }

    fn release_socket(&mut self, failed: bool) {
        let via = match (self.socket, failed) {
            (SocketPhase::Idle, _) => return,
            (SocketPhase::Open, false) => Some(SocketPhase::Closing),
            (SocketPhase::Open | SocketPhase::Connecting, _) => Some(SocketPhase::Error),
            (SocketPhase::Closing | SocketPhase::Error, _) => None,
        };
        if let Some(phase) = via {
            self.advance_socket(phase);
        }
        self.advance_socket(SocketPhase::Idle);
    }

    fn stop_poller(&mut self) {
        if let Some(token) = self.poller.take() {
            token.cancel();
        }
    }

    fn stop_overlay_timer(&mut self) {
        if let Some(token) = self.overlay_timer.take() {
            token.cancel();
        }
    }

    /// Manual-stop semantics: no reconnect, no polling, series kept.
    fn halt(&mut self, reason: String) {
        self.manually_stopped = true;
        self.apply_feed_event(FeedEvent::Stop);
        self.release_socket(false);
        self.stop_poller();
        if let Some(token) = self.feed_token.take() {
            token.cancel();
        }
        self.reason = Some(reason);
    }

    fn status(&self) -> LiveChartStatusSnapshot {
        LiveChartStatusSnapshot {
            state: self.feed,
            socket: self.socket,
            symbol: self.symbol.clone(),
            timeframe: self.timeframe,
            generation: self.generation,
            candles: self.series.len(),
            last_price: self.last_price,
            reason: self.reason.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct TickOutcome {
    tick: Option<PriceTick>,
    candle: Option<(PricePoint, Ohlc, bool)>,
    stop_moved: Option<(u64, f64)>,
    hit: Option<(u64, LevelHit, f64)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PayloadDirective {
    Continue,
    /// The handler's generation is gone; the socket must be dropped.
    Stale,
    Halted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum StreamEnd {
    Cancelled,
    Stale,
    Halted,
    NormalClose,
    Failed(String),
}

pub(crate) struct FeedContext<S> {
    pub(crate) source: Arc<S>,
    pub(crate) shared: Arc<Mutex<ChartState>>,
    events: broadcast::Sender<ChartEvent>,
    tick_handlers: Arc<RwLock<Vec<TickHandler>>>,
    pub(crate) settings: FeedSettings,
}

impl<S> Clone for FeedContext<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            shared: Arc::clone(&self.shared),
            events: self.events.clone(),
            tick_handlers: Arc::clone(&self.tick_handlers),
            settings: self.settings,
        }
    }
}

impl<S: MarketSource> FeedContext<S> {
    fn emit(&self, event: ChartEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn publish_status(&self) {
        let snapshot = self.shared.lock().status();
        self.emit(ChartEvent::Status(snapshot));
    }

    fn dispatch(&self, generation: u64, outcome: TickOutcome) {
        if let Some((point, ohlc, appended)) = outcome.candle {
            self.emit(ChartEvent::CandleUpdate {
                generation,
                point,
                ohlc,
                appended,
            });
        }

        if let Some(tick) = outcome.tick {
            let handlers = self.tick_handlers.read().clone();
            for handler in &handlers {
                handler(&tick);
            }
            self.emit(ChartEvent::Tick(tick));
        }

        if let Some((overlay_id, stop)) = outcome.stop_moved {
            debug!(overlay_id, stop, "trailing stop moved");
            self.emit(ChartEvent::TrailingStopMoved { overlay_id, stop });
        }

        if let Some((overlay_id, hit, price)) = outcome.hit {
            info!(overlay_id, ?hit, price, "signal level reached, live feed halted");
            self.emit(ChartEvent::LevelHit {
                overlay_id,
                hit,
                price,
            });
            self.emit(ChartEvent::Notification(Notification::level_hit(hit, price)));
            self.publish_status();
        }
    }

    fn record_price(state: &mut ChartState, price: f64, source: TickSource) -> TickOutcome {
        let previous = state.last_price.replace(price);
        let symbol = state.symbol.clone().unwrap_or_default();
        let mut outcome = TickOutcome {
            tick: Some(PriceTick::new(symbol, price, previous, source, now_unix_ms())),
            ..TickOutcome::default()
        };

        if let Some(active) = state.overlay.as_mut() {
            let overlay_tick = active.on_price(price);
            let overlay_id = active.id;
            outcome.stop_moved = overlay_tick.stop_moved.map(|stop| (overlay_id, stop));
            outcome.hit = overlay_tick.hit.map(|hit| (overlay_id, hit, price));
        }

        if let Some((_, hit, _)) = outcome.hit {
            state.halt(format!("{hit:?} reached at {price}"));
        }
        outcome
    }

    pub(crate) fn handle_payload(
        &self,
        generation: u64,
        config: &LiveChartConfig,
        payload: &mut [u8],
    ) -> PayloadDirective {
        let kline = match parse_kline_payload(payload) {
            Ok(Some(kline)) => kline,
            Ok(None) => return PayloadDirective::Continue,
            Err(error) => {
                warn!(symbol = %config.symbol, %error, "failed to decode kline payload");
                return PayloadDirective::Continue;
            }
        };

        if let Some(symbol) = kline.symbol.as_deref() {
            if !symbol.eq_ignore_ascii_case(&config.symbol) {
                debug!(expected = %config.symbol, got = symbol, "kline for another symbol ignored");
                return PayloadDirective::Continue;
            }
        }

        let outcome = {
            let mut state = self.shared.lock();
            if !state.accepts(generation) {
                return PayloadDirective::Stale;
            }

            let update = state.series.apply_kline(&kline);
            if update == SeriesUpdate::Stale {
                debug!(open_time = kline.open_time, "out-of-order kline ignored");
                return PayloadDirective::Continue;
            }

            let candle = state.series.last_entry().map(|(point, ohlc)| {
                (
                    point.clone(),
                    *ohlc,
                    matches!(update, SeriesUpdate::Appended { .. }),
                )
            });
            let mut outcome = Self::record_price(&mut state, kline.close, TickSource::Live);
            outcome.candle = candle;
            outcome
        };

        let halted = outcome.hit.is_some();
        self.dispatch(generation, outcome);
        if halted {
            PayloadDirective::Halted
        } else {
            PayloadDirective::Continue
        }
    }

    /// Returns `false` once the poller should stop.
    pub(crate) fn apply_fallback_price(&self, generation: u64, price: f64) -> bool {
        let outcome = {
            let mut state = self.shared.lock();
            if !state.accepts(generation) || !state.feed.polling_enabled() {
                return false;
            }

            let candle = if state.series.overwrite_last_close(price) {
                state
                    .series
                    .last_entry()
                    .map(|(point, ohlc)| (point.clone(), *ohlc, false))
            } else {
                None
            };
            let mut outcome = Self::record_price(&mut state, price, TickSource::Fallback);
            outcome.candle = candle;
            outcome
        };

        let halted = outcome.hit.is_some();
        self.dispatch(generation, outcome);
        !halted
    }

    fn ensure_poller(&self, config: &LiveChartConfig, generation: u64) {
        let poll_token = {
            let mut state = self.shared.lock();
            if !state.accepts(generation) || !state.feed.polling_enabled() {
                return;
            }
            if state.poller.as_ref().is_some_and(|token| !token.is_cancelled()) {
                return;
            }
            let Some(feed_token) = state.feed_token.as_ref() else {
                return;
            };
            let token = feed_token.child_token();
            state.poller = Some(token.clone());
            token
        };

        info!(symbol = %config.symbol, generation, "fallback polling engaged");
        tokio::spawn(run_fallback_poller(
            self.clone(),
            config.symbol.clone(),
            config.timeframe,
            generation,
            poll_token,
        ));
    }

    fn expire_overlay(&self, overlay_id: u64) {
        {
            let mut state = self.shared.lock();
            if state.overlay.as_ref().map(|active| active.id) != Some(overlay_id) {
                return;
            }
            state.overlay = None;
            state.overlay_timer = None;
        }

        info!(overlay_id, "analysis overlay expired");
        self.emit(ChartEvent::OverlayCleared {
            overlay_id,
            reason: OverlayClearReason::Expired,
        });
        self.emit(ChartEvent::Notification(Notification::overlay_expired()));
    }

    async fn load_history(&self, config: &LiveChartConfig, generation: u64) {
        let result = self
            .source
            .fetch_history(&config.symbol, config.timeframe, config.history_limit)
            .await;

        match result {
            Ok(candles) => {
                let loaded = {
                    let mut state = self.shared.lock();
                    if !state.accepts(generation) {
                        return;
                    }
                    state.series.replace_with_history(&candles);
                    state.last_price = state.series.last_close();
                    state.series.len()
                };

                info!(
                    symbol = %config.symbol,
                    timeframe = config.timeframe.as_str(),
                    generation,
                    candles = loaded,
                    "historical candles loaded"
                );
                self.emit(ChartEvent::HistoryLoaded {
                    generation,
                    symbol: config.symbol.clone(),
                    timeframe: config.timeframe,
                    candles: loaded,
                });
            }
            Err(error) => {
                warn!(symbol = %config.symbol, generation, %error, "failed to load historical candles");
                {
                    let mut state = self.shared.lock();
                    if !state.accepts(generation) {
                        return;
                    }
                    state.apply_feed_event(FeedEvent::HistoryFailed);
                    state.reason = Some(format!("historical candles unavailable: {error}"));
                }
                self.emit(ChartEvent::Notification(Notification::history_error(
                    &config.symbol,
                    &error,
                )));
                self.publish_status();
                self.ensure_poller(config, generation);
            }
        }
    }

    async fn run_stream(
        &self,
        config: &LiveChartConfig,
        generation: u64,
        cancel_token: &CancellationToken,
        mut stream: FrameStream,
    ) -> StreamEnd {
        loop {
            let frame = tokio::select! {
                _ = cancel_token.cancelled() => {
                    return StreamEnd::Cancelled;
                }
                next_frame = stream.next() => next_frame,
            };

            let Some(frame_result) = frame else {
                return StreamEnd::Failed("stream ended without a close frame".to_string());
            };

            match frame_result {
                Ok(StreamFrame::Payload(mut payload)) => {
                    match self.handle_payload(generation, config, payload.as_mut_slice()) {
                        PayloadDirective::Continue => {}
                        PayloadDirective::Stale => return StreamEnd::Stale,
                        PayloadDirective::Halted => return StreamEnd::Halted,
                    }
                }
                Ok(StreamFrame::Closed {
                    code: Some(NORMAL_CLOSE_CODE),
                }) => return StreamEnd::NormalClose,
                Ok(StreamFrame::Closed { code }) => {
                    let code = code.map_or_else(|| "none".to_string(), |code| code.to_string());
                    return StreamEnd::Failed(format!("socket closed with code {code}"));
                }
                Err(error) => return StreamEnd::Failed(format!("websocket frame error: {error}")),
            }
        }
    }

    async fn run_feed(self, config: LiveChartConfig, generation: u64, cancel_token: CancellationToken) {
        tokio::select! {
            _ = cancel_token.cancelled() => return,
            _ = self.load_history(&config, generation) => {}
        }

        let mut attempt = 0_u32;
        while !cancel_token.is_cancelled() {
            {
                let mut state = self.shared.lock();
                if !state.accepts(generation) {
                    break;
                }
                state.apply_feed_event(FeedEvent::Connect);
                state.advance_socket(SocketPhase::Connecting);
                state.reason = Some(if attempt == 0 {
                    "opening websocket stream".to_string()
                } else {
                    format!("reconnect attempt {attempt}")
                });
            }
            self.publish_status();

            let connected = tokio::select! {
                _ = cancel_token.cancelled() => break,
                result = self.source.connect_stream(&config.symbol, config.timeframe) => result,
            };

            let failure = match connected {
                Ok(stream) => {
                    {
                        let mut state = self.shared.lock();
                        if !state.accepts(generation) {
                            break;
                        }
                        state.apply_feed_event(FeedEvent::SocketOpened);
                        state.advance_socket(SocketPhase::Open);
                        state.stop_poller();
                        state.reason = Some("websocket connected".to_string());
                    }
                    attempt = 0;
                    info!(
                        symbol = %config.symbol,
                        timeframe = config.timeframe.as_str(),
                        generation,
                        "live kline stream connected"
                    );
                    self.publish_status();

                    match self.run_stream(&config, generation, &cancel_token, stream).await {
                        StreamEnd::Cancelled | StreamEnd::Stale | StreamEnd::Halted => break,
                        StreamEnd::NormalClose => {
                            {
                                let mut state = self.shared.lock();
                                if state.accepts(generation) {
                                    state.apply_feed_event(FeedEvent::NormalClose);
                                    state.release_socket(false);
                                    state.reason = Some("websocket closed normally".to_string());
                                }
                            }
                            info!(symbol = %config.symbol, generation, "live kline stream closed normally");
                            self.publish_status();
                            break;
                        }
                        StreamEnd::Failed(reason) => reason,
                    }
                }
                Err(error) => format!("websocket connect error: {error}"),
            };

            warn!(symbol = %config.symbol, generation, reason = %failure, "live feed degraded");
            {
                let mut state = self.shared.lock();
                if !state.accepts(generation) {
                    break;
                }
                state.apply_feed_event(FeedEvent::SocketFailed);
                state.release_socket(true);
                state.reason = Some(failure);
            }
            self.publish_status();
            self.ensure_poller(&config, generation);

            attempt = attempt.saturating_add(1);
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                _ = tokio::time::sleep(self.settings.reconnect_delay) => {}
            }
        }

        debug!(symbol = %config.symbol, generation, "feed task finished");
    }
}

struct FeedSession {
    cancellation_token: CancellationToken,
    join_handle: JoinHandle<()>,
}

/// Owns the chart's price series and the feeds that keep it current.
pub struct LiveChartController<S: MarketSource> {
    context: FeedContext<S>,
    session: tokio::sync::Mutex<Option<FeedSession>>,
}

impl<S: MarketSource> LiveChartController<S> {
    pub fn new(source: S, settings: FeedSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            context: FeedContext {
                source: Arc::new(source),
                shared: Arc::new(Mutex::new(ChartState::new())),
                events,
                tick_handlers: Arc::new(RwLock::new(Vec::new())),
                settings,
            },
            session: tokio::sync::Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChartEvent> {
        self.context.events.subscribe()
    }

    pub fn on_tick<F>(&self, handler: F)
    where
        F: Fn(&PriceTick) + Send + Sync + 'static,
    {
        self.context.tick_handlers.write().push(Arc::new(handler));
    }

    pub fn status(&self) -> LiveChartStatusSnapshot {
        self.context.shared.lock().status()
    }

    pub fn snapshot(&self) -> ChartSnapshot {
        let state = self.context.shared.lock();
        ChartSnapshot {
            status: state.status(),
            points: state.series.points().cloned().collect(),
            ohlc: state.series.ohlc().copied().collect(),
            overlay: state
                .overlay
                .as_ref()
                .map(|active| active.lines(state.series.len())),
        }
    }

    /// Tears down whatever feed is running and starts a fresh one for `config`.
    pub async fn connect(&self, config: LiveChartConfig) -> Result<LiveChartSession, AppError> {
        let mut session_slot = self.session.lock().await;

        {
            let state = self.context.shared.lock();
            let same_pair = state.symbol.as_deref() == Some(config.symbol.as_str())
                && state.timeframe == config.timeframe;
            if same_pair && state.feed == FeedState::Live && session_slot.is_some() {
                debug!(symbol = %config.symbol, "live feed already running, connect ignored");
                return Ok(LiveChartSession::from_config(&config, state.generation));
            }
        }

        {
            let mut state = self.context.shared.lock();
            state.manually_stopped = true;
            state.generation = state.generation.wrapping_add(1);
            state.stop_poller();
            state.stop_overlay_timer();
        }

        if let Some(previous) = session_slot.take() {
            previous.cancellation_token.cancel();
            let _ = previous.join_handle.await;
        }

        let cancellation_token = CancellationToken::new();
        let (generation, cleared_overlay) = {
            let mut state = self.context.shared.lock();
            state
                .series
                .reset(config.history_limit, config.timeframe);
            state.symbol = Some(config.symbol.clone());
            state.timeframe = config.timeframe;
            state.last_price = None;
            let cleared_overlay = state.overlay.take().map(|active| active.id);
            state.feed = FeedState::Disconnected;
            state.socket = SocketPhase::Idle;
            state.apply_feed_event(FeedEvent::Connect);
            state.feed_token = Some(cancellation_token.clone());
            state.reason = Some("loading historical candles".to_string());
            state.manually_stopped = false;
            (state.generation, cleared_overlay)
        };

        if let Some(overlay_id) = cleared_overlay {
            self.context.emit(ChartEvent::OverlayCleared {
                overlay_id,
                reason: OverlayClearReason::ChartReset,
            });
        }
        info!(
            symbol = %config.symbol,
            timeframe = config.timeframe.as_str(),
            generation,
            limit = config.history_limit,
            "starting live chart"
        );
        self.context.publish_status();

        let join_handle = tokio::spawn(self.context.clone().run_feed(
            config.clone(),
            generation,
            cancellation_token.clone(),
        ));
        *session_slot = Some(FeedSession {
            cancellation_token,
            join_handle,
        });

        Ok(LiveChartSession::from_config(&config, generation))
    }

    /// Manual stop. The series and any overlay stay on the chart.
    pub async fn disconnect(&self) -> LiveChartStopResult {
        let mut session_slot = self.session.lock().await;
        {
            let mut state = self.context.shared.lock();
            state.generation = state.generation.wrapping_add(1);
            state.halt("stopped by user".to_string());
            state.stop_overlay_timer();
        }

        let stopped = if let Some(previous) = session_slot.take() {
            previous.cancellation_token.cancel();
            let _ = previous.join_handle.await;
            true
        } else {
            false
        };

        info!(stopped, "live chart stopped");
        self.context.publish_status();
        LiveChartStopResult { stopped }
    }

    /// Puts an analysis on the chart. Returns `None` when the analysis is for a
    /// different symbol than the one being charted.
    pub fn apply_analysis(
        &self,
        overlay: AnalysisOverlay,
        style: Option<TradingStyle>,
    ) -> Result<Option<AppliedOverlay>, AppError> {
        overlay.validate()?;
        let duration = overlay_duration(style);
        let timer_token = CancellationToken::new();

        let applied = {
            let mut state = self.context.shared.lock();
            if state.symbol.as_deref() != Some(overlay.symbol.as_str()) {
                debug!(symbol = %overlay.symbol, "analysis is for another symbol, overlay skipped");
                return Ok(None);
            }

            state.stop_overlay_timer();
            state.overlay_seq = state.overlay_seq.wrapping_add(1);
            let active = ActiveOverlay::new(state.overlay_seq, overlay);
            let applied = AppliedOverlay {
                overlay_id: active.id,
                lines: active.lines(state.series.len()),
                expires_in_ms: duration.as_millis().min(u64::MAX as u128) as u64,
            };
            state.overlay = Some(active);
            state.overlay_timer = Some(timer_token.clone());
            applied
        };

        let context = self.context.clone();
        let overlay_id = applied.overlay_id;
        tokio::spawn(async move {
            tokio::select! {
                _ = timer_token.cancelled() => {}
                _ = tokio::time::sleep(duration) => context.expire_overlay(overlay_id),
            }
        });

        info!(
            overlay_id,
            expires_in_ms = applied.expires_in_ms,
            "analysis overlay applied"
        );
        self.context.emit(ChartEvent::OverlayApplied {
            overlay_id,
            lines: applied.lines.clone(),
        });
        Ok(Some(applied))
    }

    /// Publishes a notification on the chart's event channel.
    pub fn notify(&self, notification: Notification) {
        self.context.emit(ChartEvent::Notification(notification));
    }

    pub fn clear_overlay(&self) -> bool {
        let mut state = self.context.shared.lock();
        state.stop_overlay_timer();
        state.overlay.take().is_some()
    }
}
