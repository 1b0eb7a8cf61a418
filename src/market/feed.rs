use serde::{Deserialize, Serialize};

/// Which source currently feeds the chart.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FeedState {
    Disconnected,
    Connecting,
    Live,
    /// Socket absent or broken; the fallback poller owns the last candle.
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedEvent {
    Connect,
    HistoryFailed,
    SocketOpened,
    SocketFailed,
    NormalClose,
    Stop,
}

impl FeedState {
    /// Transition table. `None` means the event does not apply in this state
    /// and the state is left untouched.
    pub fn next(self, event: FeedEvent) -> Option<FeedState> {
        use FeedEvent as E;
        use FeedState as S;

        match (self, event) {
            (_, E::Stop) => Some(S::Disconnected),
            (S::Disconnected | S::Connecting, E::Connect) => Some(S::Connecting),
            // reconnect attempts keep the poller running until a socket opens
            (S::Degraded, E::Connect) => Some(S::Degraded),
            (S::Connecting | S::Degraded, E::HistoryFailed) => Some(S::Degraded),
            (S::Connecting | S::Degraded, E::SocketOpened) => Some(S::Live),
            (S::Connecting | S::Live | S::Degraded, E::SocketFailed) => Some(S::Degraded),
            (S::Live, E::NormalClose) => Some(S::Disconnected),
            _ => None,
        }
    }

    pub fn polling_enabled(self) -> bool {
        self == FeedState::Degraded
    }
}

/// Lifecycle of the current socket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SocketPhase {
    Idle,
    Connecting,
    Open,
    Closing,
    Error,
}

impl SocketPhase {
    pub fn can_enter(self, next: SocketPhase) -> bool {
        use SocketPhase as P;

        matches!(
            (self, next),
            (P::Idle, P::Connecting)
                | (P::Connecting, P::Open)
                | (P::Connecting, P::Error)
                | (P::Open, P::Closing)
                | (P::Open, P::Error)
                | (P::Closing, P::Idle)
                | (P::Error, P::Idle)
        )
    }
}
