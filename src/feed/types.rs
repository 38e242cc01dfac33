use crate::error::AppError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use simd_json::OwnedValue;
use std::str::FromStr;

use super::{
    INIT_EVENT, NEW_TRANSACTION_EVENT, PRICE_UPDATE_EVENT, SCAN_NOTICE_EVENT,
    SENTIMENT_UPDATE_EVENT,
};

pub const DEFAULT_FEED_URL: &str = "ws://127.0.0.1:3000/feed";
pub const DEFAULT_MOCK_MODE: bool = false;
pub const DEFAULT_PERF_TELEMETRY: bool = false;
pub const DEFAULT_PRESENTER: PresenterKind = PresenterKind::Log;
pub const DEFAULT_RENDER_INTERVAL_MS: u64 = 250;
pub const DEFAULT_MOCK_TICK_INTERVAL_MS: u64 = 500;
pub const DEFAULT_PRICE_HISTORY_CAPACITY: usize = 50;
pub const DEFAULT_TRANSACTION_LOG_CAPACITY: usize = 50;
pub const DEFAULT_SCAN_LOG_CAPACITY: usize = 10;
pub const MIN_RENDER_INTERVAL_MS: u64 = 8;
pub const MAX_RENDER_INTERVAL_MS: u64 = 5_000;
pub const MIN_MOCK_TICK_INTERVAL_MS: u64 = 10;
pub const MAX_MOCK_TICK_INTERVAL_MS: u64 = 60_000;
pub const MIN_BUFFER_CAPACITY: usize = 1;
pub const MAX_BUFFER_CAPACITY: usize = 10_000;

pub const ENV_FEED_URL: &str = "FEED_URL";
pub const ENV_MOCK_MODE: &str = "FEED_MOCK_MODE";
pub const ENV_PERF_TELEMETRY: &str = "FEED_PERF_TELEMETRY";
pub const ENV_PRESENTER: &str = "FEED_PRESENTER";
pub const ENV_RENDER_INTERVAL_MS: &str = "FEED_RENDER_INTERVAL_MS";
pub const ENV_MOCK_TICK_INTERVAL_MS: &str = "FEED_MOCK_TICK_INTERVAL_MS";
pub const ENV_PRICE_HISTORY_CAPACITY: &str = "FEED_PRICE_HISTORY_CAPACITY";
pub const ENV_TRANSACTION_LOG_CAPACITY: &str = "FEED_TRANSACTION_LOG_CAPACITY";
pub const ENV_SCAN_LOG_CAPACITY: &str = "FEED_SCAN_LOG_CAPACITY";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FeedConnectionState {
    Connecting,
    Live,
    Reconnecting,
    Stopped,
    Error,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresenterKind {
    Log,
    JsonLines,
}

impl FromStr for PresenterKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "log" | "tracing" => Ok(Self::Log),
            "json" | "jsonl" | "json_lines" => Ok(Self::JsonLines),
            other => Err(AppError::InvalidArgument(format!(
                "unknown presenter '{other}', expected 'log' or 'json_lines'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedStatusSnapshot {
    pub state: FeedConnectionState,
    pub feed_url: String,
    pub mock_mode: bool,
    pub events_applied: u64,
    pub events_ignored: u64,
    pub decode_errors: u64,
    pub last_event: Option<String>,
    pub reason: Option<String>,
}

impl FeedStatusSnapshot {
    pub fn stopped(feed_url: String, reason: Option<String>) -> Self {
        Self {
            state: FeedConnectionState::Stopped,
            feed_url,
            mock_mode: DEFAULT_MOCK_MODE,
            events_applied: 0,
            events_ignored: 0,
            decode_errors: 0,
            last_event: None,
            reason,
        }
    }
}

/// Sizes of the three dashboard buffers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BufferCapacities {
    pub price_history: usize,
    pub transaction_log: usize,
    pub scan_log: usize,
}

impl Default for BufferCapacities {
    fn default() -> Self {
        Self {
            price_history: DEFAULT_PRICE_HISTORY_CAPACITY,
            transaction_log: DEFAULT_TRANSACTION_LOG_CAPACITY,
            scan_log: DEFAULT_SCAN_LOG_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StartFeedArgs {
    pub feed_url: Option<String>,
    pub mock_mode: Option<bool>,
    pub perf_telemetry: Option<bool>,
    pub presenter: Option<PresenterKind>,
    pub render_interval_ms: Option<u64>,
    pub mock_tick_interval_ms: Option<u64>,
    pub price_history_capacity: Option<usize>,
    pub transaction_log_capacity: Option<usize>,
    pub scan_log_capacity: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub feed_url: String,
    pub mock_mode: bool,
    pub perf_telemetry: bool,
    pub presenter: PresenterKind,
    pub render_interval_ms: u64,
    pub mock_tick_interval_ms: u64,
    pub capacities: BufferCapacities,
}

impl StartFeedArgs {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds args from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Ok(Self {
            feed_url: read(ENV_FEED_URL),
            mock_mode: read(ENV_MOCK_MODE).map(|value| parse_flag(&value)).transpose()?,
            perf_telemetry: read(ENV_PERF_TELEMETRY)
                .map(|value| parse_flag(&value))
                .transpose()?,
            presenter: read(ENV_PRESENTER)
                .map(|value| value.parse::<PresenterKind>())
                .transpose()?,
            render_interval_ms: read(ENV_RENDER_INTERVAL_MS)
                .map(|value| value.parse::<u64>())
                .transpose()?,
            mock_tick_interval_ms: read(ENV_MOCK_TICK_INTERVAL_MS)
                .map(|value| value.parse::<u64>())
                .transpose()?,
            price_history_capacity: read(ENV_PRICE_HISTORY_CAPACITY)
                .map(|value| value.parse::<usize>())
                .transpose()?,
            transaction_log_capacity: read(ENV_TRANSACTION_LOG_CAPACITY)
                .map(|value| value.parse::<usize>())
                .transpose()?,
            scan_log_capacity: read(ENV_SCAN_LOG_CAPACITY)
                .map(|value| value.parse::<usize>())
                .transpose()?,
        })
    }

    pub fn normalize(self) -> Result<FeedConfig, AppError> {
        let feed_url = self
            .feed_url
            .unwrap_or_else(|| DEFAULT_FEED_URL.to_string())
            .trim()
            .to_string();

        let host_part = feed_url
            .strip_prefix("ws://")
            .or_else(|| feed_url.strip_prefix("wss://"));
        if host_part.map(str::is_empty).unwrap_or(true) {
            return Err(AppError::InvalidArgument(
                "feedUrl must be a ws:// or wss:// URL".to_string(),
            ));
        }

        let render_interval_ms = self.render_interval_ms.unwrap_or(DEFAULT_RENDER_INTERVAL_MS);
        if !(MIN_RENDER_INTERVAL_MS..=MAX_RENDER_INTERVAL_MS).contains(&render_interval_ms) {
            return Err(AppError::InvalidArgument(format!(
                "renderIntervalMs must be between {MIN_RENDER_INTERVAL_MS} and {MAX_RENDER_INTERVAL_MS}"
            )));
        }

        let mock_tick_interval_ms = self
            .mock_tick_interval_ms
            .unwrap_or(DEFAULT_MOCK_TICK_INTERVAL_MS);
        if !(MIN_MOCK_TICK_INTERVAL_MS..=MAX_MOCK_TICK_INTERVAL_MS).contains(&mock_tick_interval_ms)
        {
            return Err(AppError::InvalidArgument(format!(
                "mockTickIntervalMs must be between {MIN_MOCK_TICK_INTERVAL_MS} and {MAX_MOCK_TICK_INTERVAL_MS}"
            )));
        }

        let capacities = BufferCapacities {
            price_history: validate_capacity(
                "priceHistoryCapacity",
                self.price_history_capacity
                    .unwrap_or(DEFAULT_PRICE_HISTORY_CAPACITY),
            )?,
            transaction_log: validate_capacity(
                "transactionLogCapacity",
                self.transaction_log_capacity
                    .unwrap_or(DEFAULT_TRANSACTION_LOG_CAPACITY),
            )?,
            scan_log: validate_capacity(
                "scanLogCapacity",
                self.scan_log_capacity.unwrap_or(DEFAULT_SCAN_LOG_CAPACITY),
            )?,
        };

        Ok(FeedConfig {
            feed_url,
            mock_mode: self.mock_mode.unwrap_or(DEFAULT_MOCK_MODE),
            perf_telemetry: self.perf_telemetry.unwrap_or(DEFAULT_PERF_TELEMETRY),
            presenter: self.presenter.unwrap_or(DEFAULT_PRESENTER),
            render_interval_ms,
            mock_tick_interval_ms,
            capacities,
        })
    }
}

fn validate_capacity(field: &str, value: usize) -> Result<usize, AppError> {
    if !(MIN_BUFFER_CAPACITY..=MAX_BUFFER_CAPACITY).contains(&value) {
        return Err(AppError::InvalidArgument(format!(
            "{field} must be between {MIN_BUFFER_CAPACITY} and {MAX_BUFFER_CAPACITY}"
        )));
    }
    Ok(value)
}

fn parse_flag(value: &str) -> Result<bool, AppError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "yes" | "on" => Ok(true),
        "0" | "no" | "off" => Ok(false),
        other => Ok(other.parse::<bool>()?),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStreamSession {
    pub running: bool,
    pub feed_url: String,
    pub mock_mode: bool,
    pub perf_telemetry: bool,
    pub presenter: PresenterKind,
    pub render_interval_ms: u64,
    pub mock_tick_interval_ms: u64,
    pub capacities: BufferCapacities,
}

impl FeedStreamSession {
    pub fn from_config(config: &FeedConfig) -> Self {
        Self {
            running: true,
            feed_url: config.feed_url.clone(),
            mock_mode: config.mock_mode,
            perf_telemetry: config.perf_telemetry,
            presenter: config.presenter,
            render_interval_ms: config.render_interval_ms,
            mock_tick_interval_ms: config.mock_tick_interval_ms,
            capacities: config.capacities,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStreamStopResult {
    pub stopped: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricePoint {
    pub time: String,
    pub price: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    #[serde(alias = "BUY", alias = "Buy")]
    Buy,
    #[serde(alias = "SELL", alias = "Sell")]
    Sell,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    #[serde(rename = "type", alias = "kind")]
    pub kind: TransactionKind,
    pub amount: f64,
    pub price: f64,
    pub hash: String,
    pub timestamp: String,
}

/// One inbound fact from the feed.
#[derive(Debug, Clone, PartialEq)]
pub enum EventEnvelope {
    Init {
        history: Vec<PricePoint>,
        price: f64,
        sentiment: String,
    },
    PriceTick {
        time: String,
        price: f64,
        status: String,
    },
    Transaction(Transaction),
    SentimentUpdate {
        text: String,
    },
    ScanNotice {
        message: String,
    },
    /// An event name this client does not know. Applying it changes nothing.
    Unrecognized {
        event: String,
    },
}

impl EventEnvelope {
    pub fn name(&self) -> &str {
        match self {
            Self::Init { .. } => INIT_EVENT,
            Self::PriceTick { .. } => PRICE_UPDATE_EVENT,
            Self::Transaction(_) => NEW_TRANSACTION_EVENT,
            Self::SentimentUpdate { .. } => SENTIMENT_UPDATE_EVENT,
            Self::ScanNotice { .. } => SCAN_NOTICE_EVENT,
            Self::Unrecognized { event } => event,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EventFrameWire {
    pub event: Option<String>,
    pub data: Option<OwnedValue>,
}

#[derive(Debug, Deserialize)]
struct InitWire {
    #[serde(default)]
    history: Vec<PricePoint>,
    price: f64,
    sentiment: String,
}

#[derive(Debug, Deserialize)]
struct PriceTickWire {
    time: String,
    price: f64,
    status: String,
}

#[derive(Debug, Deserialize)]
struct SentimentUpdateWire {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ScanNoticeWire {
    message: String,
}

impl From<InitWire> for EventEnvelope {
    fn from(value: InitWire) -> Self {
        Self::Init {
            history: value.history,
            price: value.price,
            sentiment: value.sentiment,
        }
    }
}

impl From<PriceTickWire> for EventEnvelope {
    fn from(value: PriceTickWire) -> Self {
        Self::PriceTick {
            time: value.time,
            price: value.price,
            status: value.status,
        }
    }
}

impl From<SentimentUpdateWire> for EventEnvelope {
    fn from(value: SentimentUpdateWire) -> Self {
        Self::SentimentUpdate { text: value.text }
    }
}

impl From<ScanNoticeWire> for EventEnvelope {
    fn from(value: ScanNoticeWire) -> Self {
        Self::ScanNotice {
            message: value.message,
        }
    }
}

impl TryFrom<EventFrameWire> for EventEnvelope {
    type Error = AppError;

    fn try_from(value: EventFrameWire) -> Result<Self, Self::Error> {
        let event = value
            .event
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| AppError::MalformedEvent("frame has no event name".to_string()))?;

        match event.as_str() {
            INIT_EVENT => decode_payload::<InitWire>(&event, value.data).map(Self::from),
            PRICE_UPDATE_EVENT => {
                decode_payload::<PriceTickWire>(&event, value.data).map(Self::from)
            }
            NEW_TRANSACTION_EVENT => {
                decode_payload::<Transaction>(&event, value.data).map(Self::Transaction)
            }
            SENTIMENT_UPDATE_EVENT => {
                decode_payload::<SentimentUpdateWire>(&event, value.data).map(Self::from)
            }
            SCAN_NOTICE_EVENT => {
                decode_payload::<ScanNoticeWire>(&event, value.data).map(Self::from)
            }
            _ => Ok(Self::Unrecognized { event }),
        }
    }
}

fn decode_payload<T>(event: &str, data: Option<OwnedValue>) -> Result<T, AppError>
where
    T: DeserializeOwned,
{
    let data = data
        .ok_or_else(|| AppError::MalformedEvent(format!("'{event}' frame has no data")))?;
    simd_json::serde::from_owned_value(data)
        .map_err(|error| AppError::MalformedEvent(format!("'{event}' payload: {error}")))
}

/// Decodes one `{"event": ..., "data": ...}` frame. The buffer is used as
/// scratch space by the parser.
pub fn decode_event_frame(payload: &mut [u8]) -> Result<EventEnvelope, AppError> {
    let wire: EventFrameWire = simd_json::serde::from_slice(payload)?;
    wire.try_into()
}
