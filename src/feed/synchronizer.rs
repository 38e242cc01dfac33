//! Stream state synchronizer.
//!
//! The only mutator of dashboard state. Every inbound [`EventEnvelope`] is
//! applied as one transition; renderers read an owned [`DashboardSnapshot`].
//! Callers that share a synchronizer across tasks keep it behind a single
//! mutex so `apply` and `snapshot` never interleave.

use crate::feed::buffer::{BoundedLog, BoundedSeries};
use crate::feed::types::{BufferCapacities, EventEnvelope, PricePoint, Transaction};
use serde::Serialize;

pub const INITIAL_PRICE: f64 = 0.0;
pub const INITIAL_SENTIMENT: &str = "Connecting...";
pub const INITIAL_ENGINE_STATUS: &str = "Initializing...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Ignored,
}

/// Immutable read of the dashboard state.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    /// Oldest first.
    pub price_history: Vec<PricePoint>,
    /// Newest first.
    pub transaction_log: Vec<Transaction>,
    /// Newest first.
    pub scan_log: Vec<String>,
    pub current_price: f64,
    pub sentiment: String,
    pub engine_status: String,
}

#[derive(Debug, Clone)]
pub struct StreamSynchronizer {
    price_history: BoundedSeries<PricePoint>,
    transaction_log: BoundedLog<Transaction>,
    scan_log: BoundedLog<String>,
    current_price: f64,
    sentiment: String,
    engine_status: String,
    revision: u64,
}

impl Default for StreamSynchronizer {
    fn default() -> Self {
        Self::new(BufferCapacities::default())
    }
}

impl StreamSynchronizer {
    pub fn new(capacities: BufferCapacities) -> Self {
        Self {
            price_history: BoundedSeries::new(capacities.price_history),
            transaction_log: BoundedLog::new(capacities.transaction_log),
            scan_log: BoundedLog::new(capacities.scan_log),
            current_price: INITIAL_PRICE,
            sentiment: INITIAL_SENTIMENT.to_string(),
            engine_status: INITIAL_ENGINE_STATUS.to_string(),
            revision: 0,
        }
    }

    pub fn capacities(&self) -> BufferCapacities {
        BufferCapacities {
            price_history: self.price_history.capacity(),
            transaction_log: self.transaction_log.capacity(),
            scan_log: self.scan_log.capacity(),
        }
    }

    /// Bumped once per applied event and on reset; unchanged by ignored events.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn apply(&mut self, event: EventEnvelope) -> ApplyOutcome {
        match event {
            EventEnvelope::Init {
                history,
                price,
                sentiment,
            } => {
                self.price_history.replace_with(history);
                self.current_price = price;
                self.sentiment = sentiment;
            }
            EventEnvelope::PriceTick {
                time,
                price,
                status,
            } => {
                self.current_price = price;
                self.engine_status = status;
                self.price_history.append(PricePoint { time, price });
            }
            EventEnvelope::Transaction(transaction) => {
                self.transaction_log.prepend(transaction);
            }
            EventEnvelope::SentimentUpdate { text } => {
                self.sentiment = text;
            }
            EventEnvelope::ScanNotice { message } => {
                self.scan_log.prepend(message);
            }
            EventEnvelope::Unrecognized { .. } => return ApplyOutcome::Ignored,
        }

        self.revision = self.revision.wrapping_add(1);
        ApplyOutcome::Applied
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            price_history: self.price_history.to_vec(),
            transaction_log: self.transaction_log.to_vec(),
            scan_log: self.scan_log.to_vec(),
            current_price: self.current_price,
            sentiment: self.sentiment.clone(),
            engine_status: self.engine_status.clone(),
        }
    }

    /// Back to the freshly-connected state, keeping capacities.
    pub fn reset(&mut self) {
        self.price_history.clear();
        self.transaction_log.clear();
        self.scan_log.clear();
        self.current_price = INITIAL_PRICE;
        self.sentiment = INITIAL_SENTIMENT.to_string();
        self.engine_status = INITIAL_ENGINE_STATUS.to_string();
        self.revision = self.revision.wrapping_add(1);
    }
}
