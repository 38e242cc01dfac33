//! Deterministic simulated trading feed, used when no live endpoint is wanted.

use crate::feed::types::{EventEnvelope, PricePoint, Transaction, TransactionKind};

pub const MOCK_SEED_PRICE: f64 = 0.001;
pub const MOCK_SEED_SENTIMENT: &str = "Scanning market sentiment...";
pub const MOCK_HISTORY_POINTS: usize = 20;
const MOCK_TRANSACTION_EVERY: u64 = 3;
const MOCK_SCAN_EVERY: u64 = 5;
const MOCK_SENTIMENT_EVERY: u64 = 7;
const MOCK_STATUSES: [&str; 3] = ["BUYING", "HOLDING", "SELLING"];
const MOCK_SCAN_TARGETS: [&str; 4] = ["PEPE/SOL", "WIF/SOL", "BONK/SOL", "POPCAT/SOL"];
const MOCK_SENTIMENTS: [&str; 4] = [
    "Crowd is euphoric, momentum building",
    "Mixed chatter, volume thinning",
    "Fear spreading, holders capitulating",
    "Quiet accumulation by large wallets",
];

#[derive(Debug, Clone)]
pub struct MockFeed {
    step: u64,
    price: f64,
    tick_interval_ms: i64,
}

impl MockFeed {
    pub fn new(tick_interval_ms: u64) -> Self {
        Self {
            step: 0,
            price: MOCK_SEED_PRICE,
            tick_interval_ms: tick_interval_ms.min(i64::MAX as u64) as i64,
        }
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn init_event(&self, now_ms: i64) -> EventEnvelope {
        let history = (0..MOCK_HISTORY_POINTS)
            .map(|index| {
                let back = (MOCK_HISTORY_POINTS - index) as i64;
                let wobble = ((index % 5) as f64 - 2.0) * 0.01;
                PricePoint {
                    time: clock_label(
                        now_ms.saturating_sub(back.saturating_mul(self.tick_interval_ms)),
                    ),
                    price: MOCK_SEED_PRICE * (1.0 + wobble),
                }
            })
            .collect();

        EventEnvelope::Init {
            history,
            price: self.price,
            sentiment: MOCK_SEED_SENTIMENT.to_string(),
        }
    }

    /// Events for the next tick: always one price update, plus periodic
    /// transactions, scan notices and sentiment changes.
    pub fn next_events(&mut self, now_ms: i64) -> Vec<EventEnvelope> {
        self.step = self.step.saturating_add(1);
        let step = self.step;
        let time = clock_label(now_ms);

        let drift = ((step % 7) as f64 - 3.0) * 0.004;
        self.price = (self.price * (1.0 + drift)).max(MOCK_SEED_PRICE / 100.0);
        let status = MOCK_STATUSES[(step % MOCK_STATUSES.len() as u64) as usize];

        let mut events = vec![EventEnvelope::PriceTick {
            time: time.clone(),
            price: self.price,
            status: status.to_string(),
        }];

        if step % MOCK_TRANSACTION_EVERY == 0 {
            let kind = if status == "SELLING" {
                TransactionKind::Sell
            } else {
                TransactionKind::Buy
            };
            events.push(EventEnvelope::Transaction(Transaction {
                kind,
                amount: 1_000.0 * (1 + step % 4) as f64,
                price: self.price,
                hash: mock_hash(step),
                timestamp: time.clone(),
            }));
        }

        if step % MOCK_SCAN_EVERY == 0 {
            let target_index = (step / MOCK_SCAN_EVERY) % MOCK_SCAN_TARGETS.len() as u64;
            let target = MOCK_SCAN_TARGETS[target_index as usize];
            events.push(EventEnvelope::ScanNotice {
                message: format!("[{time}] discovered {target}"),
            });
        }

        if step % MOCK_SENTIMENT_EVERY == 0 {
            let text_index = (step / MOCK_SENTIMENT_EVERY) % MOCK_SENTIMENTS.len() as u64;
            let text = MOCK_SENTIMENTS[text_index as usize];
            events.push(EventEnvelope::SentimentUpdate {
                text: text.to_string(),
            });
        }

        events
    }
}

fn mock_hash(step: u64) -> String {
    format!("{:016x}", step.wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// `HH:MM:SS` (UTC) for a unix millisecond timestamp.
pub fn clock_label(unix_ms: i64) -> String {
    let seconds_of_day = unix_ms.div_euclid(1_000).rem_euclid(86_400);
    format!(
        "{:02}:{:02}:{:02}",
        seconds_of_day / 3_600,
        (seconds_of_day % 3_600) / 60,
        seconds_of_day % 60
    )
}
