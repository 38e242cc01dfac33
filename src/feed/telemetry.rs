use crate::feed::buffer::BoundedSeries;
use crate::feed::synchronizer::ApplyOutcome;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

const PERF_WINDOW_CAPACITY: usize = 2_048;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedCounters {
    pub events_applied: u64,
    pub events_ignored: u64,
    pub decode_errors: u64,
}

/// Lock-free counters shared by the ingest loop and the status publisher.
#[derive(Debug, Default)]
pub struct FeedTelemetryAtomics {
    events_applied: AtomicU64,
    events_ignored: AtomicU64,
    decode_errors: AtomicU64,
    last_event: Mutex<Option<String>>,
}

impl FeedTelemetryAtomics {
    pub fn record_outcome(&self, event_name: &str, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Applied => {
                self.events_applied.fetch_add(1, Ordering::Relaxed);
            }
            ApplyOutcome::Ignored => {
                self.events_ignored.fetch_add(1, Ordering::Relaxed);
            }
        }
        *self.last_event.lock() = Some(event_name.to_string());
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counters(&self) -> FeedCounters {
        FeedCounters {
            events_applied: self.events_applied.load(Ordering::Relaxed),
            events_ignored: self.events_ignored.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
        }
    }

    pub fn last_event(&self) -> Option<String> {
        self.last_event.lock().clone()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngestPerfSnapshot {
    pub decode_p50_us: Option<u32>,
    pub decode_p95_us: Option<u32>,
    pub decode_p99_us: Option<u32>,
    pub apply_p50_us: Option<u32>,
    pub apply_p95_us: Option<u32>,
    pub apply_p99_us: Option<u32>,
    pub ingest_count: u64,
    pub render_count: u64,
}

#[derive(Debug, Clone)]
struct RollingWindowU32 {
    values: BoundedSeries<u32>,
}

impl Default for RollingWindowU32 {
    fn default() -> Self {
        Self {
            values: BoundedSeries::new(PERF_WINDOW_CAPACITY),
        }
    }
}

impl RollingWindowU32 {
    fn push(&mut self, value: u32) {
        self.values.append(value);
    }

    fn percentiles(&self) -> (Option<u32>, Option<u32>, Option<u32>) {
        if self.values.is_empty() {
            return (None, None, None);
        }

        let mut sorted = self.values.to_vec();
        sorted.sort_unstable();

        (
            percentile_from_sorted(&sorted, 50),
            percentile_from_sorted(&sorted, 95),
            percentile_from_sorted(&sorted, 99),
        )
    }
}

#[derive(Debug, Default)]
pub struct PerformanceTelemetry {
    decode_us: RollingWindowU32,
    apply_us: RollingWindowU32,
    ingest_count: u64,
    render_count: u64,
}

impl PerformanceTelemetry {
    pub fn record_ingest(&mut self, decode_us: u32, apply_us: u32) {
        self.decode_us.push(decode_us);
        self.apply_us.push(apply_us);
        self.ingest_count = self.ingest_count.saturating_add(1);
    }

    /// For events that arrive already decoded, such as the mock feed.
    pub fn record_apply(&mut self, apply_us: u32) {
        self.apply_us.push(apply_us);
        self.ingest_count = self.ingest_count.saturating_add(1);
    }

    pub fn record_render(&mut self) {
        self.render_count = self.render_count.saturating_add(1);
    }

    pub fn snapshot(&self) -> IngestPerfSnapshot {
        let (decode_p50_us, decode_p95_us, decode_p99_us) = self.decode_us.percentiles();
        let (apply_p50_us, apply_p95_us, apply_p99_us) = self.apply_us.percentiles();

        IngestPerfSnapshot {
            decode_p50_us,
            decode_p95_us,
            decode_p99_us,
            apply_p50_us,
            apply_p95_us,
            apply_p99_us,
            ingest_count: self.ingest_count,
            render_count: self.render_count,
        }
    }
}

fn percentile_from_sorted(sorted_values: &[u32], percentile: usize) -> Option<u32> {
    if sorted_values.is_empty() {
        return None;
    }
    let max_index = sorted_values.len().saturating_sub(1);
    let index = max_index.saturating_mul(percentile).saturating_div(100);
    sorted_values.get(index).copied()
}

pub fn elapsed_us(started_at: std::time::Instant) -> u32 {
    started_at.elapsed().as_micros().min(u32::MAX as u128) as u32
}
