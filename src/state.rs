use crate::feed::synchronizer::StreamSynchronizer;
use crate::feed::types::{FeedStatusSnapshot, DEFAULT_FEED_URL};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct FeedStreamHandle {
    pub cancellation_token: CancellationToken,
    pub join_handle: JoinHandle<()>,
}

pub struct AppState {
    pub started_at: Instant,
    pub synchronizer: Arc<parking_lot::Mutex<StreamSynchronizer>>,
    pub feed_stream: Mutex<Option<FeedStreamHandle>>,
    pub feed_status: Arc<RwLock<FeedStatusSnapshot>>,
}

impl AppState {
    pub fn new() -> Self {
        let feed_status = FeedStatusSnapshot::stopped(
            DEFAULT_FEED_URL.to_string(),
            Some("stream idle".to_string()),
        );

        Self {
            started_at: Instant::now(),
            synchronizer: Arc::new(parking_lot::Mutex::new(StreamSynchronizer::default())),
            feed_stream: Mutex::new(None),
            feed_status: Arc::new(RwLock::new(feed_status)),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
