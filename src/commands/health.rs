use crate::feed::types::FeedConnectionState;
use crate::state::AppState;
use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_ms: u128,
    pub feed: FeedConnectionState,
}

pub fn build_health_response(started_at: Instant, feed: FeedConnectionState) -> HealthResponse {
    let status = match feed {
        FeedConnectionState::Error => "degraded",
        _ => "ok",
    };

    HealthResponse {
        status,
        uptime_ms: started_at.elapsed().as_millis(),
        feed,
    }
}

pub async fn health(state: &AppState) -> HealthResponse {
    let feed = state.feed_status.read().await.state;
    build_health_response(state.started_at, feed)
}
