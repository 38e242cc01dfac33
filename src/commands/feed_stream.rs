use crate::error::AppError;
use crate::feed::pipeline::run_feed_stream;
use crate::feed::presenter::{build_presenter, SnapshotPresenter};
use crate::feed::synchronizer::StreamSynchronizer;
use crate::feed::types::{
    FeedConfig, FeedConnectionState, FeedStatusSnapshot, FeedStreamSession, FeedStreamStopResult,
    StartFeedArgs,
};
use crate::state::{AppState, FeedStreamHandle};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub async fn start_feed_stream(
    state: &AppState,
    args: Option<StartFeedArgs>,
) -> Result<FeedStreamSession, AppError> {
    let config = args.unwrap_or_default().normalize()?;
    let presenter = build_presenter(config.presenter);
    launch_feed_stream(state, config, presenter).await
}

/// Same as [`start_feed_stream`], rendering through the given presenter
/// instead of the configured one.
pub async fn start_feed_stream_with_presenter(
    state: &AppState,
    args: Option<StartFeedArgs>,
    presenter: Box<dyn SnapshotPresenter>,
) -> Result<FeedStreamSession, AppError> {
    let config = args.unwrap_or_default().normalize()?;
    launch_feed_stream(state, config, presenter).await
}

async fn launch_feed_stream(
    state: &AppState,
    config: FeedConfig,
    presenter: Box<dyn SnapshotPresenter>,
) -> Result<FeedStreamSession, AppError> {
    let existing_handle = {
        let mut stream_slot = state.feed_stream.lock().await;
        stream_slot.take()
    };
    if let Some(handle) = existing_handle {
        handle.cancellation_token.cancel();
        let _ = handle.join_handle.await;
    }

    *state.synchronizer.lock() = StreamSynchronizer::new(config.capacities);

    let cancellation_token = CancellationToken::new();
    let task_token = cancellation_token.clone();
    let synchronizer = Arc::clone(&state.synchronizer);
    let status_store = Arc::clone(&state.feed_status);
    let runtime_config = config.clone();

    let join_handle = tokio::spawn(async move {
        run_feed_stream(
            runtime_config,
            synchronizer,
            status_store,
            presenter,
            task_token,
        )
        .await;
    });

    {
        let mut stream_slot = state.feed_stream.lock().await;
        *stream_slot = Some(FeedStreamHandle {
            cancellation_token,
            join_handle,
        });
    }

    tracing::info!(
        feed_url = %config.feed_url,
        mock_mode = config.mock_mode,
        presenter = ?config.presenter,
        "feed stream started"
    );
    Ok(FeedStreamSession::from_config(&config))
}

pub async fn stop_feed_stream(state: &AppState) -> Result<FeedStreamStopResult, AppError> {
    let existing_handle = {
        let mut stream_slot = state.feed_stream.lock().await;
        stream_slot.take()
    };

    let stopped = if let Some(handle) = existing_handle {
        handle.cancellation_token.cancel();
        let _ = handle.join_handle.await;
        true
    } else {
        false
    };

    {
        let mut writable = state.feed_status.write().await;
        writable.state = FeedConnectionState::Stopped;
        writable.reason = Some("stream stopped by command".to_string());
    }

    tracing::info!(stopped, "feed stream stop requested");
    Ok(FeedStreamStopResult { stopped })
}

pub async fn feed_stream_status(state: &AppState) -> FeedStatusSnapshot {
    state.feed_status.read().await.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::BufferCapacities;
    use std::time::Duration;

    fn mock_args() -> StartFeedArgs {
        StartFeedArgs {
            mock_mode: Some(true),
            mock_tick_interval_ms: Some(10),
            render_interval_ms: Some(10),
            price_history_capacity: Some(5),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn start_rejects_invalid_args_without_spawning() {
        let state = AppState::new();
        let result = start_feed_stream(
            &state,
            Some(StartFeedArgs {
                feed_url: Some("http://127.0.0.1/feed".to_string()),
                ..Default::default()
            }),
        )
        .await;

        assert!(matches!(result, Err(AppError::InvalidArgument(_))));
        assert!(state.feed_stream.lock().await.is_none());
    }

    #[tokio::test]
    async fn start_then_stop_mock_stream() {
        let state = AppState::new();
        let session = start_feed_stream(&state, Some(mock_args()))
            .await
            .expect("mock stream should start");
        assert!(session.running);
        assert!(session.mock_mode);
        assert_eq!(
            state.synchronizer.lock().capacities(),
            BufferCapacities {
                price_history: 5,
                ..Default::default()
            }
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(state.synchronizer.lock().snapshot().price_history.len() <= 5);

        let stop = stop_feed_stream(&state)
            .await
            .expect("stop should succeed");
        assert!(stop.stopped);

        let status = feed_stream_status(&state).await;
        assert_eq!(status.state, FeedConnectionState::Stopped);
        assert_eq!(status.reason.as_deref(), Some("stream stopped by command"));
        assert!(status.mock_mode);
    }

    #[tokio::test]
    async fn stop_without_stream_reports_not_stopped() {
        let state = AppState::new();
        let stop = stop_feed_stream(&state)
            .await
            .expect("stop should succeed");
        assert!(!stop.stopped);
    }

    #[tokio::test]
    async fn restarting_replaces_the_running_stream() {
        let state = AppState::new();
        start_feed_stream(&state, Some(mock_args()))
            .await
            .expect("first start should succeed");
        start_feed_stream(&state, Some(mock_args()))
            .await
            .expect("second start should succeed");

        assert!(state.feed_stream.lock().await.is_some());
        let stop = stop_feed_stream(&state)
            .await
            .expect("stop should succeed");
        assert!(stop.stopped);
        assert!(state.feed_stream.lock().await.is_none());
    }
}
