pub mod commands;
pub mod error;
pub mod feed;
pub mod state;

use commands::feed_stream::{start_feed_stream, stop_feed_stream};
use error::AppError;
use feed::types::StartFeedArgs;
use state::AppState;

/// Runs the feed until Ctrl-C, then stops it and returns.
pub async fn run(args: StartFeedArgs) -> Result<(), AppError> {
    let state = AppState::new();
    let session = start_feed_stream(&state, Some(args)).await?;
    tracing::info!(
        feed_url = %session.feed_url,
        mock_mode = session.mock_mode,
        "dashboard client running, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("received Ctrl-C, shutting down");

    stop_feed_stream(&state).await?;
    let status = commands::feed_stream::feed_stream_status(&state).await;
    tracing::info!(
        events_applied = status.events_applied,
        events_ignored = status.events_ignored,
        decode_errors = status.decode_errors,
        "feed stream stopped"
    );
    Ok(())
}
