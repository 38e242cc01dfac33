use crate::feed::connection::connect_feed_stream;
use crate::feed::mock::MockFeed;
use crate::feed::presenter::SnapshotPresenter;
use crate::feed::synchronizer::{ApplyOutcome, StreamSynchronizer};
use crate::feed::telemetry::{elapsed_us, FeedTelemetryAtomics, PerformanceTelemetry};
use crate::feed::types::{
    decode_event_frame, EventEnvelope, FeedConfig, FeedConnectionState, FeedStatusSnapshot,
};
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

const STATUS_HEARTBEAT_MS: u64 = 1_000;
const STATUS_ERROR_THROTTLE_MS: u64 = 500;

#[derive(Debug, Default)]
struct StatusPublishThrottle {
    last_state: Option<FeedConnectionState>,
    last_reason: Option<String>,
    last_emit: Option<Instant>,
}

struct StreamRuntimeContext<'a> {
    config: &'a FeedConfig,
    synchronizer: &'a Arc<Mutex<StreamSynchronizer>>,
    telemetry: &'a Arc<FeedTelemetryAtomics>,
    perf_telemetry: &'a Arc<Mutex<PerformanceTelemetry>>,
    status_store: &'a Arc<RwLock<FeedStatusSnapshot>>,
    status_throttle: &'a Arc<Mutex<StatusPublishThrottle>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamDirective {
    Continue,
    ImmediateReconnect,
}

/// Applies one event and records its outcome. The synchronizer lock is held
/// only for the duration of `apply`.
pub fn ingest_event(
    synchronizer: &Mutex<StreamSynchronizer>,
    telemetry: &FeedTelemetryAtomics,
    event: EventEnvelope,
) -> ApplyOutcome {
    let event_name = event.name().to_string();
    let outcome = synchronizer.lock().apply(event);
    telemetry.record_outcome(&event_name, outcome);
    if outcome == ApplyOutcome::Ignored {
        tracing::debug!(event = %event_name, "ignoring unrecognized feed event");
    }
    outcome
}

pub async fn run_feed_stream(
    config: FeedConfig,
    synchronizer: Arc<Mutex<StreamSynchronizer>>,
    status_store: Arc<RwLock<FeedStatusSnapshot>>,
    presenter: Box<dyn SnapshotPresenter>,
    cancel_token: CancellationToken,
) {
    let telemetry = Arc::new(FeedTelemetryAtomics::default());
    let perf_telemetry = Arc::new(Mutex::new(PerformanceTelemetry::default()));
    let status_throttle = Arc::new(Mutex::new(StatusPublishThrottle::default()));

    let render_handle = tokio::spawn(run_render_loop(
        config.clone(),
        Arc::clone(&synchronizer),
        Arc::clone(&telemetry),
        Arc::clone(&perf_telemetry),
        Arc::clone(&status_store),
        presenter,
        cancel_token.clone(),
    ));

    let heartbeat_cancel = cancel_token.clone();
    let heartbeat_status_store = Arc::clone(&status_store);
    let heartbeat_telemetry = Arc::clone(&telemetry);
    let heartbeat_perf_telemetry = Arc::clone(&perf_telemetry);
    let heartbeat_perf_enabled = config.perf_telemetry;
    let heartbeat_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(STATUS_HEARTBEAT_MS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = heartbeat_cancel.cancelled() => break,
                _ = ticker.tick() => {
                    refresh_status_counters(&heartbeat_status_store, &heartbeat_telemetry).await;

                    if heartbeat_perf_enabled {
                        let snapshot = heartbeat_perf_telemetry.lock().snapshot();
                        tracing::info!(
                            decode_p50_us = ?snapshot.decode_p50_us,
                            decode_p99_us = ?snapshot.decode_p99_us,
                            apply_p50_us = ?snapshot.apply_p50_us,
                            apply_p99_us = ?snapshot.apply_p99_us,
                            ingest_count = snapshot.ingest_count,
                            render_count = snapshot.render_count,
                            "feed ingest performance"
                        );
                    }
                }
            }
        }
    });

    let stream_context = StreamRuntimeContext {
        config: &config,
        synchronizer: &synchronizer,
        telemetry: &telemetry,
        perf_telemetry: &perf_telemetry,
        status_store: &status_store,
        status_throttle: &status_throttle,
    };

    if config.mock_mode {
        run_mock_producer(&stream_context, &cancel_token).await;
    } else {
        run_websocket_ingest(&stream_context, &cancel_token).await;
    }

    cancel_token.cancel();
    let _ = render_handle.await;
    let _ = heartbeat_handle.await;

    publish_status(
        &status_store,
        &telemetry,
        &config,
        FeedConnectionState::Stopped,
        Some("stream stopped".to_string()),
    )
    .await;
}

async fn run_render_loop(
    config: FeedConfig,
    synchronizer: Arc<Mutex<StreamSynchronizer>>,
    telemetry: Arc<FeedTelemetryAtomics>,
    perf_telemetry: Arc<Mutex<PerformanceTelemetry>>,
    status_store: Arc<RwLock<FeedStatusSnapshot>>,
    mut presenter: Box<dyn SnapshotPresenter>,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(config.render_interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_rendered_revision: Option<u64> = None;

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = ticker.tick() => {
                let pending = {
                    let readable = synchronizer.lock();
                    let revision = readable.revision();
                    if last_rendered_revision == Some(revision) {
                        None
                    } else {
                        Some((revision, readable.snapshot()))
                    }
                };

                let Some((revision, snapshot)) = pending else {
                    continue;
                };
                last_rendered_revision = Some(revision);
                perf_telemetry.lock().record_render();

                if let Err(error) = presenter.render(&snapshot, revision) {
                    tracing::error!(%error, revision, "failed to render dashboard snapshot");
                    publish_status(
                        &status_store,
                        &telemetry,
                        &config,
                        FeedConnectionState::Error,
                        Some(format!("failed to render dashboard snapshot: {error}")),
                    )
                    .await;
                }
            }
        }
    }
}

async fn run_mock_producer(context: &StreamRuntimeContext<'_>, cancel_token: &CancellationToken) {
    publish_status_for(
        context,
        FeedConnectionState::Connecting,
        Some("starting deterministic mock feed".to_string()),
    )
    .await;

    let mut feed = MockFeed::new(context.config.mock_tick_interval_ms);
    context.synchronizer.lock().reset();
    ingest_event(
        context.synchronizer,
        context.telemetry,
        feed.init_event(now_unix_ms()),
    );

    publish_status_for(
        context,
        FeedConnectionState::Live,
        Some("mock feed active".to_string()),
    )
    .await;

    let mut ticker =
        tokio::time::interval(Duration::from_millis(context.config.mock_tick_interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; the init event already covers it.
    ticker.tick().await;

    while !cancel_token.is_cancelled() {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = ticker.tick() => {
                for event in feed.next_events(now_unix_ms()) {
                    let apply_started_at = Instant::now();
                    ingest_event(context.synchronizer, context.telemetry, event);
                    context
                        .perf_telemetry
                        .lock()
                        .record_apply(elapsed_us(apply_started_at));
                }
            }
        }
    }
}

async fn run_websocket_ingest(context: &StreamRuntimeContext<'_>, cancel_token: &CancellationToken) {
    let feed_url = context.config.feed_url.as_str();
    let mut reconnect_attempt = 0_u32;

    while !cancel_token.is_cancelled() {
        let phase = if reconnect_attempt == 0 {
            FeedConnectionState::Connecting
        } else {
            FeedConnectionState::Reconnecting
        };
        let reason = if reconnect_attempt == 0 {
            Some("opening websocket feed".to_string())
        } else {
            Some(format!("reconnect attempt {reconnect_attempt}"))
        };
        publish_status_for(context, phase, reason).await;

        let connect_result = tokio::select! {
            _ = cancel_token.cancelled() => break,
            result = connect_feed_stream(feed_url) => result,
        };

        match connect_result {
            Ok(mut websocket_stream) => {
                reconnect_attempt = 0;
                // A new connection starts from empty state; the server re-seeds it with init.
                context.synchronizer.lock().reset();
                publish_status_for(
                    context,
                    FeedConnectionState::Live,
                    Some("websocket connected".to_string()),
                )
                .await;

                let mut immediate_reconnect = false;
                loop {
                    let frame = tokio::select! {
                        _ = cancel_token.cancelled() => break,
                        next_message = websocket_stream.next() => next_message,
                    };

                    let Some(frame_result) = frame else {
                        tracing::info!(feed_url, "websocket feed ended");
                        break;
                    };

                    match frame_result {
                        Ok(message) => {
                            if handle_message(message, context) == StreamDirective::ImmediateReconnect {
                                immediate_reconnect = true;
                                break;
                            }
                        }
                        Err(error) => {
                            tracing::warn!(%error, feed_url, "websocket frame error");
                            publish_status_throttled(
                                context,
                                FeedConnectionState::Reconnecting,
                                Some(format!("websocket frame error: {error}")),
                            )
                            .await;
                            break;
                        }
                    }
                }

                if cancel_token.is_cancelled() {
                    break;
                }

                if immediate_reconnect {
                    continue;
                }
            }
            Err(error) => {
                tracing::warn!(%error, feed_url, attempt = reconnect_attempt, "websocket connect failed");
                publish_status_throttled(
                    context,
                    FeedConnectionState::Reconnecting,
                    Some(format!("websocket connect error: {error}")),
                )
                .await;
            }
        }

        reconnect_attempt = reconnect_attempt.saturating_add(1);
        let delay = reconnect_delay(reconnect_attempt);
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

fn handle_message(message: Message, context: &StreamRuntimeContext<'_>) -> StreamDirective {
    let decode_started_at = Instant::now();
    let decoded = match message {
        Message::Text(text_payload) => {
            let mut owned_payload = text_payload.into_bytes();
            decode_event_frame(owned_payload.as_mut_slice())
        }
        Message::Binary(mut binary_payload) => decode_event_frame(binary_payload.as_mut_slice()),
        Message::Close(close_frame) => {
            tracing::info!(?close_frame, "feed server closed the websocket");
            return StreamDirective::ImmediateReconnect;
        }
        _ => return StreamDirective::Continue,
    };
    let decode_elapsed_us = elapsed_us(decode_started_at);

    let event = match decoded {
        Ok(event) => event,
        Err(error) => {
            context.telemetry.record_decode_error();
            tracing::warn!(%error, "dropping malformed feed frame");
            return StreamDirective::Continue;
        }
    };

    let apply_started_at = Instant::now();
    ingest_event(context.synchronizer, context.telemetry, event);
    let apply_elapsed_us = elapsed_us(apply_started_at);
    context
        .perf_telemetry
        .lock()
        .record_ingest(decode_elapsed_us, apply_elapsed_us);

    StreamDirective::Continue
}

async fn publish_status(
    status_store: &Arc<RwLock<FeedStatusSnapshot>>,
    telemetry: &Arc<FeedTelemetryAtomics>,
    config: &FeedConfig,
    state: FeedConnectionState,
    reason: Option<String>,
) {
    let counters = telemetry.counters();
    let snapshot = FeedStatusSnapshot {
        state,
        feed_url: config.feed_url.clone(),
        mock_mode: config.mock_mode,
        events_applied: counters.events_applied,
        events_ignored: counters.events_ignored,
        decode_errors: counters.decode_errors,
        last_event: telemetry.last_event(),
        reason,
    };

    let reason = snapshot.reason.clone().unwrap_or_default();

    let changed = {
        let mut writable = status_store.write().await;
        let changed = writable.state != snapshot.state || writable.reason != snapshot.reason;
        *writable = snapshot;
        changed
    };

    if !changed {
        return;
    }

    match state {
        FeedConnectionState::Error | FeedConnectionState::Reconnecting => {
            tracing::warn!(state = ?state, %reason, "feed status changed");
        }
        _ => tracing::info!(state = ?state, %reason, "feed status changed"),
    }
}

async fn refresh_status_counters(
    status_store: &Arc<RwLock<FeedStatusSnapshot>>,
    telemetry: &Arc<FeedTelemetryAtomics>,
) {
    let counters = telemetry.counters();
    let last_event = telemetry.last_event();
    let mut writable = status_store.write().await;
    writable.events_applied = counters.events_applied;
    writable.events_ignored = counters.events_ignored;
    writable.decode_errors = counters.decode_errors;
    writable.last_event = last_event;
}

async fn publish_status_for(
    context: &StreamRuntimeContext<'_>,
    state: FeedConnectionState,
    reason: Option<String>,
) {
    publish_status(
        context.status_store,
        context.telemetry,
        context.config,
        state,
        reason,
    )
    .await;
}

fn allow_status_publish(
    throttle: &Mutex<StatusPublishThrottle>,
    state: FeedConnectionState,
    reason: &Option<String>,
    now: Instant,
) -> bool {
    let mut writable = throttle.lock();
    let should_throttle = matches!(
        state,
        FeedConnectionState::Error | FeedConnectionState::Reconnecting
    );

    if should_throttle
        && writable.last_state == Some(state)
        && writable.last_reason == *reason
        && writable
            .last_emit
            .map(|instant| {
                now.saturating_duration_since(instant)
                    < Duration::from_millis(STATUS_ERROR_THROTTLE_MS)
            })
            .unwrap_or(false)
    {
        return false;
    }

    writable.last_state = Some(state);
    writable.last_reason = reason.clone();
    writable.last_emit = Some(now);
    true
}

async fn publish_status_throttled(
    context: &StreamRuntimeContext<'_>,
    state: FeedConnectionState,
    reason: Option<String>,
) {
    if !allow_status_publish(context.status_throttle, state, &reason, Instant::now()) {
        return;
    }

    publish_status_for(context, state, reason).await;
}

fn reconnect_delay(attempt: u32) -> Duration {
    let exponent = attempt.min(6);
    let base_ms = 200_u64.saturating_mul(1_u64 << exponent);
    let jitter_ms = (now_unix_ms().unsigned_abs() % 250).min(249);
    Duration::from_millis((base_ms + jitter_ms).min(5_000))
}

fn now_unix_ms() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_millis().min(i64::MAX as u128) as i64,
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::feed::synchronizer::DashboardSnapshot;
    use crate::feed::types::StartFeedArgs;

    #[derive(Clone, Default)]
    struct RecordingPresenter {
        renders: Arc<Mutex<Vec<(u64, DashboardSnapshot)>>>,
    }

    impl SnapshotPresenter for RecordingPresenter {
        fn render(&mut self, snapshot: &DashboardSnapshot, revision: u64) -> Result<(), AppError> {
            self.renders.lock().push((revision, snapshot.clone()));
            Ok(())
        }
    }

    fn test_config(args: StartFeedArgs) -> FeedConfig {
        args.normalize().expect("test config should be valid")
    }

    #[test]
    fn reconnect_delay_grows_and_stays_capped() {
        let first = reconnect_delay(1);
        assert!(first >= Duration::from_millis(400));
        assert!(first < Duration::from_millis(650));

        for attempt in 0..20 {
            assert!(reconnect_delay(attempt) <= Duration::from_millis(5_000));
        }
        assert!(reconnect_delay(20) >= Duration::from_millis(5_000));
    }

    #[test]
    fn throttles_repeated_error_statuses() {
        let throttle = Mutex::new(StatusPublishThrottle::default());
        let now = Instant::now();
        let reason = Some("websocket connect error".to_string());

        assert!(allow_status_publish(
            &throttle,
            FeedConnectionState::Reconnecting,
            &reason,
            now
        ));
        assert!(!allow_status_publish(
            &throttle,
            FeedConnectionState::Reconnecting,
            &reason,
            now + Duration::from_millis(100)
        ));
        assert!(allow_status_publish(
            &throttle,
            FeedConnectionState::Reconnecting,
            &reason,
            now + Duration::from_millis(STATUS_ERROR_THROTTLE_MS + 1)
        ));
    }

    #[test]
    fn never_throttles_live_status() {
        let throttle = Mutex::new(StatusPublishThrottle::default());
        let now = Instant::now();
        let reason = Some("websocket connected".to_string());

        assert!(allow_status_publish(
            &throttle,
            FeedConnectionState::Live,
            &reason,
            now
        ));
        assert!(allow_status_publish(
            &throttle,
            FeedConnectionState::Live,
            &reason,
            now
        ));
    }

    #[test]
    fn ingest_event_counts_applied_and_ignored_events() {
        let synchronizer = Mutex::new(StreamSynchronizer::default());
        let telemetry = FeedTelemetryAtomics::default();

        let applied = ingest_event(
            &synchronizer,
            &telemetry,
            EventEnvelope::SentimentUpdate {
                text: "calm".to_string(),
            },
        );
        let ignored = ingest_event(
            &synchronizer,
            &telemetry,
            EventEnvelope::Unrecognized {
                event: "noise".to_string(),
            },
        );

        assert_eq!(applied, ApplyOutcome::Applied);
        assert_eq!(ignored, ApplyOutcome::Ignored);
        assert_eq!(telemetry.counters().events_applied, 1);
        assert_eq!(telemetry.counters().events_ignored, 1);
        assert_eq!(synchronizer.lock().snapshot().sentiment, "calm");
    }

    #[test]
    fn handle_message_drops_malformed_frames_and_reconnects_on_close() {
        let config = test_config(StartFeedArgs::default());
        let synchronizer = Arc::new(Mutex::new(StreamSynchronizer::default()));
        let telemetry = Arc::new(FeedTelemetryAtomics::default());
        let perf_telemetry = Arc::new(Mutex::new(PerformanceTelemetry::default()));
        let status_store = Arc::new(RwLock::new(FeedStatusSnapshot::stopped(
            config.feed_url.clone(),
            None,
        )));
        let status_throttle = Arc::new(Mutex::new(StatusPublishThrottle::default()));
        let context = StreamRuntimeContext {
            config: &config,
            synchronizer: &synchronizer,
            telemetry: &telemetry,
            perf_telemetry: &perf_telemetry,
            status_store: &status_store,
            status_throttle: &status_throttle,
        };
        let before = synchronizer.lock().snapshot();

        let malformed = handle_message(Message::Text("{\"event\":".into()), &context);
        assert_eq!(malformed, StreamDirective::Continue);
        assert_eq!(telemetry.counters().decode_errors, 1);
        assert_eq!(synchronizer.lock().snapshot(), before);

        let applied = handle_message(
            Message::Text(
                r#"{"event":"scan_notice","data":{"message":"found WIF/SOL"}}"#.into(),
            ),
            &context,
        );
        assert_eq!(applied, StreamDirective::Continue);
        assert_eq!(
            synchronizer.lock().snapshot().scan_log,
            vec!["found WIF/SOL".to_string()]
        );
        assert_eq!(perf_telemetry.lock().snapshot().ingest_count, 1);

        let closed = handle_message(Message::Close(None), &context);
        assert_eq!(closed, StreamDirective::ImmediateReconnect);
    }

    #[tokio::test]
    async fn mock_stream_populates_state_and_renders_until_cancelled() {
        let config = test_config(StartFeedArgs {
            mock_mode: Some(true),
            mock_tick_interval_ms: Some(10),
            render_interval_ms: Some(10),
            ..Default::default()
        });
        let synchronizer = Arc::new(Mutex::new(StreamSynchronizer::new(config.capacities)));
        let status_store = Arc::new(RwLock::new(FeedStatusSnapshot::stopped(
            config.feed_url.clone(),
            None,
        )));
        let presenter = RecordingPresenter::default();
        let renders = Arc::clone(&presenter.renders);
        let cancel_token = CancellationToken::new();

        let handle = tokio::spawn(run_feed_stream(
            config,
            Arc::clone(&synchronizer),
            Arc::clone(&status_store),
            Box::new(presenter),
            cancel_token.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(300)).await;
        {
            let readable = status_store.read().await;
            assert_eq!(readable.state, FeedConnectionState::Live);
            assert!(readable.mock_mode);
        }
        cancel_token.cancel();
        handle.await.expect("feed task should not panic");

        let snapshot = synchronizer.lock().snapshot();
        assert!(snapshot.price_history.len() > crate::feed::mock::MOCK_HISTORY_POINTS);
        assert!(snapshot.current_price > 0.0);
        assert_ne!(snapshot.engine_status, crate::feed::synchronizer::INITIAL_ENGINE_STATUS);

        let rendered = renders.lock();
        assert!(!rendered.is_empty());
        let revisions: Vec<u64> = rendered.iter().map(|(revision, _)| *revision).collect();
        assert!(revisions.windows(2).all(|pair| pair[0] < pair[1]));

        let status = status_store.read().await;
        assert_eq!(status.state, FeedConnectionState::Stopped);
        assert!(status.events_applied > 1);
    }
}
