//! Stream fan-out: ingest frames from an upstream WebSocket source, run the
//! coaching engine, broadcast JSON coaching payloads to subscribers.
//!
//! Concurrency model (§5): the engine is single-threaded and stateful,
//! owned exclusively by the engine task. Ingest, the engine runner, and the
//! health monitor are independent cooperative tasks; a single-slot channel
//! carries frames from ingest to the engine. Suspension only happens at I/O
//! (channel recv/send, socket read/write, sleeps) — never inside `infer`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message as WsMessage;

use coach_core::engine::CoachingEngine;
use coach_core::landmark::RawFrame;

use crate::config::{DaemonConfig, OverflowPolicy};
use crate::sink::SessionSink;
use crate::wire::parse_frame;

/// Running counts for the periodic overflow/health diagnostic (§5).
#[derive(Debug, Default)]
pub struct HealthCounters {
    pub processed: AtomicU64,
    pub dropped: AtomicU64,
    pub throttled: AtomicU64,
    pub idle_intervals: AtomicU64,
    pub reconnects: AtomicU64,
    pub parse_errors: AtomicU64,
}

/// Shared state the HTTP layer reads for `/status` and hands new
/// subscribers into.
pub struct FanoutState {
    pub payload_tx: broadcast::Sender<Arc<str>>,
    pub health: Arc<HealthCounters>,
    pub exercise: String,
    pub started_at: std::time::Instant,
}

/// Spawns the ingest, engine-runner, and health-monitor tasks. Returns the
/// shared state the HTTP layer uses to hand out subscriptions.
pub fn spawn(
    config: DaemonConfig,
    engine: CoachingEngine,
    sink: Option<Arc<SessionSink>>,
) -> (Arc<FanoutState>, Vec<tokio::task::JoinHandle<()>>) {
    let (payload_tx, _) = broadcast::channel(1024);
    let health = Arc::new(HealthCounters::default());
    let state = Arc::new(FanoutState {
        payload_tx: payload_tx.clone(),
        health: health.clone(),
        exercise: config.exercise.clone(),
        started_at: std::time::Instant::now(),
    });

    let (frame_tx, frame_rx) = mpsc::channel::<RawFrame>(1);

    let ingest_handle = tokio::spawn(ingest_loop(
        config.ingest_url.clone(),
        frame_tx,
        config.overflow_policy,
        health.clone(),
        config.engine.ingest_max_fps,
    ));

    let engine_handle = tokio::spawn(engine_loop(engine, frame_rx, payload_tx, sink, health.clone()));

    let monitor_handle = tokio::spawn(health_monitor(
        health.clone(),
        Duration::from_secs(config.health_report_interval_sec.max(1)),
    ));

    (state, vec![ingest_handle, engine_handle, monitor_handle])
}

/// Connects to the upstream pose source as a WebSocket client and feeds
/// decoded frames into the single-slot channel. On transport error or
/// timeout, sleeps for the reconnect delay and retries indefinitely.
async fn ingest_loop(
    url: String,
    frame_tx: mpsc::Sender<RawFrame>,
    overflow: OverflowPolicy,
    health: Arc<HealthCounters>,
    ingest_max_fps: f32,
) {
    let reconnect_delay = Duration::from_secs_f64(coach_core::EngineConfig::default().reconnect_delay_sec);
    let min_frame_interval = if ingest_max_fps > 0.0 {
        Some(Duration::from_secs_f64(1.0 / ingest_max_fps as f64))
    } else {
        None
    };
    let mut last_accepted: Option<tokio::time::Instant> = None;
    loop {
        match tokio_tungstenite::connect_async(&url).await {
            Ok((stream, _)) => {
                tracing::info!(url = %url, "ingest connected");
                let (mut write, mut read) = stream.split();
                loop {
                    let msg = tokio::time::timeout(Duration::from_secs(30), read.next()).await;
                    let msg = match msg {
                        Ok(Some(Ok(m))) => m,
                        Ok(Some(Err(e))) => {
                            tracing::warn!(error = %e, "ingest read error, reconnecting");
                            break;
                        }
                        Ok(None) => {
                            tracing::warn!("ingest stream closed, reconnecting");
                            break;
                        }
                        Err(_) => {
                            tracing::warn!("ingest read timeout, reconnecting");
                            break;
                        }
                    };
                    match msg {
                        WsMessage::Text(text) => match parse_frame(&text) {
                            Ok((_exercise, frame)) => {
                                let now = tokio::time::Instant::now();
                                let too_fast = match (min_frame_interval, last_accepted) {
                                    (Some(min_interval), Some(prev)) => now.duration_since(prev) < min_interval,
                                    _ => false,
                                };
                                if too_fast {
                                    health.throttled.fetch_add(1, Ordering::Relaxed);
                                    continue;
                                }
                                last_accepted = Some(now);
                                match overflow {
                                    OverflowPolicy::DropOnBusy => match frame_tx.try_send(frame) {
                                        Ok(()) => {}
                                        Err(mpsc::error::TrySendError::Full(_)) => {
                                            health.dropped.fetch_add(1, Ordering::Relaxed);
                                        }
                                        Err(mpsc::error::TrySendError::Closed(_)) => return,
                                    },
                                    OverflowPolicy::QueueDepthOne => {
                                        if frame_tx.send(frame).await.is_err() {
                                            return;
                                        }
                                    }
                                }
                            }
                            Err(e) => {
                                health.parse_errors.fetch_add(1, Ordering::Relaxed);
                                tracing::debug!(error = %e, "dropping malformed frame");
                            }
                        },
                        WsMessage::Ping(payload) => {
                            let _ = write.send(WsMessage::Pong(payload)).await;
                        }
                        WsMessage::Close(_) => {
                            tracing::info!("ingest closed by peer, reconnecting");
                            break;
                        }
                        _ => {}
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, url = %url, "ingest connect failed, retrying");
            }
        }
        health.reconnects.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(reconnect_delay).await;
    }
}

/// Pulls frames off the single-slot channel, drives the engine to
/// completion for each one, and broadcasts the resulting JSON payload.
/// Exactly one frame is in flight at a time, per §5.
async fn engine_loop(
    engine: CoachingEngine,
    mut frame_rx: mpsc::Receiver<RawFrame>,
    payload_tx: broadcast::Sender<Arc<str>>,
    sink: Option<Arc<SessionSink>>,
    health: Arc<HealthCounters>,
) {
    let engine = Mutex::new(engine);
    while let Some(frame) = frame_rx.recv().await {
        let ts_ms = frame.timestamp_ms;
        let payload = {
            let mut guard = engine.lock();
            guard.infer(&frame, ts_ms)
        };
        health.processed.fetch_add(1, Ordering::Relaxed);
        if let Some(sink) = &sink {
            sink.record(&payload);
        }
        match serde_json::to_string(&payload) {
            Ok(json) => {
                // No receivers is not an error: a dead subscriber must not
                // block publication to the others, and publication with
                // zero subscribers is the common case between dashboard
                // connects.
                let _ = payload_tx.send(Arc::from(json.as_str()));
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize coaching payload"),
        }
    }
}

async fn health_monitor(health: Arc<HealthCounters>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    let mut last_processed = 0_u64;
    loop {
        ticker.tick().await;
        let processed = health.processed.load(Ordering::Relaxed);
        let dropped = health.dropped.load(Ordering::Relaxed);
        let throttled = health.throttled.load(Ordering::Relaxed);
        if processed == last_processed {
            health.idle_intervals.fetch_add(1, Ordering::Relaxed);
        }
        last_processed = processed;
        tracing::info!(processed, dropped, throttled, "fanout health");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_counters_start_at_zero() {
        let h = HealthCounters::default();
        assert_eq!(h.processed.load(Ordering::Relaxed), 0);
        assert_eq!(h.dropped.load(Ordering::Relaxed), 0);
    }

    /// Scenario 7 (core mechanism): a subscriber that falls behind the
    /// broadcast channel's capacity observes `Lagged` rather than blocking
    /// publication to the other subscribers, and a well-behaved subscriber
    /// receives every payload it reads in order.
    #[tokio::test]
    async fn lagging_subscriber_is_disconnected_others_keep_up() {
        let (tx, _) = broadcast::channel::<Arc<str>>(16);
        let mut keeper = tx.subscribe();
        let mut straggler = tx.subscribe();

        for i in 0..1000 {
            tx.send(Arc::from(i.to_string().as_str())).unwrap();
            // The keeper drains every message; the straggler never reads
            // until the end, so it overflows the 16-slot buffer well before
            // the loop finishes.
            let mut last = None;
            while let Ok(v) = keeper.try_recv() {
                last = Some(v);
            }
            if let Some(v) = last {
                assert_eq!(&*v, i.to_string().as_str());
            }
        }

        assert!(matches!(
            straggler.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(_))
        ));
    }
}
