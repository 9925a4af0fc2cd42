use std::time::Duration;

use futures::StreamExt;
use reqwest_eventsource::{Event as SseEvent, EventSource};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::ingest::stats::IngestStats;
use crate::models::edit::RawEdit;

const USER_AGENT: &str = concat!("wikisurge/", env!("CARGO_PKG_VERSION"));
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Long-lived subscription to the upstream recentchange SSE endpoint
/// (spec.md §4.1 "Responsibility"). Grounded directly on
/// `wiki-otel-bridge::wiki::connect`: same `EventSource::new`,
/// `SseEvent::Open`/`Message`/`StreamEnded` matching, same doubling backoff
/// reset on a clean event.
pub struct SseClient {
    url: String,
    initial_backoff: Duration,
}

impl SseClient {
    pub fn new(url: impl Into<String>, initial_backoff: Duration) -> Self {
        Self { url: url.into(), initial_backoff }
    }

    /// Runs the reconnect loop until `cancel` fires. Parsed edits (still raw,
    /// pre-filter) are sent on `tx`; the receiver end applies the filter
    /// chain and rate limiter.
    pub async fn run(&self, tx: mpsc::Sender<RawEdit>, stats: &IngestStats, cancel: CancellationToken) {
        let mut backoff = self.initial_backoff;
        loop {
            if cancel.is_cancelled() {
                return;
            }

            match self.connect_once(&tx, stats, &cancel).await {
                Ok(()) => {
                    if cancel.is_cancelled() {
                        return;
                    }
                    backoff = self.initial_backoff;
                    warn!("recentchange stream disconnected, reconnecting");
                    stats.record_reconnect();
                }
                Err(e) => {
                    error!(error = %e, backoff_secs = backoff.as_secs(), "recentchange stream error, retrying");
                    stats.record_reconnect();
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = cancel.cancelled() => return,
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    async fn connect_once(&self, tx: &mpsc::Sender<RawEdit>, stats: &IngestStats, cancel: &CancellationToken) -> anyhow::Result<()> {
        info!(url = %self.url, "connecting to recentchange stream");
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        let mut es = EventSource::new(client.get(&self.url))?;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    es.close();
                    return Ok(());
                }
                event = es.next() => {
                    match event {
                        None => return Ok(()),
                        Some(Ok(SseEvent::Open)) => {
                            info!("connected to recentchange stream");
                        }
                        Some(Ok(SseEvent::Message(msg))) => {
                            match serde_json::from_str::<RawEdit>(&msg.data) {
                                Ok(raw) => {
                                    if tx.send(raw).await.is_err() {
                                        info!("receiver dropped, stopping SSE reader");
                                        return Ok(());
                                    }
                                }
                                Err(e) => {
                                    debug!(error = %e, "failed to parse SSE payload as RawEdit");
                                    stats.record_parse_error();
                                }
                            }
                        }
                        Some(Err(reqwest_eventsource::Error::StreamEnded)) => {
                            return Ok(());
                        }
                        Some(Err(e)) => {
                            es.close();
                            return Err(anyhow::anyhow!("SSE connection error: {e}"));
                        }
                    }
                }
            }
        }
    }
}
