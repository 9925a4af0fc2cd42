use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::breaker::{CircuitBreaker, Permit};
use crate::error::PipelineError;
use crate::indexing::document::IndexedDocument;

const BULK_TIMEOUT: Duration = Duration::from_secs(30);
const BREAKER_FAILURE_THRESHOLD: u32 = 5;
const BREAKER_COOLDOWN: Duration = Duration::from_secs(30);
/// Retry budget for one flush (spec.md §7 "retry with backoff; beyond
/// budget, fail the operation").
const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Debug, Default)]
pub struct IndexerStats {
    pub indexed: AtomicU64,
    pub failed: AtomicU64,
    pub dropped_buffer_full: AtomicU64,
}

impl IndexerStats {
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.indexed.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            self.dropped_buffer_full.load(Ordering::Relaxed),
        )
    }
}

/// Bounded handoff from the indexing strategy to the bulk-flush background
/// task (spec.md §4.8 "a bounded channel accepts documents"). Cloning the
/// handle is cheap; every consumer task shares one channel and one stats
/// block.
#[derive(Clone)]
pub struct DocumentIndexer {
    tx: mpsc::Sender<IndexedDocument>,
    stats: std::sync::Arc<IndexerStats>,
}

impl DocumentIndexer {
    /// Spawns the background flush loop and returns a handle plus the
    /// stats block callers can snapshot for `/metrics`.
    pub fn spawn(
        base_url: String,
        bulk_size: usize,
        flush_interval: Duration,
        channel_capacity: usize,
        cancel: CancellationToken,
    ) -> (Self, std::sync::Arc<IndexerStats>) {
        let (tx, rx) = mpsc::channel(channel_capacity);
        let stats = std::sync::Arc::new(IndexerStats::default());
        let task_stats = stats.clone();
        tokio::spawn(flush_loop(base_url, bulk_size, flush_interval, rx, task_stats, cancel));
        (Self { tx, stats: stats.clone() }, stats)
    }

    /// Enqueues a document for the next flush. On a full channel, the
    /// caller drops the edit and ticks a metric (spec.md §4.8 "On channel
    /// full, callers receive an error and the edit is dropped").
    pub fn enqueue(&self, doc: IndexedDocument) -> Result<(), PipelineError> {
        self.tx.try_send(doc).map_err(|_| {
            self.stats.dropped_buffer_full.fetch_add(1, Ordering::Relaxed);
            crate::metrics::prometheus::counters::documents_dropped_total(1);
            PipelineError::Backpressure("document_indexer")
        })
    }
}

async fn flush_loop(
    base_url: String,
    bulk_size: usize,
    flush_interval: Duration,
    mut rx: mpsc::Receiver<IndexedDocument>,
    stats: std::sync::Arc<IndexerStats>,
    cancel: CancellationToken,
) {
    let client = Client::new();
    let mut buffer = Vec::with_capacity(bulk_size);
    let mut ticker = interval(flush_interval);
    let breaker = CircuitBreaker::new("document_index", BREAKER_FAILURE_THRESHOLD, BREAKER_COOLDOWN);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if !buffer.is_empty() {
                    flush(&client, &base_url, &mut buffer, &stats, &breaker).await;
                }
                return;
            }
            _ = ticker.tick() => {
                if !buffer.is_empty() {
                    flush(&client, &base_url, &mut buffer, &stats, &breaker).await;
                }
            }
            doc = rx.recv() => {
                match doc {
                    Some(doc) => {
                        buffer.push(doc);
                        if buffer.len() >= bulk_size {
                            flush(&client, &base_url, &mut buffer, &stats, &breaker).await;
                        }
                    }
                    None => {
                        if !buffer.is_empty() {
                            flush(&client, &base_url, &mut buffer, &stats, &breaker).await;
                        }
                        return;
                    }
                }
            }
        }
    }
}

/// Issues one `_bulk` request for the buffered documents, retrying
/// transient failures with backoff up to `MAX_ATTEMPTS` before giving up
/// (spec.md §7 "retry with backoff; beyond budget, fail the operation").
/// The buffer is only cleared on success or once the retry budget is
/// exhausted — never on an attempt that might still be retried. An open
/// breaker leaves the buffer intact without sending at all (spec.md §5
/// "Breaker open ⇒ degraded mode: ... indexing pauses (buffered until
/// full, then drops)") — the bounded channel upstream absorbs the backlog.
async fn flush(client: &Client, base_url: &str, buffer: &mut Vec<IndexedDocument>, stats: &IndexerStats, breaker: &CircuitBreaker) {
    if breaker.check() == Permit::Denied {
        return;
    }

    let mut body = String::new();
    for doc in buffer.iter() {
        let action = json!({"index": {"_index": doc.index_name, "_id": doc.id}});
        body.push_str(&action.to_string());
        body.push('\n');
        body.push_str(&serde_json::to_string(doc).unwrap_or_default());
        body.push('\n');
    }
    let url = format!("{base_url}/_bulk");

    for attempt in 1..=MAX_ATTEMPTS {
        let result = client.post(&url).header("content-type", "application/x-ndjson").body(body.clone()).timeout(BULK_TIMEOUT).send().await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                debug!(count = buffer.len(), attempt, "bulk flush succeeded");
                stats.indexed.fetch_add(buffer.len() as u64, Ordering::Relaxed);
                crate::metrics::prometheus::counters::documents_indexed_total(buffer.len() as u64);
                breaker.record_success();
                buffer.clear();
                return;
            }
            Ok(resp) => {
                warn!(status = %resp.status(), count = buffer.len(), attempt, "bulk flush rejected");
            }
            Err(e) => {
                warn!(error = %e, count = buffer.len(), attempt, "bulk flush failed");
            }
        }

        if attempt < MAX_ATTEMPTS {
            tokio::time::sleep(BASE_BACKOFF * attempt).await;
        }
    }

    warn!(count = buffer.len(), "bulk flush exhausted retry budget, dropping batch");
    stats.failed.fetch_add(buffer.len() as u64, Ordering::Relaxed);
    crate::metrics::prometheus::counters::documents_failed_total(buffer.len() as u64);
    breaker.record_failure();
    buffer.clear();
}
