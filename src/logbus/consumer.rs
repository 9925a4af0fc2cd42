use futures::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::indexing::{DocumentIndexer, IndexedDocument, IndexingStrategy};
use crate::logbus::message::EditMessage;
use crate::models::Edit;
use crate::processor::Processor;

/// Consumer-group wrapper in manual-commit mode (spec.md §4.2 "Offsets are
/// committed after the processor finishes the in-memory state updates for
/// the message"). One instance is spawned per partition's worth of work in
/// `main.rs`; `rdkafka`'s own group coordinator decides partition
/// assignment.
pub struct EditConsumer {
    consumer: StreamConsumer,
}

impl EditConsumer {
    pub fn new(brokers: &str, group_id: &str, topic: &str) -> Result<Self, PipelineError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| PipelineError::permanent("kafka_consumer", e))?;

        consumer.subscribe(&[topic]).map_err(|e| PipelineError::permanent("kafka_consumer", e))?;

        Ok(Self { consumer })
    }

    /// Drains the log, handing each decoded edit to `processor`, and commits
    /// the offset only after processing returns (at-least-once per spec.md
    /// §4.2). A poison message — one that fails JSON decoding — is counted
    /// and skipped, but its offset still advances (spec.md §4.2 "Poison
    /// messages").
    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        &self,
        processor: &Processor,
        indexing: &IndexingStrategy,
        indexer: &DocumentIndexer,
        now_fn: impl Fn() -> i64,
        cancel: CancellationToken,
    ) {
        let mut stream = self.consumer.stream();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                message = stream.next() => {
                    let Some(message) = message else { return };
                    let message = match message {
                        Ok(m) => m,
                        Err(e) => {
                            warn!(error = %e, "kafka consumer error");
                            continue;
                        }
                    };

                    let mut should_commit = true;
                    if let Some(payload) = message.payload() {
                        match EditMessage::decode(payload) {
                            Ok(edit) => {
                                if let Err(e) = self.process_one(&edit, processor, indexing, indexer, &now_fn).await {
                                    warn!(error = %e, page = %edit.page_key(), "failed to process edit, not committing offset");
                                    should_commit = false;
                                }
                            }
                            Err(e) => {
                                // Poison message: never decodes successfully on retry either,
                                // so the offset still advances (spec.md §4.2 "Poison messages").
                                debug!(error = %e, "dropping poison message");
                            }
                        }
                    }

                    if should_commit {
                        if let Err(e) = self.consumer.commit_message(&message, CommitMode::Async) {
                            warn!(error = %e, "failed to commit offset");
                        }
                    }
                }
            }
        }
    }

    async fn process_one(
        &self,
        edit: &Edit,
        processor: &Processor,
        indexing: &IndexingStrategy,
        indexer: &DocumentIndexer,
        now_fn: &impl Fn() -> i64,
    ) -> Result<(), PipelineError> {
        processor.process(edit, now_fn()).await?;

        let (should_index, reason) = indexing.should_index(edit).await?;
        if should_index {
            let doc = IndexedDocument::new(edit, reason);
            if let Err(e) = indexer.enqueue(doc) {
                warn!(error = %e, page = %edit.page_key(), "dropping edit, indexer buffer full");
            }
        }

        Ok(())
    }
}
