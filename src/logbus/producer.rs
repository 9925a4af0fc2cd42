use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use tracing::debug;

use crate::breaker::{CircuitBreaker, Permit};
use crate::error::PipelineError;
use crate::logbus::message::EditMessage;
use crate::models::Edit;

/// Send deadline for one produce call (spec.md §5 "ingestion write ~2 s").
const SEND_TIMEOUT: Duration = Duration::from_secs(2);
const BREAKER_FAILURE_THRESHOLD: u32 = 5;
const BREAKER_COOLDOWN: Duration = Duration::from_secs(30);

/// Non-blocking hand-off to Kafka's own batching queue (spec.md §4.2
/// "Contract (producer)"). Batching itself is librdkafka's native
/// `linger.ms`/`batch.size`, not hand-rolled — the producer only decides
/// what to do when that internal queue is full.
pub struct EditProducer {
    producer: FutureProducer,
    topic: String,
    breaker: CircuitBreaker,
}

impl EditProducer {
    pub fn new(brokers: &str, topic: &str) -> Result<Self, PipelineError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("queue.buffering.max.ms", "50")
            .set("queue.buffering.max.messages", "100000")
            .set("compression.type", "lz4")
            .create()
            .map_err(|e| PipelineError::permanent("kafka_producer", e))?;

        Ok(Self { producer, topic: topic.to_string(), breaker: CircuitBreaker::new("log_producer", BREAKER_FAILURE_THRESHOLD, BREAKER_COOLDOWN) })
    }

    /// Publishes one validated edit, keyed by title (spec.md §4.2
    /// "Partitioning key = title"). On a full producer queue the message is
    /// dropped rather than retried (spec.md §4.1 "drop-newest"): we race the
    /// librdkafka send against `SEND_TIMEOUT` and treat a timeout as
    /// backpressure, not a transient failure worth retrying here. An open
    /// breaker (spec.md §5 "Circuit breakers & retry") short-circuits to
    /// backpressure without touching the network.
    pub async fn produce(&self, edit: &Edit) -> Result<(), PipelineError> {
        if self.breaker.check() == Permit::Denied {
            return Err(PipelineError::Backpressure("log_producer"));
        }

        let msg = EditMessage::from_edit(edit).map_err(|e| PipelineError::Invariant(format!("edit not serializable: {e}")))?;

        let headers = rdkafka::message::OwnedHeaders::new().insert(rdkafka::message::Header { key: "wiki", value: Some(&msg.wiki) }).insert(rdkafka::message::Header { key: "language", value: Some(&msg.language) });

        let record = FutureRecord::to(&self.topic).key(&msg.key).payload(&msg.payload).headers(headers);

        match self.producer.send(record, SEND_TIMEOUT).await {
            Ok(_) => {
                self.breaker.record_success();
                Ok(())
            }
            Err((rdkafka::error::KafkaError::MessageProduction(rdkafka::types::RDKafkaErrorCode::QueueFull), _)) => {
                debug!(page = %edit.page_key(), "producer queue full, dropping edit");
                Err(PipelineError::Backpressure("log_producer"))
            }
            Err((e, _)) => {
                self.breaker.record_failure();
                Err(PipelineError::transient("kafka_producer", e))
            }
        }
    }
}
