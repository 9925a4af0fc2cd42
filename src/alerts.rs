use crate::error::PipelineError;
use crate::models::alert::AlertRecord;
use crate::store::KvStore;

/// Cap on each alert stream's length (spec.md §3 "streams are length-bounded
/// (~10 000)"). Trimming is approximate, per spec.md §8.
pub const STREAM_MAXLEN: usize = 10_000;

/// Appends one alert to its kind's stream and opportunistically trims it,
/// shared by every detector that emits alerts (spike, edit-war; trending
/// and vandalism reuse the same helper once they have a caller).
pub async fn publish(kv: &dyn KvStore, alert: &AlertRecord) -> Result<(), PipelineError> {
    let stream_key = alert.kind.stream_key();
    let payload = serde_json::to_string(&alert.payload)
        .map_err(|e| PipelineError::Invariant(format!("alert payload not serializable: {e}")))?;

    kv.xadd(
        stream_key,
        &[
            ("id", alert.id.to_string()),
            ("kind", format!("{:?}", alert.kind)),
            ("timestamp", alert.timestamp.to_string()),
            ("data", payload),
        ],
    )
    .await?;

    kv.xtrim_maxlen(stream_key, STREAM_MAXLEN).await?;
    crate::metrics::prometheus::counters::alerts_emitted_total(kind_label(alert.kind));
    Ok(())
}

fn kind_label(kind: crate::models::alert::AlertKind) -> &'static str {
    use crate::models::alert::AlertKind;
    match kind {
        AlertKind::Spike => "spike",
        AlertKind::EditWar => "edit_war",
        AlertKind::Trending => "trending",
        AlertKind::Vandalism => "vandalism",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::alert::{AlertKind, AlertPayload, Severity, SpikePayload};
    use crate::store::FakeKv;

    #[tokio::test]
    async fn publish_appends_to_kind_stream() {
        let kv = FakeKv::new();
        let alert = AlertRecord {
            id: 1,
            kind: AlertKind::Spike,
            timestamp: 1000,
            payload: AlertPayload::Spike(SpikePayload {
                page: "X".into(),
                wiki: "enwiki".into(),
                ratio: 20.0,
                edit_count: 20,
                severity: Severity::High,
                timestamp: 1000,
            }),
        };
        publish(&kv, &alert).await.unwrap();
        assert_eq!(kv.xlen("alerts:spikes").await.unwrap(), 1);
    }
}
