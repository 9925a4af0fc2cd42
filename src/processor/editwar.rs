use std::sync::Arc;

use tracing::instrument;

use crate::config::Config;
use crate::error::PipelineError;
use crate::models::alert::{editwar_severity, AlertKind, AlertPayload, AlertRecord, EditWarPayload};
use crate::models::Edit;
use crate::store::KvStore;

/// TTL for per-editor participation and the changes list (spec.md §3
/// "Edit-war state ... expires 10 minutes after last activity").
const ACTIVITY_TTL_SECS: i64 = 600;
/// TTL for the "war active" marker once recognised (spec.md §3 "marker key
/// persists 1 hour").
const MARKER_TTL_SECS: i64 = 3600;
/// Cap on the recent signed byte-change list (spec.md §3 "capped at ~20").
const MAX_CHANGES: usize = 20;
/// Minimum distinct editors to recognise a war (spec.md §4.6).
const MIN_EDITORS: usize = 2;
/// Minimum sign-reversal transitions to recognise a war (spec.md §4.6).
const MIN_SIGN_REVERSALS: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct EditWarStatus {
    pub active: bool,
    /// Marker present but the editor map has expired — historical, not
    /// live (spec.md §4.6 "Expiry / history").
    pub historical: bool,
    pub editor_count: u32,
    pub edit_count: u32,
    pub revert_count: u32,
}

pub struct EditWarDetector {
    kv: Arc<dyn KvStore>,
    edit_war_enabled: bool,
}

impl EditWarDetector {
    pub fn new(kv: Arc<dyn KvStore>, config: &Config) -> Self {
        Self { kv, edit_war_enabled: config.edit_war_enabled }
    }

    fn editors_key(page_key: &str) -> String {
        format!("editwar:editors:{page_key}")
    }
    fn changes_key(page_key: &str) -> String {
        format!("editwar:changes:{page_key}")
    }
    fn marker_key(page_key: &str) -> String {
        format!("editwar:{page_key}")
    }

    /// Records one edit on a hot page and, if a war is newly recognised,
    /// emits an `alerts:editwars` record. Returns `Some(alert)` only on the
    /// transition into "active" (spec.md §4.6 "On first recognition").
    #[instrument(skip(self, edit), fields(page = %edit.page_key()))]
    pub async fn record_edit(&self, edit: &Edit, now: i64) -> Result<Option<AlertRecord>, PipelineError> {
        if !self.edit_war_enabled {
            return Ok(None);
        }
        let page_key = edit.page_key();

        self.kv
            .editwar_record(&Self::editors_key(&page_key), &Self::changes_key(&page_key), &edit.user, edit.byte_change, MAX_CHANGES, ACTIVITY_TTL_SECS)
            .await?;

        let already_marked = self.kv.exists(&Self::marker_key(&page_key)).await?;
        if already_marked {
            return Ok(None);
        }

        let status = self.status(&page_key).await?;
        if status.editor_count as usize >= MIN_EDITORS && status.revert_count as usize >= MIN_SIGN_REVERSALS {
            self.kv.set_ex(&Self::marker_key(&page_key), "1", MARKER_TTL_SECS).await?;

            let severity = editwar_severity(status.editor_count, status.edit_count, status.revert_count);
            let alert = AlertRecord {
                id: now as u64,
                kind: AlertKind::EditWar,
                timestamp: now,
                payload: AlertPayload::EditWar(EditWarPayload {
                    page: edit.title.clone(),
                    wiki: edit.wiki.clone(),
                    participants: status.editor_count,
                    edit_count: status.edit_count,
                    revert_count: status.revert_count,
                    severity,
                    timestamp: now,
                }),
            };
            crate::alerts::publish(&*self.kv, &alert).await?;
            return Ok(Some(alert));
        }

        Ok(None)
    }

    /// `(editor_count, edit_count, revert_count)` plus active/historical
    /// status for a page (spec.md §4.6 "Expiry / history").
    pub async fn status(&self, page_key: &str) -> Result<EditWarStatus, PipelineError> {
        let editors = self.kv.hgetall(&Self::editors_key(page_key)).await?;
        let editor_count = editors.len() as u32;
        let edit_count: u32 = editors.values().filter_map(|v| v.parse::<u32>().ok()).sum();

        let raw_changes = self.kv.lrange(&Self::changes_key(page_key), 0, MAX_CHANGES as isize - 1).await?;
        let changes: Vec<i64> = raw_changes.iter().filter_map(|v| v.parse().ok()).collect();
        let reverts = count_sign_reversals(&changes);

        let marker_present = self.kv.exists(&Self::marker_key(page_key)).await?;
        let active = marker_present && editor_count as usize >= MIN_EDITORS && reverts as usize >= MIN_SIGN_REVERSALS;
        let historical = marker_present && !active;

        Ok(EditWarStatus { active, historical, editor_count, edit_count, revert_count: reverts })
    }
}

/// Counts adjacent sign reversals in a list of signed byte changes, newest
/// first (as stored by `KvStore::editwar_record`, which prepends).
/// `+50, -50, +50, -50` has 3 reversals.
pub fn count_sign_reversals(changes: &[i64]) -> u32 {
    let signs: Vec<i32> = changes.iter().filter(|c| **c != 0).map(|c| c.signum() as i32).collect();
    signs.windows(2).filter(|w| w[0] != w[1]).count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FakeKv;
    use clap::Parser;

    fn config() -> Config {
        Config::parse_from(["wikisurge"])
    }

    fn edit(user: &str, byte_change: i64) -> Edit {
        Edit {
            id: 1,
            kind: "edit".into(),
            title: "Y".into(),
            user: user.into(),
            bot: false,
            wiki: "enwiki".into(),
            server_url: "".into(),
            timestamp: 1000,
            length_old: 0,
            length_new: 0,
            revision_old: 0,
            revision_new: 0,
            comment: "".into(),
            byte_change,
            language: "en".into(),
        }
    }

    // Scenario 6 (spec.md §8): u1/u2 alternate +50/-50 within 10 min.
    #[tokio::test]
    async fn alternating_editors_trigger_edit_war() {
        let kv: Arc<dyn KvStore> = Arc::new(FakeKv::new());
        let detector = EditWarDetector::new(kv.clone(), &config());

        let mut alert = None;
        for (user, change) in [("u1", 50), ("u2", -50), ("u1", 50), ("u2", -50)] {
            let result = detector.record_edit(&edit(user, change), 1000).await.unwrap();
            if result.is_some() {
                alert = result;
            }
        }

        assert!(alert.is_some(), "edit war should be recognised");
        assert!(kv.exists("editwar:enwiki:Y").await.unwrap());
        assert_eq!(kv.xlen("alerts:editwars").await.unwrap(), 1);

        let status = detector.status("enwiki:Y").await.unwrap();
        assert!(status.active);
        assert_eq!(status.editor_count, 2);
    }

    #[test]
    fn counts_alternating_sign_reversals() {
        // newest-first, matching LPUSH order: -50, +50, -50, +50
        let changes = vec![-50, 50, -50, 50];
        assert_eq!(count_sign_reversals(&changes), 3);
    }

    #[test]
    fn no_reversal_when_all_same_sign() {
        assert_eq!(count_sign_reversals(&[10, 20, 30]), 0);
    }

    #[test]
    fn zeros_are_ignored() {
        assert_eq!(count_sign_reversals(&[10, 0, -10]), 1);
    }
}
