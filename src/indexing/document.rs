use chrono::{TimeZone, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::models::Edit;

/// One per indexed edit (spec.md §3 "Indexed document"). The id is
/// content-addressed from immutable edit fields only — no wall-clock
/// component — so replaying the same edit twice indexes the same document
/// (spec.md §9 "Document ids must be derived solely from immutable edit
/// fields").
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IndexedDocument {
    #[serde(skip)]
    pub id: String,
    #[serde(skip)]
    pub index_name: String,
    pub title: String,
    pub wiki: String,
    pub language: String,
    pub user: String,
    pub bot: bool,
    pub byte_change: i64,
    pub timestamp: i64,
    pub indexed_reason: String,
}

impl IndexedDocument {
    pub fn new(edit: &Edit, indexed_reason: impl Into<String>) -> Self {
        Self {
            id: document_id(edit),
            index_name: index_name(edit.timestamp),
            title: edit.title.clone(),
            wiki: edit.wiki.clone(),
            language: edit.language.clone(),
            user: edit.user.clone(),
            bot: edit.bot,
            byte_change: edit.byte_change,
            timestamp: edit.timestamp,
            indexed_reason: indexed_reason.into(),
        }
    }
}

/// `sha256(wiki:title:revision_new:edit_id)`, hex-encoded. All inputs are
/// immutable, source-assigned fields, so the same edit always yields the
/// same id regardless of when it's (re)indexed.
pub fn document_id(edit: &Edit) -> String {
    let mut hasher = Sha256::new();
    hasher.update(edit.wiki.as_bytes());
    hasher.update(b":");
    hasher.update(edit.title.as_bytes());
    hasher.update(b":");
    hasher.update(edit.revision_new.to_le_bytes());
    hasher.update(b":");
    hasher.update(edit.id.to_le_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)
}

/// `wikipedia-edits-YYYY-MM-DD`, date-routed from the edit's own timestamp,
/// UTC (spec.md §4.8 "Index routing").
pub fn index_name(timestamp: i64) -> String {
    let dt = Utc.timestamp_opt(timestamp, 0).single().unwrap_or_else(Utc::now);
    format!("wikipedia-edits-{}", dt.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edit(id: i64, title: &str) -> Edit {
        Edit {
            id,
            kind: "edit".into(),
            title: title.into(),
            user: "Alice".into(),
            bot: false,
            wiki: "enwiki".into(),
            server_url: "".into(),
            timestamp: 1_700_000_000,
            length_old: 0,
            length_new: 10,
            revision_old: 0,
            revision_new: 42,
            comment: "".into(),
            byte_change: 10,
            language: "en".into(),
        }
    }

    #[test]
    fn document_id_is_deterministic() {
        let e = edit(1, "Rust");
        assert_eq!(document_id(&e), document_id(&e));
    }

    #[test]
    fn different_edits_get_different_ids() {
        assert_ne!(document_id(&edit(1, "Rust")), document_id(&edit(2, "Rust")));
    }

    #[test]
    fn index_name_is_date_routed() {
        assert_eq!(index_name(1_700_000_000), "wikipedia-edits-2023-11-14");
    }
}
