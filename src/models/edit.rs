use serde::{Deserialize, Serialize};

/// Shape of one `data:` line from the Wikimedia recentchange SSE stream.
/// Only the fields WikiSurge actually consumes are deserialized; the rest
/// of the upstream payload is discarded at the parse boundary.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEdit {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub bot: bool,
    pub wiki: String,
    #[serde(default)]
    pub server_url: String,
    pub timestamp: i64,
    #[serde(default)]
    pub length: Option<LengthDelta>,
    #[serde(default)]
    pub revision: Option<RevisionDelta>,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LengthDelta {
    pub old: Option<i64>,
    pub new: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RevisionDelta {
    pub old: Option<i64>,
    pub new: Option<i64>,
}

/// A `RawEdit` that has passed the ingestor's validation filter (§4.1 rule 1):
/// non-zero id, non-empty title, and the derived fields the rest of the
/// pipeline relies on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edit {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub user: String,
    pub bot: bool,
    pub wiki: String,
    pub server_url: String,
    pub timestamp: i64,
    pub length_old: i64,
    pub length_new: i64,
    pub revision_old: i64,
    pub revision_new: i64,
    pub comment: String,
    /// `length_new - length_old`, computed once at validation time.
    pub byte_change: i64,
    /// Two-letter prefix of `wiki`, with a same-as-wiki fallback (see
    /// SPEC_FULL.md §3 "Language derivation").
    pub language: String,
}

/// Errors produced while turning a `RawEdit` into a validated `Edit`.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("non-positive edit id: {0}")]
    BadId(i64),
    #[error("empty title")]
    EmptyTitle,
    #[error("timestamp {0} outside sanity window")]
    BadTimestamp(i64),
}

/// Derives a two-letter language code from a wiki code. `enwiki` → `en`,
/// `dewikivoyage` → `de`. Wikis with no two-letter prefix (e.g. `commonswiki`,
/// `wikidatawiki`) fall back to the wiki code itself, per the Open Question
/// resolved in SPEC_FULL.md §3. This function is the single place both the
/// ingestor's language filter and the indexer's document schema call into,
/// so the rule is applied consistently everywhere.
pub fn derive_language(wiki: &str) -> String {
    const NON_LANGUAGE_PREFIXES: &[&str] = &["commons", "wikidata", "species", "meta", "incubator"];
    for prefix in NON_LANGUAGE_PREFIXES {
        if wiki.starts_with(prefix) {
            return wiki.to_string();
        }
    }
    if wiki.len() >= 2 && wiki.as_bytes()[..2].iter().all(|b| b.is_ascii_alphabetic()) {
        wiki[..2].to_string()
    } else {
        wiki.to_string()
    }
}

impl Edit {
    /// Validates and normalizes a `RawEdit`. `now` is injected so callers
    /// (and tests) control the sanity-window check deterministically.
    pub fn from_raw(raw: RawEdit, now: i64, max_clock_skew_secs: i64) -> Result<Self, ValidationError> {
        if raw.id <= 0 {
            return Err(ValidationError::BadId(raw.id));
        }
        if raw.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        if (raw.timestamp - now).abs() > max_clock_skew_secs {
            return Err(ValidationError::BadTimestamp(raw.timestamp));
        }

        let length_old = raw.length.as_ref().and_then(|l| l.old).unwrap_or(0);
        let length_new = raw.length.as_ref().and_then(|l| l.new).unwrap_or(length_old);
        let revision_old = raw.revision.as_ref().and_then(|r| r.old).unwrap_or(0);
        let revision_new = raw.revision.as_ref().and_then(|r| r.new).unwrap_or(0);

        let language = if !raw.wiki.is_empty() {
            derive_language(&raw.wiki)
        } else {
            derive_language(&raw.server_url)
        };

        Ok(Edit {
            id: raw.id,
            kind: raw.kind,
            title: raw.title,
            user: raw.user,
            bot: raw.bot,
            wiki: raw.wiki,
            server_url: raw.server_url,
            timestamp: raw.timestamp,
            length_old,
            length_new,
            revision_old,
            revision_new,
            comment: raw.comment,
            byte_change: length_new - length_old,
            language,
        })
    }

    /// Key used to partition the log and to scope per-page KV state:
    /// `{wiki}:{title}`.
    pub fn page_key(&self) -> String {
        format!("{}:{}", self.wiki, self.title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_raw(id: i64, title: &str, ts: i64) -> RawEdit {
        RawEdit {
            id,
            kind: "edit".into(),
            title: title.into(),
            user: "Alice".into(),
            bot: false,
            wiki: "enwiki".into(),
            server_url: "https://en.wikipedia.org".into(),
            timestamp: ts,
            length: Some(LengthDelta { old: Some(100), new: Some(150) }),
            revision: Some(RevisionDelta { old: Some(1), new: Some(2) }),
            comment: "typo fix".into(),
        }
    }

    #[test]
    fn rejects_non_positive_id() {
        let raw = sample_raw(0, "Rust", 1000);
        assert_eq!(Edit::from_raw(raw, 1000, 300), Err(ValidationError::BadId(0)));
    }

    #[test]
    fn rejects_empty_title() {
        let raw = sample_raw(1, "   ", 1000);
        assert_eq!(Edit::from_raw(raw, 1000, 300), Err(ValidationError::EmptyTitle));
    }

    #[test]
    fn rejects_stale_timestamp() {
        let raw = sample_raw(1, "Rust", 0);
        assert_eq!(Edit::from_raw(raw, 10_000, 300), Err(ValidationError::BadTimestamp(0)));
    }

    #[test]
    fn computes_byte_change_and_language() {
        let raw = sample_raw(42, "Rust (programming language)", 1000);
        let edit = Edit::from_raw(raw, 1000, 300).unwrap();
        assert_eq!(edit.byte_change, 50);
        assert_eq!(edit.language, "en");
        assert_eq!(edit.page_key(), "enwiki:Rust (programming language)");
    }

    #[test]
    fn language_derivation_falls_back_for_non_language_wikis() {
        assert_eq!(derive_language("commonswiki"), "commonswiki");
        assert_eq!(derive_language("enwiki"), "en");
        assert_eq!(derive_language("dewikivoyage"), "de");
    }
}
