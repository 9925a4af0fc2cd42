use crate::models::edit::{Edit, RawEdit};
use crate::models::ValidationError;

/// Ordered, short-circuiting filter chain (spec.md §4.1 "Filters (applied in
/// order, short-circuit)"). Rate limiting is deliberately not here — it's
/// stateful and shared across the whole stream, so `ingest::run` applies
/// `rate_limiter::TokenBucket` as the final step once a candidate survives
/// these.
pub struct Filters {
    allowed_types: Vec<String>,
    exclude_bots: bool,
    allowed_languages: Vec<String>,
    max_clock_skew_secs: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Validation,
    Type,
    Bot,
    Language,
}

impl DropReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DropReason::Validation => "validation",
            DropReason::Type => "type",
            DropReason::Bot => "bot",
            DropReason::Language => "language",
        }
    }
}

impl Filters {
    pub fn new(allowed_languages: Vec<String>, exclude_bots: bool) -> Self {
        Self {
            allowed_types: vec!["edit".to_string(), "new".to_string()],
            exclude_bots,
            allowed_languages,
            max_clock_skew_secs: 300,
        }
    }

    /// Runs `raw` through validation, type whitelist, bot exclusion, and
    /// language whitelist, in that order (spec.md §4.1 "Filters (applied in
    /// order, short-circuit)"). Returns the validated `Edit` on success or
    /// the first failing reason.
    pub fn apply(&self, raw: RawEdit, now: i64) -> Result<Edit, DropReason> {
        let edit = Edit::from_raw(raw, now, self.max_clock_skew_secs).map_err(|_: ValidationError| DropReason::Validation)?;

        if !self.allowed_types.iter().any(|t| t == &edit.kind) {
            return Err(DropReason::Type);
        }
        if self.exclude_bots && edit.bot {
            return Err(DropReason::Bot);
        }
        if !self.allowed_languages.is_empty() && !self.allowed_languages.iter().any(|l| l == &edit.language) {
            return Err(DropReason::Language);
        }

        Ok(edit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(kind: &str, bot: bool, wiki: &str) -> RawEdit {
        RawEdit {
            id: 1,
            kind: kind.into(),
            title: "Rust".into(),
            user: "Alice".into(),
            bot,
            wiki: wiki.into(),
            server_url: "https://en.wikipedia.org".into(),
            timestamp: 1000,
            length: None,
            revision: None,
            comment: "".into(),
        }
    }

    #[test]
    fn drops_disallowed_type() {
        let filters = Filters::new(vec![], false);
        assert_eq!(filters.apply(raw("log", false, "enwiki"), 1000), Err(DropReason::Type));
    }

    #[test]
    fn drops_bots_when_configured() {
        let filters = Filters::new(vec![], true);
        assert_eq!(filters.apply(raw("edit", true, "enwiki"), 1000), Err(DropReason::Bot));
    }

    #[test]
    fn allows_bots_by_default() {
        let filters = Filters::new(vec![], false);
        assert!(filters.apply(raw("edit", true, "enwiki"), 1000).is_ok());
    }

    #[test]
    fn drops_disallowed_language() {
        let filters = Filters::new(vec!["de".into()], false);
        assert_eq!(filters.apply(raw("edit", false, "enwiki"), 1000), Err(DropReason::Language));
    }

    #[test]
    fn empty_language_list_allows_all() {
        let filters = Filters::new(vec![], false);
        assert!(filters.apply(raw("edit", false, "enwiki"), 1000).is_ok());
    }
}
