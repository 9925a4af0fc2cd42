use crate::models::Edit;

/// Canonical log value (spec.md §4.1 "Publication"): key = title, value =
/// canonical JSON of the validated edit, headers carry `wiki` and
/// `language`.
pub struct EditMessage {
    pub key: String,
    pub payload: Vec<u8>,
    pub wiki: String,
    pub language: String,
}

impl EditMessage {
    pub fn from_edit(edit: &Edit) -> Result<Self, serde_json::Error> {
        Ok(Self {
            key: edit.title.clone(),
            payload: serde_json::to_vec(edit)?,
            wiki: edit.wiki.clone(),
            language: edit.language.clone(),
        })
    }

    pub fn decode(payload: &[u8]) -> Result<Edit, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_edit() -> Edit {
        Edit {
            id: 1,
            kind: "edit".into(),
            title: "Rust".into(),
            user: "Alice".into(),
            bot: false,
            wiki: "enwiki".into(),
            server_url: "".into(),
            timestamp: 1000,
            length_old: 0,
            length_new: 10,
            revision_old: 0,
            revision_new: 1,
            comment: "".into(),
            byte_change: 10,
            language: "en".into(),
        }
    }

    #[test]
    fn round_trips_through_json() {
        let edit = sample_edit();
        let msg = EditMessage::from_edit(&edit).unwrap();
        assert_eq!(msg.key, "Rust");
        assert_eq!(msg.wiki, "enwiki");
        let decoded = EditMessage::decode(&msg.payload).unwrap();
        assert_eq!(decoded, edit);
    }
}
