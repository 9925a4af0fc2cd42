use serde::{Deserialize, Serialize};

/// The four alert kinds named in spec.md §3. `Vandalism` has no producing
/// detector (spec.md §9 treats it as an extension point) but the variant
/// stays so the stream name and payload shape are reserved for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Spike,
    EditWar,
    Trending,
    Vandalism,
}

impl AlertKind {
    /// Name of the append-only stream this kind is recorded in.
    pub fn stream_key(self) -> &'static str {
        match self {
            AlertKind::Spike => "alerts:spikes",
            AlertKind::EditWar => "alerts:editwars",
            AlertKind::Trending => "alerts:trending",
            AlertKind::Vandalism => "alerts:vandalism",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Canonical alert payload shape. spec.md §9 notes two historical field
/// names exist in upstream sources (`data` vs `alert_data`); WikiSurge only
/// ever *writes* this shape. Reading both is the consuming API's concern,
/// not ours, so only the canonical `#[serde(rename = "data")]` is emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: u64,
    pub kind: AlertKind,
    pub timestamp: i64,
    #[serde(rename = "data")]
    pub payload: AlertPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AlertPayload {
    Spike(SpikePayload),
    EditWar(EditWarPayload),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpikePayload {
    pub page: String,
    pub wiki: String,
    pub ratio: f64,
    pub edit_count: u32,
    pub severity: Severity,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditWarPayload {
    pub page: String,
    pub wiki: String,
    pub participants: u32,
    pub edit_count: u32,
    pub revert_count: u32,
    pub severity: Severity,
    pub timestamp: i64,
}

/// `(editor_count, edit_count, revert_count)` → severity, shared by any
/// detector that needs the edit-war severity function (spec.md §4.6).
pub fn editwar_severity(editors: u32, edits: u32, reverts: u32) -> Severity {
    if editors >= 5 || reverts >= 8 {
        Severity::Critical
    } else if editors >= 3 || reverts >= 4 {
        Severity::High
    } else if editors >= 2 || reverts >= 2 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// `ratio` → severity bands for the spike detector (spec.md §4.5).
pub fn spike_severity(ratio: f64) -> Severity {
    if ratio >= 10.0 {
        Severity::Critical
    } else if ratio >= 5.0 {
        Severity::High
    } else if ratio >= 2.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn editwar_severity_bands() {
        assert_eq!(editwar_severity(1, 2, 1), Severity::Low);
        assert_eq!(editwar_severity(2, 2, 2), Severity::Medium);
        assert_eq!(editwar_severity(3, 2, 2), Severity::High);
        assert_eq!(editwar_severity(5, 0, 0), Severity::Critical);
        assert_eq!(editwar_severity(1, 0, 8), Severity::Critical);
    }

    #[test]
    fn spike_severity_bands() {
        assert_eq!(spike_severity(1.9), Severity::Low);
        assert_eq!(spike_severity(2.0), Severity::Medium);
        assert_eq!(spike_severity(5.0), Severity::High);
        assert_eq!(spike_severity(10.0), Severity::Critical);
    }
}
