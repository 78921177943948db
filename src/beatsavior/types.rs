//! Beat Savior records and refresh stamps

use crate::storage::StoredRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Index on `beat-savior` records by player.
pub const PLAYER_INDEX: &str = "beat-savior-playerId";
/// Index on `beat-savior` records by song hash.
pub const HASH_INDEX: &str = "beat-savior-hash";

/// Per-play statistics. Only the success flag is interpreted here; the
/// rest is carried verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeatSaviorStats {
    #[serde(default)]
    pub won: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A play fetched from Beat Savior. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeatSaviorRecord {
    pub beat_savior_id: String,
    pub player_id: String,
    /// Song hash, lower-cased by the processing client
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub diff: Option<String>,
    #[serde(default)]
    pub score: Option<u64>,
    #[serde(default)]
    pub time_set: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stats: Option<BeatSaviorStats>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BeatSaviorRecord {
    pub fn is_won(&self) -> bool {
        self.stats.as_ref().and_then(|s| s.won).unwrap_or(false)
    }
}

impl StoredRecord for BeatSaviorRecord {
    const STORE: &'static str = "beat-savior";
    const INDEXES: &'static [&'static str] = &[PLAYER_INDEX, HASH_INDEX];

    fn key(&self) -> String {
        self.beat_savior_id.clone()
    }

    fn index_value(&self, index: &str) -> Option<String> {
        match index {
            PLAYER_INDEX => Some(self.player_id.clone()),
            HASH_INDEX => self.hash.clone(),
            _ => None,
        }
    }
}

/// When a player's Beat Savior data was last fetched successfully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRefreshRecord {
    pub player_id: String,
    pub last_refresh: DateTime<Utc>,
}

impl StoredRecord for PlayerRefreshRecord {
    const STORE: &'static str = "beat-savior-players";
    const INDEXES: &'static [&'static str] = &[];

    fn key(&self) -> String {
        self.player_id.clone()
    }

    fn index_value(&self, _index: &str) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_fields_are_kept_verbatim() {
        let raw = json!({
            "beatSaviorId": "bs-1",
            "playerId": "p1",
            "hash": "ab12",
            "diff": "expert",
            "score": 100,
            "timeSet": "2024-03-01T12:00:00Z",
            "stats": {"won": true, "accRight": 114.2},
            "trackers": {"hitTracker": {"miss": 2}}
        });

        let record: BeatSaviorRecord = serde_json::from_value(raw.clone()).unwrap();
        assert!(record.is_won());
        assert_eq!(record.index_value(PLAYER_INDEX).as_deref(), Some("p1"));
        assert_eq!(record.index_value(HASH_INDEX).as_deref(), Some("ab12"));
        assert_eq!(serde_json::to_value(&record).unwrap(), raw);
    }

    #[test]
    fn missing_stats_is_not_won() {
        let record: BeatSaviorRecord =
            serde_json::from_value(json!({"beatSaviorId": "bs-2", "playerId": "p1"})).unwrap();
        assert!(!record.is_won());
        assert_eq!(record.index_value(HASH_INDEX), None);
    }
}
