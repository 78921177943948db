//! Score rows and query parameters
//!
//! A score row is kept as JSON: enhancers attach arbitrary derived data to
//! it, and patches address it by path. Typed accessors cover the fields
//! this crate reads.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

/// Field under which a matched Beat Savior record is attached.
pub const BEAT_SAVIOR_FIELD: &str = "beatSavior";

/// One element of a scores collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreRow(Value);

impl ScoreRow {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn as_value_mut(&mut self) -> &mut Value {
        &mut self.0
    }

    /// Look up a nested value by JSON pointer (`/leaderboard/song/hash`).
    pub fn pointer(&self, pointer: &str) -> Option<&Value> {
        self.0.pointer(pointer)
    }

    /// `leaderboard.leaderboardId`, stringified when numeric.
    pub fn leaderboard_id(&self) -> Option<String> {
        match self.pointer("/leaderboard/leaderboardId")? {
            Value::String(id) => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }

    pub fn song_hash(&self) -> Option<&str> {
        self.pointer("/leaderboard/song/hash")?.as_str()
    }

    pub fn difficulty(&self) -> Option<&str> {
        self.pointer("/leaderboard/diffInfo/diff")?.as_str()
    }

    pub fn score_value(&self) -> Option<u64> {
        self.pointer("/score/score")?.as_u64()
    }

    /// `score.timeSet`, accepted as RFC 3339 text or epoch milliseconds.
    pub fn time_set(&self) -> Option<DateTime<Utc>> {
        match self.pointer("/score/timeSet")? {
            Value::String(text) => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            Value::Number(millis) => Utc.timestamp_millis_opt(millis.as_i64()?).single(),
            _ => None,
        }
    }

    pub fn beat_savior(&self) -> Option<&Value> {
        match self.0.get(BEAT_SAVIOR_FIELD)? {
            Value::Null => None,
            value => Some(value),
        }
    }

    pub fn set_beat_savior(&mut self, value: Value) {
        if !self.0.is_object() {
            self.0 = Value::Object(Map::new());
        }
        if let Value::Object(fields) = &mut self.0 {
            fields.insert(BEAT_SAVIOR_FIELD.to_string(), value);
        }
    }

    /// Identity of this row for patch bookkeeping: `(player, leaderboard)`.
    pub fn identity(&self, player_id: Option<&str>) -> RowIdentity {
        RowIdentity(format!(
            "{}/{}",
            player_id.unwrap_or("null"),
            self.leaderboard_id().as_deref().unwrap_or("undefined")
        ))
    }
}

impl From<Value> for ScoreRow {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Stable identity of a row across fetches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowIdentity(String);

impl RowIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Service-specific query parameters (`{"type": "recent", "page": 1}`).
///
/// Compared structurally: two parameter sets are equal when their stable
/// serializations are equal, regardless of key order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceParams(Value);

impl ServiceParams {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Compact serialization with object keys in sorted order.
    ///
    /// `serde_json::Map` is key-ordered (no `preserve_order`), so plain
    /// serialization is already stable.
    pub fn stable_key(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ServiceParams {
    fn default() -> Self {
        Self(json!({"type": "recent", "page": 1}))
    }
}

impl PartialEq for ServiceParams {
    fn eq(&self, other: &Self) -> bool {
        self.stable_key() == other.stable_key()
    }
}

impl Eq for ServiceParams {}

impl From<Value> for ServiceParams {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// The query a scores collection answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchParams {
    pub player_id: Option<String>,
    pub service: String,
    pub service_params: ServiceParams,
}

impl FetchParams {
    pub fn new(
        player_id: impl Into<String>,
        service: impl Into<String>,
        service_params: ServiceParams,
    ) -> Self {
        Self {
            player_id: Some(player_id.into()),
            service: service.into(),
            service_params,
        }
    }
}

impl Default for FetchParams {
    fn default() -> Self {
        Self {
            player_id: None,
            service: "scoresaber".to_string(),
            service_params: ServiceParams::default(),
        }
    }
}
