//! Matching a Beat Savior record to a ranked score

use super::types::BeatSaviorRecord;
use crate::scores::ScoreRow;

/// Clock skew tolerated between the two services for one play.
const TIME_SET_TOLERANCE_MS: i64 = 60_000;

/// Whether `record` describes the play behind `score`.
///
/// Records without a hash, score, timestamp or success flag never match.
/// Hash (case-insensitive) and difficulty must agree; an `exact` match
/// also requires equal score values and timestamps less than a minute apart.
pub fn is_score_matching(score: &ScoreRow, record: &BeatSaviorRecord, exact: bool) -> bool {
    let (Some(record_hash), Some(record_score), Some(record_time)) =
        (record.hash.as_deref(), record.score, record.time_set)
    else {
        return false;
    };
    if record_hash.is_empty() || !record.is_won() {
        return false;
    }

    let (Some(diff), Some(score_value), Some(time_set), Some(hash)) = (
        score.difficulty(),
        score.score_value(),
        score.time_set(),
        score.song_hash(),
    ) else {
        return false;
    };

    if !hash.eq_ignore_ascii_case(record_hash) || record.diff.as_deref() != Some(diff) {
        return false;
    }

    !exact
        || (record_score == score_value
            && (time_set - record_time).num_milliseconds().abs() < TIME_SET_TOLERANCE_MS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use serde_json::json;

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::seconds(secs as i64)
    }

    fn score() -> ScoreRow {
        ScoreRow::new(json!({
            "leaderboard": {
                "leaderboardId": "A",
                "song": {"hash": "AB12"},
                "diffInfo": {"diff": "expert"}
            },
            "score": {"score": 100, "timeSet": at(0).to_rfc3339()}
        }))
    }

    fn record() -> BeatSaviorRecord {
        serde_json::from_value(json!({
            "beatSaviorId": "bs-1",
            "playerId": "p1",
            "hash": "ab12",
            "diff": "expert",
            "score": 100,
            "timeSet": at(30).to_rfc3339(),
            "stats": {"won": true}
        }))
        .unwrap()
    }

    #[test]
    fn exact_match_within_a_minute() {
        assert!(is_score_matching(&score(), &record(), true));
    }

    #[test]
    fn exact_match_rejects_clock_skew_of_a_minute() {
        let mut late = record();
        late.time_set = Some(at(60));
        assert!(!is_score_matching(&score(), &late, true));
        assert!(is_score_matching(&score(), &late, false));
    }

    #[test]
    fn exact_match_requires_equal_score() {
        let mut other = record();
        other.score = Some(99);
        assert!(!is_score_matching(&score(), &other, true));
        assert!(is_score_matching(&score(), &other, false));
    }

    #[test]
    fn difficulty_must_agree() {
        let mut other = record();
        other.diff = Some("hard".to_string());
        assert!(!is_score_matching(&score(), &other, false));
    }

    #[test]
    fn incomplete_records_never_match() {
        let mut no_hash = record();
        no_hash.hash = None;
        let mut empty_hash = record();
        empty_hash.hash = Some(String::new());
        let mut no_score = record();
        no_score.score = None;
        let mut no_time = record();
        no_time.time_set = None;
        let mut failed = record();
        failed.stats = None;

        for record in [no_hash, empty_hash, no_score, no_time, failed] {
            assert!(!is_score_matching(&score(), &record, false));
        }
    }

    #[test]
    fn score_without_leaderboard_never_matches() {
        let bare = ScoreRow::new(json!({"score": {"score": 100}}));
        assert!(!is_score_matching(&bare, &record(), false));
    }
}
