//! Beat Savior play data: records, matching, and the refresh service

mod matching;
mod service;
mod types;

pub use matching::is_score_matching;
pub use service::{BeatSaviorService, PlayerRefresh, RefreshError, RefreshResult};
pub use types::{BeatSaviorRecord, BeatSaviorStats, PlayerRefreshRecord, HASH_INDEX, PLAYER_INDEX};
