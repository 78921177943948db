//! Common test utilities for refresh and enrichment tests
//!
//! Provides scripted collaborators (remote source, failing repository) and
//! a fixture wiring a `BeatSaviorService` over in-memory stores.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use ranktrack::beatsavior::{BeatSaviorStats, PLAYER_INDEX};
use ranktrack::storage::StoredRecord;
use ranktrack::{
    BeatSaviorRecord, BeatSaviorService, BeatSaviorSource, ManualClock, MemoryRepository,
    Player, PlayerDirectory, PlayerRefreshRecord, Priority, Repository, ScoreRow, SourceError,
    StorageError, StorageResult, StoredPlayerDirectory,
};
use serde_json::{json, Map};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const MAIN_PLAYER: &str = "76561198000000001";

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// Beat Savior source answering from a script and counting calls.
///
/// Unscripted players get an empty response. Every call waits `latency`
/// so concurrent callers overlap.
pub struct ScriptedSource {
    responses: Mutex<HashMap<String, Result<Option<Vec<BeatSaviorRecord>>, SourceError>>>,
    calls: AtomicUsize,
    latency: Duration,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            latency: Duration::from_millis(50),
        }
    }

    pub fn respond(
        &self,
        player_id: &str,
        response: Result<Option<Vec<BeatSaviorRecord>>, SourceError>,
    ) {
        self.responses
            .lock()
            .unwrap()
            .insert(player_id.to_string(), response);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BeatSaviorSource for ScriptedSource {
    async fn get_processed(
        &self,
        player_id: &str,
        _priority: Priority,
    ) -> Result<Option<Vec<BeatSaviorRecord>>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        self.responses
            .lock()
            .unwrap()
            .get(player_id)
            .cloned()
            .unwrap_or(Ok(None))
    }
}

/// Repository whose writes fail for selected keys.
pub struct FailingRepository<T: StoredRecord> {
    inner: MemoryRepository<T>,
    failing_keys: Mutex<Vec<String>>,
}

impl<T: StoredRecord> FailingRepository<T> {
    pub fn new() -> Self {
        Self {
            inner: MemoryRepository::new(),
            failing_keys: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_on(&self, key: &str) {
        self.failing_keys.lock().unwrap().push(key.to_string());
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

#[async_trait]
impl<T: StoredRecord> Repository<T> for FailingRepository<T> {
    async fn set(&self, record: &T) -> StorageResult<()> {
        if self.failing_keys.lock().unwrap().contains(&record.key()) {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.inner.set(record).await
    }

    async fn get(&self, key: &str) -> StorageResult<Option<T>> {
        self.inner.get(key).await
    }

    async fn get_all(&self) -> StorageResult<Vec<T>> {
        self.inner.get_all().await
    }

    async fn get_all_from_index(&self, index: &str, value: &str) -> StorageResult<Vec<T>> {
        self.inner.get_all_from_index(index, value).await
    }

    async fn get_from_index(&self, index: &str, value: &str) -> StorageResult<Option<T>> {
        self.inner.get_from_index(index, value).await
    }
}

/// A `BeatSaviorService` over in-memory stores and a manual clock.
pub struct Fixture {
    pub source: Arc<ScriptedSource>,
    pub records: Arc<FailingRepository<BeatSaviorRecord>>,
    pub refreshes: Arc<MemoryRepository<PlayerRefreshRecord>>,
    pub directory: Arc<StoredPlayerDirectory>,
    pub clock: Arc<ManualClock>,
    pub service: BeatSaviorService,
}

impl Fixture {
    pub fn new() -> Self {
        let source = Arc::new(ScriptedSource::new());
        let records = Arc::new(FailingRepository::new());
        let refreshes = Arc::new(MemoryRepository::new());
        let directory = Arc::new(
            StoredPlayerDirectory::new(Arc::new(MemoryRepository::<Player>::new()))
                .with_main_player(MAIN_PLAYER),
        );
        let clock = Arc::new(ManualClock::new(t0()));

        let service = BeatSaviorService::new(
            source.clone(),
            records.clone(),
            refreshes.clone(),
            directory.clone() as Arc<dyn PlayerDirectory>,
            clock.clone(),
        );

        Self {
            source,
            records,
            refreshes,
            directory,
            clock,
            service,
        }
    }

    pub async fn stamp(&self, player_id: &str) -> Option<DateTime<Utc>> {
        self.refreshes
            .get(player_id)
            .await
            .unwrap()
            .map(|r| r.last_refresh)
    }

    pub async fn stored_for(&self, player_id: &str) -> Vec<BeatSaviorRecord> {
        self.records
            .get_all_from_index(PLAYER_INDEX, player_id)
            .await
            .unwrap()
    }
}

/// A won play of `hash` on expert, set at `time_set`.
pub fn record(id: &str, player_id: &str, hash: &str, score: u64, time_set: DateTime<Utc>) -> BeatSaviorRecord {
    BeatSaviorRecord {
        beat_savior_id: id.to_string(),
        player_id: player_id.to_string(),
        hash: Some(hash.to_lowercase()),
        diff: Some("expert".to_string()),
        score: Some(score),
        time_set: Some(time_set),
        stats: Some(BeatSaviorStats {
            won: Some(true),
            extra: Map::new(),
        }),
        extra: Map::new(),
    }
}

/// A ranked score row on leaderboard `leaderboard_id`.
pub fn score_row(leaderboard_id: &str, hash: &str, score: u64, time_set: DateTime<Utc>) -> ScoreRow {
    ScoreRow::new(json!({
        "leaderboard": {
            "leaderboardId": leaderboard_id,
            "song": {"hash": hash},
            "diffInfo": {"diff": "expert"}
        },
        "score": {"score": score, "timeSet": time_set.to_rfc3339()}
    }))
}
