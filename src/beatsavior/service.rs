//! Beat Savior refresh service
//!
//! Keeps each player's Beat Savior plays cached locally. Whether a player
//! is fetched again is decided by the tiered staleness policy; concurrent
//! refreshes of the same player share one fetch.

use super::matching::is_score_matching;
use super::types::{BeatSaviorRecord, PlayerRefreshRecord, PLAYER_INDEX};
use crate::clock::Clock;
use crate::network::{BeatSaviorSource, Priority, SourceError};
use crate::players::PlayerDirectory;
use crate::refresh::{evaluate, PendingPool, RefreshDecision, RefreshTier};
use crate::scores::ScoreRow;
use crate::storage::{Repository, StorageError};
use futures::future::{join_all, try_join_all};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Errors from refreshing or reading Beat Savior data.
///
/// Cloneable so a single failed fetch can be handed to every caller that
/// joined it.
#[derive(Debug, Clone, Error)]
pub enum RefreshError {
    #[error("storage error: {0}")]
    Storage(Arc<StorageError>),

    #[error("remote source error: {0}")]
    Source(#[from] SourceError),

    #[error("stored beat savior data is malformed: {0}")]
    Malformed(String),
}

impl From<StorageError> for RefreshError {
    fn from(err: StorageError) -> Self {
        Self::Storage(Arc::new(err))
    }
}

/// Result type for refresh operations
pub type RefreshResult<T> = Result<T, RefreshError>;

/// Outcome of refreshing one player during a batch refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRefresh {
    pub player_id: String,
    /// Freshly stored records, `None` when nothing was fetched
    pub beat_savior: Option<Vec<BeatSaviorRecord>>,
}

type FetchOutcome = RefreshResult<Option<Vec<BeatSaviorRecord>>>;

/// Fetches a player's records and writes them to the cache.
///
/// Captured by in-flight refreshes, so it must not hold a `PendingPool`.
#[derive(Clone)]
struct RecordUpdater {
    source: Arc<dyn BeatSaviorSource>,
    records: Arc<dyn Repository<BeatSaviorRecord>>,
    refreshes: Arc<dyn Repository<PlayerRefreshRecord>>,
    clock: Arc<dyn Clock>,
}

impl RecordUpdater {
    async fn fetch_and_update(&self, player_id: &str, priority: Priority) -> FetchOutcome {
        debug!(player_id, "Fetching Beat Savior data");

        let data = match self.source.get_processed(player_id, priority).await? {
            Some(data) if !data.is_empty() => data,
            _ => {
                debug!(player_id, "No Beat Savior data");
                return Ok(None);
            }
        };

        trace!(player_id, records = data.len(), "Beat Savior data fetched");

        self.update_data(player_id, data).await.map(Some)
    }

    /// Store every record, then stamp the refresh time.
    ///
    /// The stamp is only written once all records are stored.
    async fn update_data(
        &self,
        player_id: &str,
        data: Vec<BeatSaviorRecord>,
    ) -> RefreshResult<Vec<BeatSaviorRecord>> {
        debug!(player_id, records = data.len(), "Updating Beat Savior data");

        try_join_all(data.iter().map(|record| self.records.set(record))).await?;

        debug!(player_id, "Updating Beat Savior last refresh date");

        self.refreshes
            .set(&PlayerRefreshRecord {
                player_id: player_id.to_string(),
                last_refresh: self.clock.now(),
            })
            .await?;

        debug!(player_id, "Beat Savior data updated");

        Ok(data)
    }
}

/// Caches Beat Savior data per player and keeps it fresh.
#[derive(Clone)]
pub struct BeatSaviorService {
    updater: RecordUpdater,
    records: Arc<dyn Repository<BeatSaviorRecord>>,
    refreshes: Arc<dyn Repository<PlayerRefreshRecord>>,
    players: Arc<dyn PlayerDirectory>,
    clock: Arc<dyn Clock>,
    fetches: PendingPool<FetchOutcome>,
    lookups: PendingPool<RefreshResult<Vec<BeatSaviorRecord>>>,
}

impl BeatSaviorService {
    pub fn new(
        source: Arc<dyn BeatSaviorSource>,
        records: Arc<dyn Repository<BeatSaviorRecord>>,
        refreshes: Arc<dyn Repository<PlayerRefreshRecord>>,
        players: Arc<dyn PlayerDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            updater: RecordUpdater {
                source,
                records: Arc::clone(&records),
                refreshes: Arc::clone(&refreshes),
                clock: Arc::clone(&clock),
            },
            records,
            refreshes,
            players,
            clock,
            fetches: PendingPool::new(),
            lookups: PendingPool::new(),
        }
    }

    /// Freshness tier of a player.
    pub async fn tier(&self, player_id: &str) -> RefreshResult<RefreshTier> {
        let cached = self.players.get(player_id).await?.is_some();
        Ok(RefreshTier::classify(
            self.players.is_main_player(player_id),
            cached,
        ))
    }

    /// Last successful refresh of a player, if any.
    pub async fn last_refresh(&self, player_id: &str) -> RefreshResult<Option<PlayerRefreshRecord>> {
        Ok(self.refreshes.get(player_id).await?)
    }

    /// Run the staleness policy for a player.
    pub async fn decide(&self, player_id: &str, force: bool) -> RefreshResult<RefreshDecision> {
        let player = self.players.get(player_id).await?;
        let tier = RefreshTier::classify(self.players.is_main_player(player_id), player.is_some());
        let last_refresh = self.refreshes.get(player_id).await?.map(|r| r.last_refresh);
        let recent_play = player.and_then(|p| p.recent_play);

        Ok(evaluate(tier, force, last_refresh, recent_play, self.clock.now()))
    }

    pub async fn should_refresh(&self, player_id: &str, force: bool) -> RefreshResult<bool> {
        Ok(self.decide(player_id, force).await?.should_refresh())
    }

    /// Fetch a player's data and store it, whatever the policy says.
    ///
    /// Any failure is logged and reported as `None`.
    pub async fn fetch_player(
        &self,
        player_id: &str,
        priority: Priority,
    ) -> Option<Vec<BeatSaviorRecord>> {
        match self.updater.fetch_and_update(player_id, priority).await {
            Ok(data) => data,
            Err(err) => {
                warn!(player_id, error = %err, "Error fetching Beat Savior data");
                None
            }
        }
    }

    /// Refresh a player if the policy says its data is stale.
    ///
    /// Returns the stored records when a fetch happened, `None` when the
    /// data was still fresh or nothing came back. Failures are reported as
    /// `None` unless `throw_errors` is set.
    pub async fn refresh(
        &self,
        player_id: &str,
        force: bool,
        priority: Priority,
        throw_errors: bool,
    ) -> FetchOutcome {
        trace!(player_id, force, "Starting Beat Savior refresh");

        match self.refresh_inner(player_id, force, priority).await {
            Ok(data) => Ok(data),
            Err(err) if throw_errors => Err(err),
            Err(err) => {
                warn!(player_id, error = %err, "Beat Savior data refreshing error");
                Ok(None)
            }
        }
    }

    async fn refresh_inner(&self, player_id: &str, force: bool, priority: Priority) -> FetchOutcome {
        let decision = self.decide(player_id, force).await?;
        if !decision.should_refresh() {
            debug!(player_id, %decision, "Beat Savior data is still fresh, skipping");
            return Ok(None);
        }

        trace!(player_id, %decision, "Beat Savior data needs refreshing");

        let updater = self.updater.clone();
        let owned_id = player_id.to_string();
        self.fetches
            .resolve(&format!("refresh/{}", player_id), move || async move {
                updater.fetch_and_update(&owned_id, priority).await
            })
            .await
    }

    /// Refresh every known player concurrently.
    ///
    /// Returns `None` when there are no players. Each player appears
    /// exactly once in the result.
    pub async fn refresh_all(
        &self,
        force: bool,
        priority: Priority,
        throw_errors: bool,
    ) -> RefreshResult<Option<Vec<PlayerRefresh>>> {
        trace!(force, "Starting Beat Savior refresh for all players");

        let players = match self.players.get_all().await {
            Ok(players) => players,
            Err(err) if throw_errors => return Err(err.into()),
            Err(err) => {
                warn!(error = %err, "Unable to list players for Beat Savior refresh");
                return Ok(None);
            }
        };

        if players.is_empty() {
            trace!("No players in DB, skipping");
            return Ok(None);
        }

        let refreshed = join_all(players.iter().map(|player| async move {
            self.refresh(&player.player_id, force, priority, throw_errors)
                .await
                .map(|beat_savior| PlayerRefresh {
                    player_id: player.player_id.clone(),
                    beat_savior,
                })
        }))
        .await
        .into_iter()
        .collect::<RefreshResult<Vec<_>>>()?;

        trace!(players = refreshed.len(), "Beat Savior data for all players refreshed");

        Ok(Some(refreshed))
    }

    /// The Beat Savior record behind a score, if one is cached.
    ///
    /// A record already attached to the score wins over the cache.
    pub async fn get(
        &self,
        player_id: &str,
        score: &ScoreRow,
    ) -> RefreshResult<Option<BeatSaviorRecord>> {
        if let Some(attached) = score.beat_savior() {
            return serde_json::from_value(attached.clone())
                .map(Some)
                .map_err(|e| RefreshError::Malformed(e.to_string()));
        }

        let records = self.player_records(player_id).await?;

        Ok(records
            .into_iter()
            .find(|record| is_score_matching(score, record, true)))
    }

    /// Cached records of a player, with concurrent lookups deduplicated.
    async fn player_records(&self, player_id: &str) -> RefreshResult<Vec<BeatSaviorRecord>> {
        let records = Arc::clone(&self.records);
        let owned_id = player_id.to_string();
        self.lookups
            .resolve(
                &format!("getPlayerBeatSaviorData/{}", player_id),
                move || async move {
                    records
                        .get_all_from_index(PLAYER_INDEX, &owned_id)
                        .await
                        .map_err(RefreshError::from)
                },
            )
            .await
    }

    /// Every cached record of a player.
    pub async fn get_all_player_scores(
        &self,
        player_id: &str,
    ) -> RefreshResult<Vec<BeatSaviorRecord>> {
        Ok(self.records.get_all_from_index(PLAYER_INDEX, player_id).await?)
    }

    /// Whether anything is cached for a player.
    pub async fn is_data_for_player_available(&self, player_id: &str) -> RefreshResult<bool> {
        Ok(self
            .records
            .get_from_index(PLAYER_INDEX, player_id)
            .await?
            .is_some())
    }
}
