//! Player classification
//!
//! The refresh policy needs three answers about a player: is it the main
//! (self) player, has it been seen before, and when did it last play.

use crate::storage::{Repository, StorageResult, StoredRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A player known to the local cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub player_id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Most recent play reported by the ranking service
    #[serde(default)]
    pub recent_play: Option<DateTime<Utc>>,
}

impl Player {
    pub fn new(player_id: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            name: None,
            recent_play: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_recent_play(mut self, recent_play: DateTime<Utc>) -> Self {
        self.recent_play = Some(recent_play);
        self
    }
}

impl StoredRecord for Player {
    const STORE: &'static str = "players";
    const INDEXES: &'static [&'static str] = &[];

    fn key(&self) -> String {
        self.player_id.clone()
    }

    fn index_value(&self, _index: &str) -> Option<String> {
        None
    }
}

/// Answers player classification questions for the refresh policy.
#[async_trait]
pub trait PlayerDirectory: Send + Sync {
    /// True for the player the application runs on behalf of.
    fn is_main_player(&self, player_id: &str) -> bool;

    /// A previously seen player, if any.
    async fn get(&self, player_id: &str) -> StorageResult<Option<Player>>;

    /// Every previously seen player.
    async fn get_all(&self) -> StorageResult<Vec<Player>>;
}

/// Player directory backed by a `players` object store.
pub struct StoredPlayerDirectory {
    players: Arc<dyn Repository<Player>>,
    main_player_id: Option<String>,
}

impl StoredPlayerDirectory {
    pub fn new(players: Arc<dyn Repository<Player>>) -> Self {
        Self {
            players,
            main_player_id: None,
        }
    }

    pub fn with_main_player(mut self, player_id: impl Into<String>) -> Self {
        self.main_player_id = Some(player_id.into());
        self
    }

    /// Record a player as seen.
    pub async fn track(&self, player: &Player) -> StorageResult<()> {
        self.players.set(player).await
    }
}

#[async_trait]
impl PlayerDirectory for StoredPlayerDirectory {
    fn is_main_player(&self, player_id: &str) -> bool {
        self.main_player_id.as_deref() == Some(player_id)
    }

    async fn get(&self, player_id: &str) -> StorageResult<Option<Player>> {
        self.players.get(player_id).await
    }

    async fn get_all(&self) -> StorageResult<Vec<Player>> {
        self.players.get_all().await
    }
}
