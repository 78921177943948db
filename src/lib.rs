//! Ranktrack: cached, incrementally enriched player score data
//!
//! Keeps per-player records from remote ranking services in a local store
//! and only goes back to the network when the cached copy is stale.
//!
//! # Core Concepts
//!
//! - **Refresh tiers**: how long a player's data stays fresh depends on who
//!   the player is (main player, tracked player, anyone else)
//! - **Single flight**: concurrent requests for the same fetch share one
//!   in-flight operation
//! - **Enrichment**: fetched score rows run through enhancer chains; each
//!   stage's changes are merged as patches and republished after a short
//!   quiet period
//!
//! # Example
//!
//! ```
//! use ranktrack::{evaluate, RefreshDecision, RefreshTier};
//!
//! let now = chrono::Utc::now();
//! let decision = evaluate(RefreshTier::MainPlayer, false, None, None, now);
//! assert_eq!(decision, RefreshDecision::NeverRefreshed);
//! ```

pub mod beatsavior;
pub mod clock;
pub mod context;
pub mod network;
pub mod players;
pub mod refresh;
pub mod scores;
pub mod storage;

pub use beatsavior::{BeatSaviorRecord, BeatSaviorService, PlayerRefreshRecord, RefreshError, RefreshResult};
pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{AppContext, ServiceHandle, ServiceSlot};
pub use network::{BeatSaviorSource, Priority, SourceError};
pub use players::{Player, PlayerDirectory, StoredPlayerDirectory};
pub use refresh::{evaluate, PendingPool, RefreshDecision, RefreshTier};
pub use scores::{EnrichmentPipeline, FetchParams, ScoreRow, ScoresStore, ServiceParams, StateType};
pub use storage::{MemoryRepository, OpenStore, Repository, SqliteStore, StorageError, StorageResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
