//! Enhancer trait, registry and chain plans
//!
//! Enhancers enrich one score row with derived or cross-referenced data.
//! They receive a draft of the row and return the modified draft; the
//! pipeline turns the difference into patches.

use super::row::ScoreRow;
use crate::beatsavior::BeatSaviorService;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Service whose rows get the short enhancer plan.
pub const ACCSABER_SERVICE: &str = "accsaber";

/// The enhancer stages a row can go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnhancerKind {
    /// Beatmap metadata
    BeatMaps,
    Acc,
    Diff,
    /// Comparison against the main player's score
    Compare,
    Twitch,
    /// Ranked status of the leaderboard
    Rankeds,
    PpAttribution,
    Replay,
    BeatSavior,
}

impl EnhancerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BeatMaps => "beatmaps",
            Self::Acc => "acc",
            Self::Diff => "diff",
            Self::Compare => "compare",
            Self::Twitch => "twitch",
            Self::Rankeds => "rankeds",
            Self::PpAttribution => "pp-attribution",
            Self::Replay => "replay",
            Self::BeatSavior => "beat-savior",
        }
    }
}

impl fmt::Display for EnhancerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a published snapshot came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StateType {
    /// Seeded state (e.g. restored from a previous session)
    #[default]
    Initial,
    /// Fetched from the remote service just now
    Live,
}

/// What an enhancer knows about the query its row belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct EnhanceContext {
    pub player_id: Option<String>,
    pub service: String,
}

/// Errors from a single enhancer stage. A failing stage stops its chain.
#[derive(Debug, Error)]
pub enum EnhanceError {
    #[error("lookup failed: {0}")]
    Lookup(String),
    #[error("unexpected row shape: {0}")]
    InvalidRow(String),
}

/// One enrichment stage.
#[async_trait]
pub trait Enhancer: Send + Sync {
    /// Which stage this enhancer implements.
    fn kind(&self) -> EnhancerKind;

    /// Transform a draft of the row.
    ///
    /// The returned row is diffed against `draft`; only changed paths end
    /// up in the published snapshot.
    async fn enhance(&self, draft: ScoreRow, context: &EnhanceContext)
        -> Result<ScoreRow, EnhanceError>;
}

/// Enhancers available to a pipeline, one per kind.
///
/// A kind without an enhancer is skipped in every chain.
pub struct EnhancerRegistry {
    enhancers: HashMap<EnhancerKind, Arc<dyn Enhancer>>,
}

impl EnhancerRegistry {
    /// Create a registry. When two enhancers share a kind the first wins.
    pub fn new(enhancers: Vec<Arc<dyn Enhancer>>) -> Self {
        let mut by_kind = HashMap::new();
        for enhancer in enhancers {
            by_kind.entry(enhancer.kind()).or_insert(enhancer);
        }
        Self { enhancers: by_kind }
    }

    pub fn get(&self, kind: EnhancerKind) -> Option<&Arc<dyn Enhancer>> {
        self.enhancers.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.enhancers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enhancers.is_empty()
    }
}

/// The chains each row goes through.
///
/// Stages inside a chain run in order, each seeing the previous stage's
/// result; separate chains run independently.
pub fn chain_plan(service: &str, state_type: StateType) -> Vec<Vec<EnhancerKind>> {
    use EnhancerKind::*;

    if service == ACCSABER_SERVICE {
        return vec![vec![BeatMaps, Twitch, BeatSavior]];
    }

    let mut chains = vec![
        vec![BeatMaps, Acc, Diff, Compare, Twitch],
        vec![Rankeds],
        vec![PpAttribution],
        vec![Replay],
    ];
    if state_type == StateType::Live {
        chains.push(vec![BeatSavior]);
    }
    chains
}

/// Attaches the matching Beat Savior record to a row.
pub struct BeatSaviorEnhancer {
    service: Arc<BeatSaviorService>,
}

impl BeatSaviorEnhancer {
    pub fn new(service: Arc<BeatSaviorService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Enhancer for BeatSaviorEnhancer {
    fn kind(&self) -> EnhancerKind {
        EnhancerKind::BeatSavior
    }

    async fn enhance(
        &self,
        mut draft: ScoreRow,
        context: &EnhanceContext,
    ) -> Result<ScoreRow, EnhanceError> {
        let Some(player_id) = context.player_id.as_deref() else {
            return Ok(draft);
        };

        let record = self
            .service
            .get(player_id, &draft)
            .await
            .map_err(|e| EnhanceError::Lookup(e.to_string()))?;

        if let Some(record) = record {
            let value =
                serde_json::to_value(record).map_err(|e| EnhanceError::InvalidRow(e.to_string()))?;
            draft.set_beat_savior(value);
        }

        Ok(draft)
    }
}
