//! Score collections and their incremental enrichment
//!
//! A fetched collection is published as-is, then every row runs through
//! the enhancer chains for its service; partial results are merged into the
//! snapshot as patches and republished after a short quiet period.

mod debounce;
mod enhancer;
pub mod patch;
mod pipeline;
mod row;
mod store;
mod task;

pub use debounce::Debouncer;
pub use enhancer::{
    chain_plan, BeatSaviorEnhancer, EnhanceContext, EnhanceError, Enhancer, EnhancerKind,
    EnhancerRegistry, StateType, ACCSABER_SERVICE,
};
pub use patch::Patch;
pub use pipeline::{EnhanceRun, EnrichmentPipeline, SnapshotSink, PUBLISH_DEBOUNCE};
pub use row::{FetchParams, RowIdentity, ScoreRow, ServiceParams, BEAT_SAVIOR_FIELD};
pub use store::{ScoresError, ScoresPayload, ScoresProvider, ScoresResult, ScoresState, ScoresStore};
pub use task::{EnhanceTaskId, TaskGuard};
