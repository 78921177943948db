//! Refresh scheduling: staleness tiers and in-flight deduplication

mod pending;
mod policy;

pub use pending::PendingPool;
pub use policy::{evaluate, RefreshDecision, RefreshTier};
