//! Enhance task identity
//!
//! The enrichment run that matters is the one for the latest query. Work
//! started for an older query keeps running to completion, but its results
//! are checked against the current task and dropped.

use super::row::ServiceParams;
use std::fmt;

/// Identity of an enrichment run: `player/service/params`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnhanceTaskId(String);

impl EnhanceTaskId {
    pub fn new(
        player_id: Option<&str>,
        service: Option<&str>,
        service_params: Option<&ServiceParams>,
    ) -> Self {
        Self(format!(
            "{}/{}/{}",
            player_id.unwrap_or("null"),
            service.unwrap_or("null"),
            service_params
                .map(ServiceParams::stable_key)
                .unwrap_or_else(|| "null".to_string())
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EnhanceTaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tracks which task is current.
#[derive(Debug, Default)]
pub struct TaskGuard {
    current: Option<EnhanceTaskId>,
}

impl TaskGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `task` current. Returns true when it replaced a different task
    /// (or none).
    pub fn activate(&mut self, task: EnhanceTaskId) -> bool {
        if self.current.as_ref() == Some(&task) {
            return false;
        }
        self.current = Some(task);
        true
    }

    pub fn is_current(&self, task: &EnhanceTaskId) -> bool {
        self.current.as_ref() == Some(task)
    }

    pub fn current(&self) -> Option<&EnhanceTaskId> {
        self.current.as_ref()
    }
}
