//! Remote source contracts
//!
//! The HTTP clients and their rate-limited request queues live outside this
//! crate. Everything here is the surface the refresh and scores layers call.

use crate::beatsavior::BeatSaviorRecord;
use async_trait::async_trait;
use thiserror::Error;

/// Request queue priority, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    FgHigh,
    FgLow,
    BgHigh,
    #[default]
    BgNormal,
    BgLow,
}

/// Errors reported by a remote source.
///
/// Cloneable so one failure can be handed to every caller sharing a fetch.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("rate limited")]
    RateLimited,
    #[error("response decode error: {0}")]
    Decode(String),
}

/// The Beat Savior API, already processed into records.
#[async_trait]
pub trait BeatSaviorSource: Send + Sync {
    /// Fetch every record the service holds for a player.
    ///
    /// `Ok(None)` and `Ok(Some(vec![]))` both mean "nothing to store".
    async fn get_processed(
        &self,
        player_id: &str,
        priority: Priority,
    ) -> Result<Option<Vec<BeatSaviorRecord>>, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreground_outranks_background() {
        assert!(Priority::FgHigh < Priority::FgLow);
        assert!(Priority::FgLow < Priority::BgHigh);
        assert_eq!(Priority::default(), Priority::BgNormal);
    }

    #[test]
    fn source_error_display() {
        let err = SourceError::Http {
            status: 503,
            message: "maintenance".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 503: maintenance");
    }
}
