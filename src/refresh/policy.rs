//! Tiered staleness policy
//!
//! Every player falls into one of three freshness tiers. Data fetched for
//! a player is considered fresh until the tier's window has elapsed since
//! the last successful refresh.

use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Freshness tier, ordered from shortest to longest window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RefreshTier {
    /// The player the application runs for
    MainPlayer,
    /// A player seen before and kept in the local cache
    CachedPlayer,
    /// Anyone else
    OtherPlayer,
}

impl RefreshTier {
    pub fn classify(is_main_player: bool, is_cached: bool) -> Self {
        if is_main_player {
            Self::MainPlayer
        } else if is_cached {
            Self::CachedPlayer
        } else {
            Self::OtherPlayer
        }
    }

    /// How long data stays fresh for this tier.
    pub fn interval(self) -> Duration {
        match self {
            Self::MainPlayer => Duration::minutes(15),
            Self::CachedPlayer => Duration::hours(3),
            Self::OtherPlayer => Duration::days(1),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::MainPlayer => "main",
            Self::CachedPlayer => "cached",
            Self::OtherPlayer => "other",
        }
    }
}

impl fmt::Display for RefreshTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a staleness check, with the reason behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshDecision {
    /// Caller asked to bypass the staleness check
    Forced,
    /// No refresh stamp exists yet
    NeverRefreshed,
    /// The tier window has elapsed
    Stale { next_refresh: DateTime<Utc> },
    /// Still inside the window, but the player has played since the last refresh
    RecentActivity {
        recent_play: DateTime<Utc>,
        last_refresh: DateTime<Utc>,
    },
    /// Still inside the window
    Fresh { next_refresh: DateTime<Utc> },
}

impl RefreshDecision {
    pub fn should_refresh(&self) -> bool {
        !matches!(self, Self::Fresh { .. })
    }
}

impl fmt::Display for RefreshDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forced => write!(f, "forced"),
            Self::NeverRefreshed => write!(f, "never refreshed"),
            Self::Stale { next_refresh } => write!(f, "stale since {}", next_refresh),
            Self::RecentActivity { recent_play, .. } => {
                write!(f, "played at {} after last refresh", recent_play)
            }
            Self::Fresh { next_refresh } => write!(f, "fresh until {}", next_refresh),
        }
    }
}

/// Decide whether a player's data must be fetched again.
///
/// `recent_play` only counts for players that are already cached; the
/// override lets a refresh through inside the window when the player has
/// played after the last stamp.
pub fn evaluate(
    tier: RefreshTier,
    force: bool,
    last_refresh: Option<DateTime<Utc>>,
    recent_play: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> RefreshDecision {
    if force {
        return RefreshDecision::Forced;
    }

    let Some(last_refresh) = last_refresh else {
        return RefreshDecision::NeverRefreshed;
    };

    let next_refresh = last_refresh + tier.interval();
    if next_refresh <= now {
        return RefreshDecision::Stale { next_refresh };
    }

    match recent_play {
        Some(recent_play) if recent_play > last_refresh => RefreshDecision::RecentActivity {
            recent_play,
            last_refresh,
        },
        _ => RefreshDecision::Fresh { next_refresh },
    }
}
