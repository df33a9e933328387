//! Visit entity representing a single recorded redirect.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A visit appended to a link's history.
///
/// Immutable once recorded. Only removed together with its link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visit {
    pub visited_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    /// Referring page, or [`Visit::DIRECT_REFERRER`] for direct traffic.
    pub referrer: String,
}

impl Visit {
    /// Sentinel stored when the request carried no referrer.
    pub const DIRECT_REFERRER: &'static str = "direct";

    /// Creates a visit, substituting the direct-traffic sentinel for an
    /// absent or blank referrer.
    pub fn new(
        visited_at: DateTime<Utc>,
        user_agent: Option<String>,
        referrer: Option<String>,
    ) -> Self {
        let referrer = referrer
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| Self::DIRECT_REFERRER.to_string());

        Self {
            visited_at,
            user_agent,
            referrer,
        }
    }

    pub fn is_direct(&self) -> bool {
        self.referrer == Self::DIRECT_REFERRER
    }
}
