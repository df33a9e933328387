//! Link entity representing a shortened URL and its visit history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Visit;

/// A shortened URL record as stored durably.
///
/// The full record (including its visit history) is also what gets cached
/// under `link:{code}`, so it round-trips through JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: i64,
    pub code: String,
    pub long_url: String,
    pub visit_count: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_visited_at: Option<DateTime<Utc>>,
    /// Chronological, append-only.
    #[serde(default)]
    pub visits: Vec<Visit>,
    pub owner_id: Option<String>,
    pub script: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Link {
    /// Creates a link with no visits, no expiry and no owner.
    pub fn new(id: i64, code: String, long_url: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            code,
            long_url,
            visit_count: 0,
            expires_at: None,
            last_visited_at: None,
            visits: Vec::new(),
            owner_id: None,
            script: None,
            created_at,
        }
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn with_expiry(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = expires_at;
        self
    }

    /// Returns true if the link has passed its expiry time.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|e| now >= e)
    }
}

/// Input data for creating a new link.
#[derive(Debug, Clone)]
pub struct NewLink {
    pub code: String,
    pub long_url: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub owner_id: Option<String>,
    pub script: Option<String>,
}

/// Partial update for an existing link.
///
/// `None` fields are left unchanged.
/// `expires_at: Some(None)` clears the expiry; `Some(Some(t))` sets it.
/// The short code is immutable once created.
#[derive(Debug, Clone, Default)]
pub struct LinkPatch {
    pub long_url: Option<String>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub script: Option<Option<String>>,
}

impl LinkPatch {
    pub fn is_empty(&self) -> bool {
        self.long_url.is_none() && self.expires_at.is_none() && self.script.is_none()
    }
}
