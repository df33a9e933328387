//! Visit event model captured on the redirect path.

use chrono::{DateTime, Utc};

use super::entities::Visit;

/// Request metadata for one redirect, as handed over by the caller.
///
/// All client metadata is optional to handle missing headers gracefully.
/// The timestamp is taken when the event is created, not when it is
/// committed, so batching never shifts visit times.
#[derive(Debug, Clone)]
pub struct VisitEvent {
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl VisitEvent {
    /// Creates a new visit event stamped with the current time.
    ///
    /// # Examples
    ///
    /// ```
    /// use shortlink_cache::domain::visit_event::VisitEvent;
    ///
    /// let event = VisitEvent::new(Some("Mozilla/5.0"), Some("https://google.com"));
    /// assert_eq!(event.referrer.as_deref(), Some("https://google.com"));
    /// ```
    pub fn new(user_agent: Option<&str>, referrer: Option<&str>) -> Self {
        Self {
            user_agent: user_agent.map(|s| s.to_string()),
            referrer: referrer.map(|s| s.to_string()),
            occurred_at: Utc::now(),
        }
    }

    /// A visit with no user agent and no referrer.
    pub fn direct() -> Self {
        Self::new(None, None)
    }

    pub fn into_visit(self) -> Visit {
        Visit::new(self.occurred_at, self.user_agent, self.referrer)
    }
}
