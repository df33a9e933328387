//! Exact visit statistics computed from a link's durable history.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use super::Link;

/// Number of visits from a single referrer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferrerCount {
    pub referrer: String,
    pub visits: usize,
}

/// Detailed statistics for one link.
///
/// Always derived from the durable record, never from a cached snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailedStats {
    pub link: Link,
    pub total: i64,
    pub last_day: usize,
    pub last_week: usize,
    pub last_month: usize,
    pub last_visited_at: Option<DateTime<Utc>>,
    pub top_referrers: Vec<ReferrerCount>,
}

impl DetailedStats {
    const TOP_REFERRERS: usize = 5;

    /// Builds statistics relative to `now`.
    ///
    /// Windows are rolling: the last 24 hours, 7 days and 30 days.
    pub fn from_link(link: Link, now: DateTime<Utc>) -> Self {
        let count_since = |window: Duration| {
            let since = now - window;
            link.visits
                .iter()
                .filter(|v| v.visited_at >= since && v.visited_at <= now)
                .count()
        };

        let last_day = count_since(Duration::days(1));
        let last_week = count_since(Duration::days(7));
        let last_month = count_since(Duration::days(30));

        let mut by_referrer: HashMap<&str, usize> = HashMap::new();
        for visit in &link.visits {
            *by_referrer.entry(visit.referrer.as_str()).or_default() += 1;
        }
        let mut top_referrers: Vec<ReferrerCount> = by_referrer
            .into_iter()
            .map(|(referrer, visits)| ReferrerCount {
                referrer: referrer.to_string(),
                visits,
            })
            .collect();
        top_referrers.sort_by(|a, b| b.visits.cmp(&a.visits).then(a.referrer.cmp(&b.referrer)));
        top_referrers.truncate(Self::TOP_REFERRERS);

        Self {
            total: link.visit_count,
            last_day,
            last_week,
            last_month,
            last_visited_at: link.last_visited_at,
            top_referrers,
            link,
        }
    }
}
