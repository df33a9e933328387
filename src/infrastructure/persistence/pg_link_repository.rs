//! PostgreSQL implementation of link repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::entities::{Link, LinkPatch, NewLink, Visit};
use crate::domain::repositories::LinkRepository;
use crate::error::AppError;

const LINK_COLUMNS: &str = "id, code, long_url, visit_count, expires_at, last_visited_at, \
                            owner_id, script, created_at";

#[derive(Debug, FromRow)]
struct LinkRow {
    id: i64,
    code: String,
    long_url: String,
    visit_count: i64,
    expires_at: Option<DateTime<Utc>>,
    last_visited_at: Option<DateTime<Utc>>,
    owner_id: Option<String>,
    script: Option<String>,
    created_at: DateTime<Utc>,
}

impl LinkRow {
    fn into_link(self, visits: Vec<Visit>) -> Link {
        Link {
            id: self.id,
            code: self.code,
            long_url: self.long_url,
            visit_count: self.visit_count,
            expires_at: self.expires_at,
            last_visited_at: self.last_visited_at,
            visits,
            owner_id: self.owner_id,
            script: self.script,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct VisitRow {
    link_id: i64,
    visited_at: DateTime<Utc>,
    user_agent: Option<String>,
    referrer: String,
}

/// Groups visit rows by link, keeping the row order (already chronological).
fn group_visits(rows: Vec<VisitRow>) -> HashMap<i64, Vec<Visit>> {
    let mut grouped: HashMap<i64, Vec<Visit>> = HashMap::new();
    for row in rows {
        grouped.entry(row.link_id).or_default().push(Visit {
            visited_at: row.visited_at,
            user_agent: row.user_agent,
            referrer: row.referrer,
        });
    }
    grouped
}

/// PostgreSQL repository for links and their visit history.
///
/// Visits live in `link_visits` and are attached to each returned [`Link`]
/// in chronological order.
pub struct PgLinkRepository {
    pool: Arc<PgPool>,
}

impl PgLinkRepository {
    /// Creates a new repository with a database connection pool.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn load_visits(&self, link_ids: &[i64]) -> Result<HashMap<i64, Vec<Visit>>, AppError> {
        if link_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, VisitRow>(
            r#"
            SELECT link_id, visited_at, user_agent, referrer
            FROM link_visits
            WHERE link_id = ANY($1)
            ORDER BY link_id, visited_at, id
            "#,
        )
        .bind(link_ids)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(group_visits(rows))
    }

    async fn attach_visits(&self, rows: Vec<LinkRow>) -> Result<Vec<Link>, AppError> {
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let mut visits = self.load_visits(&ids).await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                let history = visits.remove(&r.id).unwrap_or_default();
                r.into_link(history)
            })
            .collect())
    }
}

#[async_trait]
impl LinkRepository for PgLinkRepository {
    async fn find_by_code(&self, code: &str) -> Result<Option<Link>, AppError> {
        let row = sqlx::query_as::<_, LinkRow>(&format!(
            "SELECT {LINK_COLUMNS} FROM links WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(self.pool.as_ref())
        .await?;

        match row {
            Some(row) => Ok(self.attach_visits(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn create(&self, new_link: NewLink) -> Result<Link, AppError> {
        let row = sqlx::query_as::<_, LinkRow>(&format!(
            r#"
            INSERT INTO links (code, long_url, expires_at, owner_id, script)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {LINK_COLUMNS}
            "#
        ))
        .bind(&new_link.code)
        .bind(&new_link.long_url)
        .bind(new_link.expires_at)
        .bind(&new_link.owner_id)
        .bind(&new_link.script)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(row.into_link(Vec::new()))
    }

    async fn update(&self, id: i64, patch: LinkPatch) -> Result<Option<Link>, AppError> {
        let set_expiry = patch.expires_at.is_some();
        let set_script = patch.script.is_some();

        let row = sqlx::query_as::<_, LinkRow>(&format!(
            r#"
            UPDATE links SET
                long_url   = COALESCE($2, long_url),
                expires_at = CASE WHEN $3 THEN $4 ELSE expires_at END,
                script     = CASE WHEN $5 THEN $6 ELSE script END
            WHERE id = $1
            RETURNING {LINK_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(patch.long_url)
        .bind(set_expiry)
        .bind(patch.expires_at.flatten())
        .bind(set_script)
        .bind(patch.script.flatten())
        .fetch_optional(self.pool.as_ref())
        .await?;

        match row {
            Some(row) => Ok(self.attach_visits(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn delete(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM links WHERE id = $1")
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_by_owner(
        &self,
        owner_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<Link>, AppError> {
        let rows = sqlx::query_as::<_, LinkRow>(&format!(
            r#"
            SELECT {LINK_COLUMNS}
            FROM links
            WHERE owner_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#
        ))
        .bind(owner_id)
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        self.attach_visits(rows).await
    }

    async fn most_visited(&self, limit: i64) -> Result<Vec<Link>, AppError> {
        let rows = sqlx::query_as::<_, LinkRow>(&format!(
            r#"
            SELECT {LINK_COLUMNS}
            FROM links
            WHERE visit_count > 0
            ORDER BY visit_count DESC, id
            LIMIT $1
            "#
        ))
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        self.attach_visits(rows).await
    }

    async fn commit_visits(&self, id: i64, visits: &[Visit]) -> Result<bool, AppError> {
        let latest = visits.iter().map(|v| v.visited_at).max();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE links
            SET visit_count = visit_count + $2,
                last_visited_at = GREATEST(last_visited_at, $3)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(visits.len() as i64)
        .bind(latest)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        let visited_at: Vec<DateTime<Utc>> = visits.iter().map(|v| v.visited_at).collect();
        let user_agents: Vec<Option<String>> = visits.iter().map(|v| v.user_agent.clone()).collect();
        let referrers: Vec<String> = visits.iter().map(|v| v.referrer.clone()).collect();

        sqlx::query(
            r#"
            INSERT INTO link_visits (link_id, visited_at, user_agent, referrer)
            SELECT $1, t.visited_at, t.user_agent, t.referrer
            FROM UNNEST($2::timestamptz[], $3::text[], $4::text[])
                WITH ORDINALITY AS t(visited_at, user_agent, referrer, ord)
            ORDER BY t.ord
            "#,
        )
        .bind(id)
        .bind(visited_at)
        .bind(user_agents)
        .bind(referrers)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }
}
