//! Repository trait for durable link records.

use crate::domain::entities::{Link, LinkPatch, NewLink, Visit};
use crate::error::AppError;
use async_trait::async_trait;

/// Durable record store for links and their visit history.
///
/// This is the authoritative state. Everything in the cache is derived from
/// what this trait returns.
///
/// # Implementations
///
/// - [`crate::infrastructure::persistence::PgLinkRepository`] - PostgreSQL implementation
/// - Test mocks available with `cfg(test)`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LinkRepository: Send + Sync + 'static {
    /// Finds a link by its short code, including its full visit history.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(Link))` if found
    /// - `Ok(None)` if not found
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Internal`] on database errors.
    async fn find_by_code(&self, code: &str) -> Result<Option<Link>, AppError>;

    /// Inserts a new link.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Conflict`] if the short code already exists.
    /// Returns [`AppError::Internal`] on database errors.
    async fn create(&self, new_link: NewLink) -> Result<Link, AppError>;

    /// Partially updates a link by id.
    ///
    /// Returns the updated record, or `Ok(None)` if no link has this id.
    async fn update(&self, id: i64, patch: LinkPatch) -> Result<Option<Link>, AppError>;

    /// Hard-deletes a link and its visit history.
    ///
    /// Returns `Ok(true)` if a row was removed.
    async fn delete(&self, id: i64) -> Result<bool, AppError>;

    /// Lists an owner's links, newest first, optionally limited.
    async fn list_by_owner(&self, owner_id: &str, limit: Option<i64>)
    -> Result<Vec<Link>, AppError>;

    /// Returns the `limit` links with the highest visit counts.
    async fn most_visited(&self, limit: i64) -> Result<Vec<Link>, AppError>;

    /// Appends `visits` to the link's history and adds `visits.len()` to its
    /// visit count in a single transaction.
    ///
    /// Returns `Ok(false)` if the link no longer exists.
    async fn commit_visits(&self, id: i64, visits: &[Visit]) -> Result<bool, AppError>;
}
