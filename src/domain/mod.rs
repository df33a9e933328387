//! Domain layer containing business entities and repository contracts.
//!
//! # Architecture
//!
//! - [`entities`] - Core business data structures
//! - [`repositories`] - Durable store trait definitions
//! - [`visit_event`] - Visit metadata captured on the redirect path
//!
//! # Visit Processing Flow
//!
//! 1. The caller builds a [`visit_event::VisitEvent`] from the request
//! 2. [`crate::application::services::LinkService::record_visit`] bumps the
//!    cached counter and hands the visit to the write-behind committer
//! 3. [`crate::application::services::VisitCommitter`] batches visits per code
//!    and persists them via [`repositories::LinkRepository::commit_visits`]

pub mod entities;
pub mod repositories;
pub mod visit_event;
