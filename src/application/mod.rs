//! Application layer services implementing business logic.
//!
//! Services consume repository traits and the link cache and give the
//! presentation layer a small, infallible API.
//!
//! # Available Services
//!
//! - [`services::link_service::LinkService`] - Cache-aside reads, writes and visit recording
//! - [`services::visit_committer::VisitCommitter`] - Debounced write-behind of visit batches
//! - [`services::reconciler::Reconciler`] - Periodic cache preloading and batch recovery

pub mod services;
