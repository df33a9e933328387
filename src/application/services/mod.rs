//! Business logic services for the application layer.

pub mod link_service;
pub mod reconciler;
pub mod visit_committer;

pub use link_service::LinkService;
pub use reconciler::{ReconcileReport, Reconciler, ReconcilerConfig};
pub use visit_committer::{CommitterConfig, VisitCommitter};
