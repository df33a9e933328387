//! Core domain entities representing the business data model.
//!
//! # Entity Types
//!
//! - [`Link`] - A shortened URL with its visit history
//! - [`Visit`] - A single recorded redirect
//! - [`DetailedStats`] - Exact analytics derived from a durable record
//!
//! Creation and partial updates go through [`NewLink`] and [`LinkPatch`].

pub mod link;
pub mod stats;
pub mod visit;

pub use link::{Link, LinkPatch, NewLink};
pub use stats::{DetailedStats, ReferrerCount};
pub use visit::Visit;
