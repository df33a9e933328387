//! Infrastructure layer for external integrations.
//!
//! This layer implements interfaces defined by the domain layer, providing
//! concrete implementations for data persistence and caching.
//!
//! # Modules
//!
//! - [`cache`] - Key-value stores (Redis and in-memory) and the typed link cache
//! - [`persistence`] - PostgreSQL repository implementations

pub mod cache;
pub mod persistence;
