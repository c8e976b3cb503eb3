//! Persistence layer for the clinical audit chain.
//!
//! This crate contains:
//! - Database connection management
//! - Entity definitions (database row mappings)
//! - The `AuditLogStore` trait with PostgreSQL and SQLite implementations
//! - Schema migrations and the storage-level immutability triggers

pub mod db;
pub mod entities;
pub mod metrics;
pub mod repositories;
pub mod store;

pub use store::{AuditLogStore, Backend, EnforcerTriggers, PoolStats, ScanCompletion, StoreError};
