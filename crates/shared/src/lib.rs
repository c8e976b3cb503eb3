//! Shared utilities and common types for the clinical audit chain.
//!
//! This crate provides common functionality used across all other crates:
//! - Cryptographic utilities (SHA-256 hex digests)
//! - Offset pagination math
//! - Reusable field validators

pub mod crypto;
pub mod pagination;
pub mod validation;
