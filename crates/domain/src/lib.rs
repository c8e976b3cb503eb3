//! Domain layer for the clinical audit chain.
//!
//! This crate contains:
//! - Domain models (audit log entries, events, verification reports)
//! - The hash calculator and chain verifier
//! - Event builders used by producers
//!
//! Nothing in here performs I/O.

pub mod models;
pub mod services;
