//! Tamper-evident audit log service.
//!
//! Wires the storage layer to the append engine, the integrity checks and
//! the two-phase startup sequence.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod metrics;
pub mod services;

pub use bootstrap::{bootstrap, BackfilledChain, ChainBootstrap, ProtectedChain};
pub use error::{BootstrapError, ServiceError};
