//! Pure domain services: hashing, verification and event construction.

pub mod audit;
pub mod chain_verifier;
pub mod hash_chain;

pub use audit::AuditEventBuilder;
pub use chain_verifier::{verify_chain, ChainVerifier};
pub use hash_chain::{chain_seed, compute_hash, ChainLinker, GENESIS_PREVIOUS_HASH};
