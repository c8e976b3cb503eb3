//! Streaming chain verifier.
//!
//! Entries are fed in ascending `id` order; only the previous entry is kept,
//! so memory use is independent of log size.
//!
//! Detection latency: altering the content of entry `k` does not change the
//! `previous_hash` stored on `k`, so `k` itself still passes. The alteration
//! shows up on `k + 1`, whose stored link was computed from the original
//! content. Tampering with the newest entry is therefore invisible until a
//! successor exists, and a successor appended *after* the tampering chains
//! against the altered content and hides it for good. Only a digest of the
//! head copied somewhere else (see `head_hash`) closes that gap.

use crate::models::{AuditLogEntry, ChainVerificationReport, TamperIssue, TamperedEntry};
use crate::services::hash_chain::{chain_seed, GENESIS_PREVIOUS_HASH};

/// Incremental verifier over an ordered stream of entries.
#[derive(Debug, Default)]
pub struct ChainVerifier {
    previous: Option<AuditLogEntry>,
    total: u64,
    tampered: Vec<TamperedEntry>,
}

impl ChainVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `entry` against its predecessor and remember it.
    pub fn observe(&mut self, entry: AuditLogEntry) {
        self.total += 1;

        match self.previous.as_ref() {
            None => {
                // Legacy rows may carry NULL; anything but empty is a forged genesis.
                if entry
                    .previous_hash
                    .as_deref()
                    .is_some_and(|stored| !stored.is_empty())
                {
                    self.tampered.push(TamperedEntry::new(
                        &entry,
                        GENESIS_PREVIOUS_HASH,
                        TamperIssue::UnexpectedGenesisHash,
                    ));
                }
            }
            Some(previous) => {
                let expected = chain_seed(Some(previous));
                match entry.previous_hash.as_deref() {
                    None => self.tampered.push(TamperedEntry::new(
                        &entry,
                        expected,
                        TamperIssue::MissingHash,
                    )),
                    Some(stored) if stored != expected => self.tampered.push(
                        TamperedEntry::new(&entry, expected, TamperIssue::ChainBroken),
                    ),
                    Some(_) => {}
                }
            }
        }

        self.previous = Some(entry);
    }

    /// Number of entries observed so far.
    pub fn observed(&self) -> u64 {
        self.total
    }

    pub fn finish(self) -> ChainVerificationReport {
        let flagged = self.tampered.len() as u64;
        let is_valid = flagged == 0;
        let message = if is_valid {
            format!("Audit log chain verified: {} entries intact", self.total)
        } else {
            format!(
                "Audit log chain verification failed: {} of {} entries flagged",
                flagged, self.total
            )
        };

        ChainVerificationReport {
            is_valid,
            total_logs: self.total,
            verified_logs: self.total - flagged,
            tampered_entries: self.tampered,
            head_hash: self.previous.as_ref().map(|tail| chain_seed(Some(tail))),
            message,
        }
    }
}

/// Verify an in-memory sequence of entries.
pub fn verify_chain<I>(entries: I) -> ChainVerificationReport
where
    I: IntoIterator<Item = AuditLogEntry>,
{
    let mut verifier = ChainVerifier::new();
    for entry in entries {
        verifier.observe(entry);
    }
    verifier.finish()
}
