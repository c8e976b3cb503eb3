//! Hash calculator for the audit chain.
//!
//! `compute_hash(entry, previous_hash)` serializes the entry into a canonical
//! compact JSON document and returns its SHA-256 digest as 64 lowercase hex
//! characters. Field order in the document is fixed:
//!
//! `id, timestamp, actorEmail, actorRole, action, resourceType, resourceId,
//! ipAddress, userAgent, requestMethod, requestPath, status, errorCode,
//! errorMessage, metadata, previousHash`
//!
//! - absent values are encoded as `null`, so `None` and `Some("")` differ;
//! - `timestamp` is RFC 3339 UTC with microsecond precision;
//! - `metadata` objects are re-keyed in sorted order at every depth;
//! - `previousHash` is the seed passed in, not the entry's stored link.
//!
//! `actor_id` is not part of the document. It is the one column the storage
//! enforcer allows to be nulled when a principal is deleted, and that update
//! must leave the chain intact. Identity stays committed via email and role.

use chrono::SecondsFormat;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use shared::crypto::sha256_hex;

use crate::models::AuditLogEntry;

/// `previous_hash` of the first entry in a log.
pub const GENESIS_PREVIOUS_HASH: &str = "";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalEntry<'a> {
    id: i64,
    timestamp: String,
    actor_email: Option<&'a str>,
    actor_role: Option<&'a str>,
    action: &'a str,
    resource_type: Option<&'a str>,
    resource_id: Option<&'a str>,
    ip_address: Option<&'a str>,
    user_agent: Option<&'a str>,
    request_method: Option<&'a str>,
    request_path: Option<&'a str>,
    status: &'static str,
    error_code: Option<&'a str>,
    error_message: Option<&'a str>,
    metadata: Option<JsonValue>,
    previous_hash: &'a str,
}

/// Canonical text that [`compute_hash`] digests.
///
/// # Panics
///
/// Never in practice: every field is a string, integer or JSON value, all of
/// which serde_json serializes infallibly.
pub fn canonical_form(entry: &AuditLogEntry, previous_hash: &str) -> String {
    let canonical = CanonicalEntry {
        id: entry.id,
        timestamp: entry
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Micros, true),
        actor_email: entry.actor_email.as_deref(),
        actor_role: entry.actor_role.as_deref(),
        action: &entry.action,
        resource_type: entry.resource_type.as_deref(),
        resource_id: entry.resource_id.as_deref(),
        ip_address: entry.ip_address.as_deref(),
        user_agent: entry.user_agent.as_deref(),
        request_method: entry.request_method.as_deref(),
        request_path: entry.request_path.as_deref(),
        status: entry.status.as_str(),
        error_code: entry.error_code.as_deref(),
        error_message: entry.error_message.as_deref(),
        metadata: entry.metadata.as_ref().map(sorted_keys),
        previous_hash,
    };

    serde_json::to_string(&canonical).expect("canonical audit entry is always serializable")
}

/// Digest linking `entry` (chained against `previous_hash`) to its successor.
pub fn compute_hash(entry: &AuditLogEntry, previous_hash: &str) -> String {
    sha256_hex(&canonical_form(entry, previous_hash))
}

/// Seed for the entry appended after `tail`.
pub fn chain_seed(tail: Option<&AuditLogEntry>) -> String {
    match tail {
        None => GENESIS_PREVIOUS_HASH.to_string(),
        Some(tail) => compute_hash(
            tail,
            tail.previous_hash.as_deref().unwrap_or(GENESIS_PREVIOUS_HASH),
        ),
    }
}

/// Assigns chain links to a sequence of entries visited in ascending `id` order.
///
/// Used by the backfill, which must link each row against the *original*
/// content of its predecessor and the link it was just given.
#[derive(Debug, Clone, Default)]
pub struct ChainLinker {
    next_seed: String,
}

impl ChainLinker {
    /// A linker positioned before the first entry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the `previous_hash` for `entry` and advances past it.
    pub fn link(&mut self, entry: &AuditLogEntry) -> String {
        let assigned = std::mem::take(&mut self.next_seed);
        self.next_seed = compute_hash(entry, &assigned);
        assigned
    }

    /// Seed the next linked entry will receive.
    pub fn next_seed(&self) -> &str {
        &self.next_seed
    }
}

fn sorted_keys(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), sorted_keys(&map[key]));
            }
            JsonValue::Object(sorted)
        }
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(sorted_keys).collect()),
        other => other.clone(),
    }
}
