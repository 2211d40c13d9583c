//! Chain Hasher
//!
//! Deterministic SHA-256 over an entry's fields, the previous entry's
//! hash, and a key derived from the 15-minute (configurable) window the
//! entry's timestamp falls in. No I/O.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::config::{DEFAULT_HASH_PERIOD_SECONDS, DEFAULT_HASH_SALT};
use crate::ledger::entry::{format_timestamp, truncate_to_micros, LedgerEntry, PendingEntry};

/// The fields that feed an entry's hash.
#[derive(Debug, Clone)]
pub struct HashInput<'a> {
    pub tenant_id: &'a str,
    pub sequence: i64,
    pub actor_name: &'a str,
    pub source_ip: &'a str,
    pub browser: &'a str,
    pub operating_system: &'a str,
    pub entity_kind: &'a str,
    pub operation_kind: &'a str,
    pub previous_hash: Option<&'a str>,
    pub payload: &'a Value,
    pub status: &'a str,
    pub timestamp: Option<DateTime<Utc>>,
}

impl<'a> From<&'a LedgerEntry> for HashInput<'a> {
    fn from(entry: &'a LedgerEntry) -> Self {
        Self {
            tenant_id: &entry.tenant_id,
            sequence: entry.sequence,
            actor_name: &entry.actor_name,
            source_ip: &entry.source_ip,
            browser: &entry.browser,
            operating_system: &entry.operating_system,
            entity_kind: &entry.entity_kind,
            operation_kind: &entry.operation_kind,
            previous_hash: entry.previous_hash.as_deref(),
            payload: &entry.payload,
            status: &entry.status,
            timestamp: Some(entry.timestamp),
        }
    }
}

impl<'a> From<&'a PendingEntry> for HashInput<'a> {
    fn from(entry: &'a PendingEntry) -> Self {
        Self {
            tenant_id: &entry.tenant_id,
            sequence: entry.sequence,
            actor_name: &entry.actor_name,
            source_ip: &entry.source_ip,
            browser: &entry.browser,
            operating_system: &entry.operating_system,
            entity_kind: &entry.entity_kind,
            operation_kind: &entry.operation_kind,
            previous_hash: entry.previous_hash.as_deref(),
            payload: &entry.payload,
            status: &entry.status,
            timestamp: Some(entry.timestamp),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChainHasher {
    period_seconds: u64,
    salt: String,
}

impl Default for ChainHasher {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_PERIOD_SECONDS, DEFAULT_HASH_SALT)
    }
}

impl ChainHasher {
    /// `period_seconds` must be non-zero; zero is treated as one second.
    pub fn new(period_seconds: u64, salt: impl Into<String>) -> Self {
        Self {
            period_seconds: period_seconds.max(1),
            salt: salt.into(),
        }
    }

    pub fn period_seconds(&self) -> u64 {
        self.period_seconds
    }

    /// Index of the hashing window containing `timestamp` (floor division).
    pub fn period_index(&self, timestamp: &DateTime<Utc>) -> i64 {
        timestamp.timestamp().div_euclid(self.period_seconds as i64)
    }

    /// Key material shared by every entry written in the same window, across all tenants.
    pub fn period_key(&self, timestamp: &DateTime<Utc>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}:{}", self.salt, self.period_index(timestamp)).as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Canonical string: a JSON object with keys sorted at every level.
    pub fn canonical_string(&self, input: &HashInput<'_>) -> String {
        let timestamp = input
            .timestamp
            .unwrap_or_else(|| truncate_to_micros(Utc::now()));

        let mut fields: BTreeMap<&str, Value> = BTreeMap::new();
        fields.insert("tenant_id", Value::from(input.tenant_id));
        fields.insert("sequence", Value::from(input.sequence));
        fields.insert("actor_name", Value::from(input.actor_name));
        fields.insert("source_ip", Value::from(input.source_ip));
        fields.insert("browser", Value::from(input.browser));
        fields.insert("operating_system", Value::from(input.operating_system));
        fields.insert("entity_kind", Value::from(input.entity_kind));
        fields.insert("operation_kind", Value::from(input.operation_kind));
        fields.insert(
            "previous_hash",
            input.previous_hash.map(Value::from).unwrap_or(Value::Null),
        );
        fields.insert("payload", canonicalize(input.payload));
        fields.insert("status", Value::from(input.status));
        fields.insert("timestamp", Value::from(format_timestamp(&timestamp)));
        fields.insert("period_key", Value::from(self.period_key(&timestamp)));

        // BTreeMap<&str, Value> serializes in key order and cannot fail.
        serde_json::to_string(&fields).unwrap_or_default()
    }

    /// Hex-encoded SHA-256 of the canonical string.
    pub fn compute_hash(&self, input: &HashInput<'_>) -> String {
        let canonical = self.canonical_string(input);
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn hash_entry(&self, entry: &LedgerEntry) -> String {
        self.compute_hash(&HashInput::from(entry))
    }
}

/// Rebuild objects in sorted key order regardless of serde_json's map flavour.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            let mut out = Map::new();
            for (k, v) in sorted {
                out.insert(k.clone(), v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
