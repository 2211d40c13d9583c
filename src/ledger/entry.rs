//! Ledger Entry
//!
//! Defines the immutable, hash-chained record written for every
//! mutating business operation, and the actor context captured with it.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Canonical operation kinds. `operation_kind` stays an open string.
pub const OPERATION_CREATE: &str = "CREATE";
pub const OPERATION_UPDATE: &str = "UPDATE";
pub const OPERATION_DELETE: &str = "DELETE";

pub const DEFAULT_STATUS: &str = "success";
pub const ANONYMOUS_ACTOR: &str = "Anonim";

/// One immutable audit record, chained per tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Storage identifier, assigned on append.
    pub id: i64,
    pub tenant_id: String,
    /// Position in the tenant's chain, starting at 1.
    pub sequence: i64,
    pub actor_name: String,
    pub source_ip: String,
    pub browser: String,
    pub operating_system: String,
    pub entity_kind: String,
    pub operation_kind: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub current_hash: String,
    pub previous_hash: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn is_first(&self) -> bool {
        self.previous_hash.is_none()
    }

    pub fn timestamp_string(&self) -> String {
        format_timestamp(&self.timestamp)
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "{}#{} {} {} by {} ({})",
            self.tenant_id,
            self.sequence,
            self.operation_kind,
            self.entity_kind,
            self.actor_name,
            short_hash(&self.current_hash)
        )
    }
}

/// An entry that has been hashed but not yet persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEntry {
    pub tenant_id: String,
    pub sequence: i64,
    pub actor_name: String,
    pub source_ip: String,
    pub browser: String,
    pub operating_system: String,
    pub entity_kind: String,
    pub operation_kind: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub current_hash: String,
    pub previous_hash: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl PendingEntry {
    pub fn into_entry(self, id: i64) -> LedgerEntry {
        LedgerEntry {
            id,
            tenant_id: self.tenant_id,
            sequence: self.sequence,
            actor_name: self.actor_name,
            source_ip: self.source_ip,
            browser: self.browser,
            operating_system: self.operating_system,
            entity_kind: self.entity_kind,
            operation_kind: self.operation_kind,
            payload: self.payload,
            status: self.status,
            current_hash: self.current_hash,
            previous_hash: self.previous_hash,
            timestamp: self.timestamp,
        }
    }
}

/// Who performed an operation, as extracted by the caller from its request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActorContext {
    pub name: String,
    pub source_ip: String,
    pub browser: String,
    pub operating_system: String,
    /// Tenant the actor is currently working in; used when no tenant is given explicitly.
    pub active_tenant: Option<String>,
}

impl ActorContext {
    pub fn new(
        name: impl Into<String>,
        source_ip: impl Into<String>,
        browser: impl Into<String>,
        operating_system: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_ip: source_ip.into(),
            browser: browser.into(),
            operating_system: operating_system.into(),
            active_tenant: None,
        }
    }

    pub fn anonymous(
        source_ip: impl Into<String>,
        browser: impl Into<String>,
        operating_system: impl Into<String>,
    ) -> Self {
        Self::new(ANONYMOUS_ACTOR, source_ip, browser, operating_system)
    }

    pub fn with_active_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.active_tenant = Some(tenant_id.into());
        self
    }
}

/// Timestamps are truncated to microseconds so the stored text re-hashes identically.
pub fn truncate_to_micros(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    let nanos = timestamp.timestamp_subsec_nanos();
    timestamp - chrono::Duration::nanoseconds(i64::from(nanos % 1_000))
}

pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// First 12 characters of a hash. Stored hashes are untrusted text, so this cuts on a char boundary.
pub fn short_hash(hash: &str) -> &str {
    hash.char_indices().nth(12).map_or(hash, |(i, _)| &hash[..i])
}
