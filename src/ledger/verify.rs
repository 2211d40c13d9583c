//! Chain Verification
//!
//! Replays a tenant's chain through the hasher and reports the first
//! entry whose stored hash or link does not hold.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::entry::{short_hash, LedgerEntry};
use super::hasher::ChainHasher;
use super::recorder::Ledger;
use super::store::LedgerBackend;
use crate::error::LedgerError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerifyMode {
    /// Carry the previous verified hash forward and require every entry to link to it.
    #[default]
    #[serde(rename = "linked")]
    Linked,
    /// Check only that each entry's hash matches its own stored fields,
    /// trusting the stored `previous_hash`.
    #[serde(rename = "stored")]
    StoredLink,
}

impl FromStr for VerifyMode {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linked" => Ok(Self::Linked),
            "stored" => Ok(Self::StoredLink),
            other => Err(LedgerError::Config(format!(
                "Unknown verify mode: {} (expected linked or stored)",
                other
            ))),
        }
    }
}

impl fmt::Display for VerifyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linked => write!(f, "linked"),
            Self::StoredLink => write!(f, "stored"),
        }
    }
}

/// Why an entry failed verification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CorruptionKind {
    /// Recomputed hash differs from the stored one.
    HashMismatch { expected: String, stored: String },
    /// Stored `previous_hash` does not point at the prior entry.
    BrokenLink {
        expected: Option<String>,
        stored: Option<String>,
    },
    /// A stored column no longer decodes, so the entry cannot be rehashed.
    Undecodable { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainVerification {
    pub tenant_id: String,
    pub is_valid: bool,
    pub entries_checked: usize,
    pub first_corrupt_entry: Option<LedgerEntry>,
    pub corruption: Option<CorruptionKind>,
}

impl ChainVerification {
    fn intact(tenant_id: &str, entries_checked: usize) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            is_valid: true,
            entries_checked,
            first_corrupt_entry: None,
            corruption: None,
        }
    }

    fn corrupt(
        tenant_id: &str,
        entries_checked: usize,
        entry: &LedgerEntry,
        corruption: CorruptionKind,
    ) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            is_valid: false,
            entries_checked,
            first_corrupt_entry: Some(entry.clone()),
            corruption: Some(corruption),
        }
    }

    /// `(is_valid, first_corrupt_entry)`
    pub fn outcome(&self) -> (bool, Option<&LedgerEntry>) {
        (self.is_valid, self.first_corrupt_entry.as_ref())
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        match (&self.first_corrupt_entry, &self.corruption) {
            (Some(entry), Some(CorruptionKind::HashMismatch { expected, stored })) => format!(
                "tenant {}: corrupt at entry {} (sequence {}): hash mismatch, expected {} stored {}",
                self.tenant_id,
                entry.id,
                entry.sequence,
                short_hash(expected),
                short_hash(stored)
            ),
            (Some(entry), Some(CorruptionKind::Undecodable { reason })) => format!(
                "tenant {}: corrupt at entry {} (sequence {}): undecodable row, {}",
                self.tenant_id, entry.id, entry.sequence, reason
            ),
            (Some(entry), Some(CorruptionKind::BrokenLink { expected, stored })) => format!(
                "tenant {}: corrupt at entry {} (sequence {}): broken link, expected {} stored {}",
                self.tenant_id,
                entry.id,
                entry.sequence,
                expected.as_deref().map(short_hash).unwrap_or("none"),
                stored.as_deref().map(short_hash).unwrap_or("none")
            ),
            _ => format!(
                "tenant {}: chain intact ({} entries)",
                self.tenant_id, self.entries_checked
            ),
        }
    }
}

#[derive(Clone)]
pub struct ChainVerifier {
    backend: Arc<dyn LedgerBackend>,
    hasher: ChainHasher,
    mode: VerifyMode,
}

impl ChainVerifier {
    pub fn new(backend: Arc<dyn LedgerBackend>, hasher: ChainHasher, mode: VerifyMode) -> Self {
        Self {
            backend,
            hasher,
            mode,
        }
    }

    /// Verifier sharing the ledger's storage and hashing parameters.
    pub fn for_ledger(ledger: &Ledger, mode: VerifyMode) -> Self {
        Self::new(ledger.backend(), ledger.hasher().clone(), mode)
    }

    pub fn mode(&self) -> VerifyMode {
        self.mode
    }

    /// Load a tenant's chain and verify it.
    ///
    /// A storage failure is returned as an error, never as corruption.
    pub async fn verify(&self, tenant_id: &str) -> Result<ChainVerification, LedgerError> {
        let scanned = self.backend.scan_by_tenant(tenant_id).await?;
        let result = self.verify_chain(
            tenant_id,
            scanned.iter().map(|s| (&s.entry, s.defect.as_deref())),
        );
        if result.is_valid {
            info!("Ledger verification passed: {}", result.summary());
        } else {
            warn!("Ledger verification failed: {}", result.summary());
        }
        Ok(result)
    }

    /// Verify an already loaded chain, ascending by timestamp.
    pub fn verify_entries(&self, tenant_id: &str, entries: &[LedgerEntry]) -> ChainVerification {
        self.verify_chain(tenant_id, entries.iter().map(|entry| (entry, None)))
    }

    fn verify_chain<'a>(
        &self,
        tenant_id: &str,
        entries: impl Iterator<Item = (&'a LedgerEntry, Option<&'a str>)>,
    ) -> ChainVerification {
        let mut expected_previous: Option<&str> = None;
        let mut checked = 0;

        for (entry, defect) in entries {
            checked += 1;

            if let Some(reason) = defect {
                return ChainVerification::corrupt(
                    tenant_id,
                    checked,
                    entry,
                    CorruptionKind::Undecodable {
                        reason: reason.to_string(),
                    },
                );
            }

            let expected = self.hasher.hash_entry(entry);
            if expected != entry.current_hash {
                return ChainVerification::corrupt(
                    tenant_id,
                    checked,
                    entry,
                    CorruptionKind::HashMismatch {
                        expected,
                        stored: entry.current_hash.clone(),
                    },
                );
            }

            if self.mode == VerifyMode::Linked && entry.previous_hash.as_deref() != expected_previous {
                return ChainVerification::corrupt(
                    tenant_id,
                    checked,
                    entry,
                    CorruptionKind::BrokenLink {
                        expected: expected_previous.map(str::to_string),
                        stored: entry.previous_hash.clone(),
                    },
                );
            }

            expected_previous = Some(&entry.current_hash);
        }

        debug!("Verified {} entries for tenant {}", checked, tenant_id);
        ChainVerification::intact(tenant_id, checked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::entry::ActorContext;
    use crate::ledger::memory::MemoryLedger;
    use serde_json::json;

    async fn seeded(count: usize) -> (Ledger, MemoryLedger, Vec<LedgerEntry>) {
        let store = MemoryLedger::new();
        let ledger = Ledger::new(Arc::new(store.clone()), ChainHasher::default());
        let actor = ActorContext::new("alice", "10.0.0.1", "Firefox", "Linux");
        let mut entries = Vec::new();
        for i in 0..count {
            entries.push(
                ledger
                    .record(Some("acme"), &actor, "Order", "UPDATE", json!({"step": i}), None)
                    .await
                    .unwrap(),
            );
        }
        (ledger, store, entries)
    }

    #[tokio::test]
    async fn test_intact_chain_verifies() {
        let (ledger, _, _) = seeded(5).await;
        let verifier = ChainVerifier::for_ledger(&ledger, VerifyMode::Linked);

        let result = verifier.verify("acme").await.unwrap();
        assert_eq!(result.outcome(), (true, None));
        assert_eq!(result.entries_checked, 5);
    }

    #[tokio::test]
    async fn test_empty_and_single_entry_chains() {
        let (ledger, _, _) = seeded(1).await;
        let verifier = ChainVerifier::for_ledger(&ledger, VerifyMode::Linked);

        assert!(verifier.verify("acme").await.unwrap().is_valid);
        let empty = verifier.verify("nobody").await.unwrap();
        assert!(empty.is_valid);
        assert_eq!(empty.entries_checked, 0);
    }

    #[tokio::test]
    async fn test_field_tamper_detected_in_both_modes() {
        let (ledger, store, entries) = seeded(4).await;
        store
            .overwrite(entries[1].id, |e| e.actor_name = "mallory".to_string())
            .await;

        for mode in [VerifyMode::Linked, VerifyMode::StoredLink] {
            let result = ChainVerifier::for_ledger(&ledger, mode)
                .verify("acme")
                .await
                .unwrap();
            assert!(!result.is_valid);
            assert_eq!(result.first_corrupt_entry.as_ref().unwrap().id, entries[1].id);
            assert!(matches!(result.corruption, Some(CorruptionKind::HashMismatch { .. })));
        }
    }

    #[tokio::test]
    async fn test_rehashed_rewrite_only_caught_when_linked() {
        let (ledger, store, entries) = seeded(4).await;
        let hasher = ledger.hasher().clone();
        store
            .overwrite(entries[1].id, |e| {
                e.payload = json!({"step": 99});
                e.current_hash = hasher.hash_entry(e);
            })
            .await;

        let stored = ChainVerifier::for_ledger(&ledger, VerifyMode::StoredLink)
            .verify("acme")
            .await
            .unwrap();
        assert!(stored.is_valid);

        let linked = ChainVerifier::for_ledger(&ledger, VerifyMode::Linked)
            .verify("acme")
            .await
            .unwrap();
        assert!(!linked.is_valid);
        assert_eq!(linked.first_corrupt_entry.unwrap().id, entries[2].id);
        assert!(matches!(linked.corruption, Some(CorruptionKind::BrokenLink { .. })));
    }

    #[tokio::test]
    async fn test_first_entry_must_not_claim_predecessor() {
        let (ledger, store, entries) = seeded(2).await;
        let hasher = ledger.hasher().clone();
        store
            .overwrite(entries[0].id, |e| {
                e.previous_hash = Some("deadbeef".to_string());
                e.current_hash = hasher.hash_entry(e);
            })
            .await;

        let result = ChainVerifier::for_ledger(&ledger, VerifyMode::Linked)
            .verify_entries("acme", &ledger.list_by_tenant("acme").await.unwrap());
        assert!(!result.is_valid);
        assert_eq!(result.first_corrupt_entry.unwrap().id, entries[0].id);
    }

    #[tokio::test]
    async fn test_non_ascii_stored_hash_is_reported() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_test_writer()
            .finish();
        let _default = tracing::subscriber::set_default(subscriber);

        let (ledger, store, entries) = seeded(3).await;
        store
            .overwrite(entries[1].id, |e| e.current_hash = "aééééééé".to_string())
            .await;

        let verifier = ChainVerifier::for_ledger(&ledger, VerifyMode::Linked);
        let result = tokio::spawn(async move { verifier.verify("acme").await })
            .await
            .unwrap()
            .unwrap();

        assert!(!result.is_valid);
        assert_eq!(result.first_corrupt_entry.as_ref().unwrap().id, entries[1].id);
        assert!(result.summary().contains("stored aééééééé"));
    }

    #[test]
    fn test_undecodable_entry_is_corruption() {
        let verifier = ChainVerifier::new(
            Arc::new(MemoryLedger::new()),
            ChainHasher::default(),
            VerifyMode::Linked,
        );
        let entry = LedgerEntry {
            id: 7,
            tenant_id: "acme".to_string(),
            sequence: 1,
            actor_name: "alice".to_string(),
            source_ip: "10.0.0.1".to_string(),
            browser: "Firefox".to_string(),
            operating_system: "Linux".to_string(),
            entity_kind: "Order".to_string(),
            operation_kind: "CREATE".to_string(),
            payload: json!("tampered"),
            status: "success".to_string(),
            current_hash: "00".to_string(),
            previous_hash: None,
            timestamp: chrono::Utc::now(),
        };

        let result = verifier.verify_chain("acme", [(&entry, Some("payload is not JSON"))].into_iter());
        assert!(!result.is_valid);
        assert_eq!(result.entries_checked, 1);
        assert_eq!(result.first_corrupt_entry.as_ref().unwrap().id, 7);
        assert!(matches!(result.corruption, Some(CorruptionKind::Undecodable { .. })));
        assert!(result.summary().contains("undecodable row"));
    }

    #[test]
    fn test_verify_mode_parsing() {
        assert_eq!("linked".parse::<VerifyMode>().unwrap(), VerifyMode::Linked);
        assert_eq!("Stored".parse::<VerifyMode>().unwrap(), VerifyMode::StoredLink);
        assert!("bogus".parse::<VerifyMode>().is_err());
        assert_eq!(VerifyMode::StoredLink.to_string(), "stored");
    }
}
