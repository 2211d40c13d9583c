//! Ledger recorder
//!
//! Appends hash-chained entries for business operations and serves
//! ordered per-tenant reads. Appends for the same tenant are serialized
//! so two writers can never chain onto the same predecessor.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error};

use super::entry::{
    short_hash, truncate_to_micros, ActorContext, LedgerEntry, PendingEntry, DEFAULT_STATUS,
};
use super::hasher::{ChainHasher, HashInput};
use super::payload::RecordPayload;
use super::store::LedgerBackend;
use crate::config::LedgerConfig;
use crate::error::LedgerError;

/// What `log_operation` does when recording fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordFailurePolicy {
    /// Return the error to the business operation.
    #[default]
    Propagate,
    /// Log the error and let the business operation continue.
    LogAndContinue,
}

#[derive(Clone)]
pub struct Ledger {
    backend: Arc<dyn LedgerBackend>,
    hasher: ChainHasher,
    failure_policy: RecordFailurePolicy,
    tenant_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl Ledger {
    pub fn new(backend: Arc<dyn LedgerBackend>, hasher: ChainHasher) -> Self {
        Self {
            backend,
            hasher,
            failure_policy: RecordFailurePolicy::Propagate,
            tenant_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn from_config(backend: Arc<dyn LedgerBackend>, config: &LedgerConfig) -> Self {
        Self::new(
            backend,
            ChainHasher::new(config.hash_period_seconds, config.hash_salt.clone()),
        )
        .with_failure_policy(config.record_failure_policy)
    }

    pub fn with_failure_policy(mut self, policy: RecordFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn hasher(&self) -> &ChainHasher {
        &self.hasher
    }

    pub fn backend(&self) -> Arc<dyn LedgerBackend> {
        Arc::clone(&self.backend)
    }

    pub fn failure_policy(&self) -> RecordFailurePolicy {
        self.failure_policy
    }

    /// Record one business operation and return the stored, chained entry.
    ///
    /// The tenant is `tenant_id` when given, otherwise the actor's active
    /// tenant. Storage failures are always returned to the caller.
    pub async fn record(
        &self,
        tenant_id: Option<&str>,
        actor: &ActorContext,
        entity_kind: &str,
        operation_kind: &str,
        payload: impl Into<RecordPayload>,
        status: Option<&str>,
    ) -> Result<LedgerEntry, LedgerError> {
        let tenant_id = resolve_tenant(tenant_id, actor)?;
        let payload = payload.into().sanitize();

        let lock = self.tenant_lock(&tenant_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.append_chained(
                tenant_id.clone(),
                actor,
                entity_kind,
                operation_kind,
                payload,
                status,
            )
            .await
        };
        self.release_tenant_lock(&tenant_id, lock).await;

        let entry = result?;
        debug!(
            "Recorded ledger entry {} (prev {})",
            entry.summary(),
            entry.previous_hash.as_deref().map(short_hash).unwrap_or("none")
        );
        Ok(entry)
    }

    /// Read the chain head, hash the new entry onto it and append. Caller holds the tenant lock.
    async fn append_chained(
        &self,
        tenant_id: String,
        actor: &ActorContext,
        entity_kind: &str,
        operation_kind: &str,
        payload: serde_json::Value,
        status: Option<&str>,
    ) -> Result<LedgerEntry, LedgerError> {
        let latest = self.backend.latest(&tenant_id).await?;

        let now = truncate_to_micros(Utc::now());
        let (sequence, previous_hash, timestamp) = match &latest {
            Some(prev) => (
                prev.sequence + 1,
                Some(prev.current_hash.clone()),
                now.max(prev.timestamp),
            ),
            None => (1, None, now),
        };

        let mut pending = PendingEntry {
            tenant_id,
            sequence,
            actor_name: actor.name.clone(),
            source_ip: actor.source_ip.clone(),
            browser: actor.browser.clone(),
            operating_system: actor.operating_system.clone(),
            entity_kind: entity_kind.to_string(),
            operation_kind: operation_kind.to_string(),
            payload,
            status: status.unwrap_or(DEFAULT_STATUS).to_string(),
            current_hash: String::new(),
            previous_hash,
            timestamp,
        };
        let current_hash = self.hasher.compute_hash(&HashInput::from(&pending));
        pending.current_hash = current_hash;

        self.backend.append(pending).await
    }

    /// Record under the configured failure policy.
    ///
    /// With [`RecordFailurePolicy::LogAndContinue`] a failure is logged and
    /// `Ok(None)` returned so the business operation can proceed.
    pub async fn log_operation(
        &self,
        tenant_id: Option<&str>,
        actor: &ActorContext,
        entity_kind: &str,
        operation_kind: &str,
        payload: impl Into<RecordPayload>,
        status: Option<&str>,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        match self
            .record(tenant_id, actor, entity_kind, operation_kind, payload, status)
            .await
        {
            Ok(entry) => Ok(Some(entry)),
            Err(e) if self.failure_policy == RecordFailurePolicy::LogAndContinue => {
                error!(
                    "Failed to record {} {} for tenant {:?}: {}",
                    operation_kind, entity_kind, tenant_id, e
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// All entries of a tenant in ascending timestamp order.
    pub async fn list_by_tenant(&self, tenant_id: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.backend.list_by_tenant(tenant_id).await
    }

    pub async fn head(&self, tenant_id: &str) -> Result<Option<LedgerEntry>, LedgerError> {
        self.backend.latest(tenant_id).await
    }

    pub async fn tenants(&self) -> Result<Vec<String>, LedgerError> {
        self.backend.list_tenants().await
    }

    /// Entries with `start <= timestamp <= end`.
    pub async fn entries_in_range(
        &self,
        tenant_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let entries = self.list_by_tenant(tenant_id).await?;
        Ok(entries
            .into_iter()
            .filter(|entry| entry.timestamp >= start && entry.timestamp <= end)
            .collect())
    }

    pub async fn entries_for_entity(
        &self,
        tenant_id: &str,
        entity_kind: &str,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let entries = self.list_by_tenant(tenant_id).await?;
        Ok(entries
            .into_iter()
            .filter(|entry| entry.entity_kind == entity_kind)
            .collect())
    }

    async fn tenant_lock(&self, tenant_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.tenant_locks.lock().await;
        Arc::clone(
            locks
                .entry(tenant_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Drop the tenant's lock from the map once no other writer holds or awaits it.
    async fn release_tenant_lock(&self, tenant_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.tenant_locks.lock().await;
        // One reference in the map, one here.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(tenant_id);
        }
    }
}

fn resolve_tenant(explicit: Option<&str>, actor: &ActorContext) -> Result<String, LedgerError> {
    let usable = |tenant: &&str| !tenant.trim().is_empty();
    explicit
        .filter(usable)
        .or(actor.active_tenant.as_deref().filter(usable))
        .map(|tenant| tenant.trim().to_string())
        .ok_or(LedgerError::MissingTenantContext)
}
