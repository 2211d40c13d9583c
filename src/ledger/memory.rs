//! In-process ledger backend
//!
//! Keeps every tenant's chain in memory behind a `RwLock`. Used by tests
//! and by embedders that do not need durability.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::entry::{LedgerEntry, PendingEntry};
use super::store::LedgerBackend;
use crate::error::LedgerError;

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    chains: BTreeMap<String, Vec<LedgerEntry>>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrite a stored entry in place, bypassing the hash chain.
    #[cfg(test)]
    pub(crate) async fn overwrite<F>(&self, id: i64, mutate: F) -> bool
    where
        F: FnOnce(&mut LedgerEntry),
    {
        let mut state = self.state.write().await;
        let found = state
            .chains
            .values_mut()
            .flat_map(|chain| chain.iter_mut())
            .find(|entry| entry.id == id);

        match found {
            Some(entry) => {
                mutate(entry);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl LedgerBackend for MemoryLedger {
    async fn latest(&self, tenant_id: &str) -> Result<Option<LedgerEntry>, LedgerError> {
        let state = self.state.read().await;
        Ok(state
            .chains
            .get(tenant_id)
            .and_then(|chain| chain.last())
            .cloned())
    }

    async fn append(&self, entry: PendingEntry) -> Result<LedgerEntry, LedgerError> {
        let mut state = self.state.write().await;

        let taken = state
            .chains
            .get(&entry.tenant_id)
            .map(|chain| chain.iter().any(|e| e.sequence == entry.sequence))
            .unwrap_or(false);
        if taken {
            return Err(LedgerError::ConcurrentAppend {
                tenant_id: entry.tenant_id,
            });
        }

        state.next_id += 1;
        let stored = entry.into_entry(state.next_id);
        let chain = state.chains.entry(stored.tenant_id.clone()).or_default();
        chain.push(stored.clone());
        chain.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then(a.sequence.cmp(&b.sequence))
        });

        Ok(stored)
    }

    async fn list_by_tenant(&self, tenant_id: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        let state = self.state.read().await;
        Ok(state.chains.get(tenant_id).cloned().unwrap_or_default())
    }

    async fn list_tenants(&self) -> Result<Vec<String>, LedgerError> {
        let state = self.state.read().await;
        Ok(state.chains.keys().cloned().collect())
    }

    async fn entry_count(&self, tenant_id: &str) -> Result<u64, LedgerError> {
        let state = self.state.read().await;
        Ok(state
            .chains
            .get(tenant_id)
            .map(|chain| chain.len() as u64)
            .unwrap_or(0))
    }
}
