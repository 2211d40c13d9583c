use async_trait::async_trait;

use crate::error::LedgerError;
use crate::ledger::entry::{LedgerEntry, PendingEntry};

/// A stored entry as read back for verification.
///
/// `defect` is set when a column no longer decodes. The entry then carries
/// the raw text in `payload` and a placeholder timestamp, and must be
/// treated as corrupt rather than trusted.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedEntry {
    pub entry: LedgerEntry,
    pub defect: Option<String>,
}

impl ScannedEntry {
    pub fn intact(entry: LedgerEntry) -> Self {
        Self {
            entry,
            defect: None,
        }
    }
}

/// Durable, append-only storage for ledger entries.
///
/// Implementations must keep entries partitioned by tenant and return
/// them ordered by `(timestamp, sequence)`. They must also reject a second
/// entry for the same `(tenant_id, sequence)` with
/// [`LedgerError::ConcurrentAppend`].
#[async_trait]
pub trait LedgerBackend: Send + Sync {
    /// Most recent entry of a tenant, or `None` for an empty chain.
    async fn latest(&self, tenant_id: &str) -> Result<Option<LedgerEntry>, LedgerError>;

    /// Persist a hashed entry and return it with its assigned id.
    async fn append(&self, entry: PendingEntry) -> Result<LedgerEntry, LedgerError>;

    /// All entries of a tenant, ascending.
    async fn list_by_tenant(&self, tenant_id: &str) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// All entries of a tenant, ascending, keeping rows whose columns no
    /// longer decode instead of failing the whole read.
    ///
    /// Backends that cannot hold undecodable rows use the default.
    async fn scan_by_tenant(&self, tenant_id: &str) -> Result<Vec<ScannedEntry>, LedgerError> {
        Ok(self
            .list_by_tenant(tenant_id)
            .await?
            .into_iter()
            .map(ScannedEntry::intact)
            .collect())
    }

    /// Every tenant owning at least one entry.
    async fn list_tenants(&self) -> Result<Vec<String>, LedgerError>;

    async fn entry_count(&self, tenant_id: &str) -> Result<u64, LedgerError>;
}
