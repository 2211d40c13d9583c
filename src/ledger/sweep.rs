//! Periodic verification sweep
//!
//! Verifies every tenant's chain once per run. A tenant whose storage read
//! fails or times out is reported as failed and the sweep moves on; it is
//! never reported as corrupt.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::recorder::Ledger;
use super::store::LedgerBackend;
use super::verify::{ChainVerification, ChainVerifier, VerifyMode};
use crate::config::LedgerConfig;
use crate::error::LedgerError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SweepOutcome {
    Intact { entries_checked: usize },
    Corrupted { verification: ChainVerification },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantReport {
    pub tenant_id: String,
    pub outcome: SweepOutcome,
}

impl TenantReport {
    pub fn is_intact(&self) -> bool {
        matches!(self.outcome, SweepOutcome::Intact { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub reports: Vec<TenantReport>,
}

impl SweepReport {
    pub fn all_intact(&self) -> bool {
        self.reports.iter().all(TenantReport::is_intact)
    }

    pub fn corrupted(&self) -> Vec<&TenantReport> {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, SweepOutcome::Corrupted { .. }))
            .collect()
    }

    pub fn failed(&self) -> Vec<&TenantReport> {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, SweepOutcome::Failed { .. }))
            .collect()
    }

    pub fn summary(&self) -> String {
        format!(
            "sweep {}: {} tenants, {} corrupted, {} failed",
            self.run_id,
            self.reports.len(),
            self.corrupted().len(),
            self.failed().len()
        )
    }

    /// Process exit status for the report: 0 when every chain is intact, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.all_intact() {
            0
        } else {
            1
        }
    }

    /// Operator-facing report, one line per finding and a closing total.
    ///
    /// Intact tenants and run timing are listed only when `verbose`.
    pub fn render(&self, verbose: bool) -> String {
        let mut lines = Vec::new();
        for tenant in &self.reports {
            match &tenant.outcome {
                SweepOutcome::Intact { entries_checked } => {
                    if verbose {
                        lines.push(format!(
                            "✓ {}: {} entries intact",
                            tenant.tenant_id, entries_checked
                        ));
                    }
                }
                SweepOutcome::Corrupted { verification } => {
                    lines.push(format!("✗ {}", verification.summary()));
                }
                SweepOutcome::Failed { error } => {
                    lines.push(format!(
                        "! {}: verification failed: {}",
                        tenant.tenant_id, error
                    ));
                }
            }
        }

        if self.all_intact() {
            lines.push(format!("✓ {} tenant chains verified", self.reports.len()));
        } else {
            lines.push(format!(
                "✗ {} corrupted, {} failed of {} tenants",
                self.corrupted().len(),
                self.failed().len(),
                self.reports.len()
            ));
        }

        if verbose {
            let elapsed = (self.finished_at - self.started_at)
                .to_std()
                .unwrap_or(Duration::ZERO);
            lines.push(format!("Run {} took {:?}", self.run_id, elapsed));
        }

        lines.join("\n")
    }
}

#[derive(Clone)]
pub struct AuditSweep {
    backend: Arc<dyn LedgerBackend>,
    verifier: ChainVerifier,
    tenant_timeout: Duration,
}

impl AuditSweep {
    pub fn new(backend: Arc<dyn LedgerBackend>, verifier: ChainVerifier, tenant_timeout: Duration) -> Self {
        Self {
            backend,
            verifier,
            tenant_timeout,
        }
    }

    pub fn for_ledger(ledger: &Ledger, mode: VerifyMode, tenant_timeout: Duration) -> Self {
        Self::new(
            ledger.backend(),
            ChainVerifier::for_ledger(ledger, mode),
            tenant_timeout,
        )
    }

    pub fn from_config(ledger: &Ledger, config: &LedgerConfig) -> Self {
        Self::for_ledger(
            ledger,
            config.verify_mode,
            Duration::from_secs(config.verify_timeout_secs),
        )
    }

    /// Verify one tenant within the per-tenant time bound.
    pub async fn verify_tenant(&self, tenant_id: &str) -> TenantReport {
        let outcome = match tokio::time::timeout(self.tenant_timeout, self.verifier.verify(tenant_id)).await {
            Ok(Ok(verification)) if verification.is_valid => SweepOutcome::Intact {
                entries_checked: verification.entries_checked,
            },
            Ok(Ok(verification)) => {
                error!("Ledger corruption detected: {}", verification.summary());
                SweepOutcome::Corrupted { verification }
            }
            Ok(Err(e)) => {
                warn!("Ledger verification of tenant {} failed: {}", tenant_id, e);
                SweepOutcome::Failed { error: e.to_string() }
            }
            Err(_) => {
                let e = LedgerError::VerificationTimeout {
                    tenant_id: tenant_id.to_string(),
                    seconds: self.tenant_timeout.as_secs(),
                };
                warn!("{}", e);
                SweepOutcome::Failed { error: e.to_string() }
            }
        };

        TenantReport {
            tenant_id: tenant_id.to_string(),
            outcome,
        }
    }

    /// Verify every tenant once.
    ///
    /// Only a failure to list tenants aborts the run.
    pub async fn run_once(&self) -> Result<SweepReport, LedgerError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!("Starting ledger verification sweep {} ({})", run_id, self.verifier.mode());

        let tenants = self.backend.list_tenants().await?;
        let mut reports = Vec::with_capacity(tenants.len());
        for tenant_id in &tenants {
            reports.push(self.verify_tenant(tenant_id).await);
        }

        let report = SweepReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            reports,
        };
        info!("Finished ledger verification {}", report.summary());
        Ok(report)
    }

    /// Verify one named tenant, or every tenant when `tenant_id` is `None`.
    ///
    /// Naming a tenant without entries is an error, not an empty report.
    pub async fn run_for(&self, tenant_id: Option<&str>) -> Result<SweepReport, LedgerError> {
        let tenant_id = match tenant_id {
            Some(tenant_id) => tenant_id,
            None => return self.run_once().await,
        };

        if self.backend.latest(tenant_id).await?.is_none() {
            return Err(LedgerError::UnknownTenant(tenant_id.to_string()));
        }

        let started_at = Utc::now();
        let report = self.verify_tenant(tenant_id).await;
        Ok(SweepReport {
            run_id: Uuid::new_v4(),
            started_at,
            finished_at: Utc::now(),
            reports: vec![report],
        })
    }

    /// Run the sweep on a fixed interval until the task is aborted.
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once().await {
                    error!("Ledger verification sweep failed: {}", e);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::entry::{ActorContext, LedgerEntry, PendingEntry};
    use crate::ledger::hasher::ChainHasher;
    use crate::ledger::memory::MemoryLedger;
    use async_trait::async_trait;
    use serde_json::json;

    /// Delegates to memory but fails or stalls reads of selected tenants.
    struct FlakyBackend {
        inner: MemoryLedger,
        broken: &'static str,
        slow: &'static str,
    }

    #[async_trait]
    impl LedgerBackend for FlakyBackend {
        async fn latest(&self, tenant_id: &str) -> Result<Option<LedgerEntry>, LedgerError> {
            self.inner.latest(tenant_id).await
        }
        async fn append(&self, entry: PendingEntry) -> Result<LedgerEntry, LedgerError> {
            self.inner.append(entry).await
        }
        async fn list_by_tenant(&self, tenant_id: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
            if tenant_id == self.broken {
                return Err(LedgerError::StorageUnavailable("disk offline".to_string()));
            }
            if tenant_id == self.slow {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            self.inner.list_by_tenant(tenant_id).await
        }
        async fn list_tenants(&self) -> Result<Vec<String>, LedgerError> {
            self.inner.list_tenants().await
        }
        async fn entry_count(&self, tenant_id: &str) -> Result<u64, LedgerError> {
            self.inner.entry_count(tenant_id).await
        }
    }

    async fn record_for(ledger: &Ledger, tenant: &str) -> LedgerEntry {
        ledger
            .record(
                Some(tenant),
                &ActorContext::new("alice", "10.0.0.1", "Firefox", "Linux"),
                "Order",
                "CREATE",
                json!({"tenant": tenant}),
                None,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_sweep_reports_each_tenant() {
        let store = MemoryLedger::new();
        let backend = Arc::new(FlakyBackend {
            inner: store.clone(),
            broken: "broken",
            slow: "slow",
        });
        let ledger = Ledger::new(backend, ChainHasher::default());

        record_for(&ledger, "acme").await;
        let tampered = record_for(&ledger, "globex").await;
        record_for(&ledger, "broken").await;
        record_for(&ledger, "slow").await;
        store
            .overwrite(tampered.id, |e| e.status = "rolled back".to_string())
            .await;

        let sweep = AuditSweep::for_ledger(&ledger, VerifyMode::Linked, Duration::from_millis(50));
        let report = sweep.run_once().await.unwrap();

        assert_eq!(report.reports.len(), 4);
        assert!(!report.all_intact());

        let outcome = |tenant: &str| {
            report
                .reports
                .iter()
                .find(|r| r.tenant_id == tenant)
                .map(|r| r.outcome.clone())
                .unwrap()
        };
        assert!(matches!(outcome("acme"), SweepOutcome::Intact { entries_checked: 1 }));
        assert!(matches!(outcome("globex"), SweepOutcome::Corrupted { .. }));
        assert!(matches!(outcome("broken"), SweepOutcome::Failed { .. }));
        assert!(matches!(outcome("slow"), SweepOutcome::Failed { .. }));
        assert_eq!(report.corrupted().len(), 1);
        assert_eq!(report.failed().len(), 2);
    }

    #[tokio::test]
    async fn test_run_for_single_tenant() {
        let store = MemoryLedger::new();
        let ledger = Ledger::new(Arc::new(store.clone()), ChainHasher::default());
        record_for(&ledger, "acme").await;
        let tampered = record_for(&ledger, "globex").await;
        store
            .overwrite(tampered.id, |e| e.payload = json!({"tenant": "mallory"}))
            .await;
        let sweep = AuditSweep::for_ledger(&ledger, VerifyMode::Linked, Duration::from_secs(1));

        let acme = sweep.run_for(Some("acme")).await.unwrap();
        assert_eq!(acme.reports.len(), 1);
        assert_eq!(acme.exit_code(), 0);

        let globex = sweep.run_for(Some("globex")).await.unwrap();
        assert_eq!(globex.exit_code(), 1);

        let all = sweep.run_for(None).await.unwrap();
        assert_eq!(all.reports.len(), 2);
        assert_eq!(all.exit_code(), 1);

        assert!(matches!(
            sweep.run_for(Some("initech")).await,
            Err(LedgerError::UnknownTenant(_))
        ));
    }

    #[tokio::test]
    async fn test_render_report() {
        let store = MemoryLedger::new();
        let ledger = Ledger::new(Arc::new(store.clone()), ChainHasher::default());
        record_for(&ledger, "acme").await;
        let tampered = record_for(&ledger, "globex").await;
        let sweep = AuditSweep::for_ledger(&ledger, VerifyMode::Linked, Duration::from_secs(1));

        let intact = sweep.run_once().await.unwrap();
        assert_eq!(intact.render(false), "✓ 2 tenant chains verified");
        let verbose = intact.render(true);
        assert!(verbose.contains("✓ acme: 1 entries intact"));
        assert!(verbose.contains(&format!("Run {}", intact.run_id)));

        store
            .overwrite(tampered.id, |e| e.status = "failed".to_string())
            .await;
        let corrupted = sweep.run_once().await.unwrap().render(false);
        assert!(!corrupted.contains("acme"));
        assert!(corrupted.contains(&format!("✗ tenant globex: corrupt at entry {}", tampered.id)));
        assert!(corrupted.ends_with("✗ 1 corrupted, 0 failed of 2 tenants"));
    }

    #[tokio::test]
    async fn test_spawned_sweep_can_be_aborted() {
        let ledger = Ledger::new(Arc::new(MemoryLedger::new()), ChainHasher::default());
        record_for(&ledger, "acme").await;

        let handle = AuditSweep::for_ledger(&ledger, VerifyMode::Linked, Duration::from_secs(1))
            .spawn(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
    }
}
