use thiserror::Error;

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(format!("JSON serialization error: {}", err))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        Self::StorageUnavailable(format!("Database error: {}", err))
    }
}

impl From<::config::ConfigError> for LedgerError {
    fn from(err: ::config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("No tenant could be resolved for this operation")]
    MissingTenantContext,

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Concurrent append rejected for tenant {tenant_id}")]
    ConcurrentAppend { tenant_id: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Verification of tenant {tenant_id} exceeded {seconds}s")]
    VerificationTimeout { tenant_id: String, seconds: u64 },

    #[error("Tenant {0} has no ledger entries")]
    UnknownTenant(String),
}

impl LedgerError {
    /// Whether a caller may reasonably retry the failed call.
    ///
    /// The ledger itself never retries.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable(_) | Self::ConcurrentAppend { .. } | Self::VerificationTimeout { .. }
        )
    }
}
