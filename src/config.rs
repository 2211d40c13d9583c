pub mod loader;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::ledger::recorder::RecordFailurePolicy;
use crate::ledger::verify::VerifyMode;

pub const DEFAULT_HASH_PERIOD_SECONDS: u64 = 900;
pub const DEFAULT_HASH_SALT: &str = "STATIC_SALT_FOR_HASH_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub database_url: String,
    pub hash_period_seconds: u64,
    pub hash_salt: String,
    pub verify_interval_secs: u64,
    pub verify_timeout_secs: u64,
    pub verify_mode: VerifyMode,
    pub record_failure_policy: RecordFailurePolicy,
    pub server_host: String,
    pub server_port: u16,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://site-ledger.db".to_string(),
            hash_period_seconds: DEFAULT_HASH_PERIOD_SECONDS,
            hash_salt: DEFAULT_HASH_SALT.to_string(),
            verify_interval_secs: 3600,
            verify_timeout_secs: 60,
            verify_mode: VerifyMode::Linked,
            record_failure_policy: RecordFailurePolicy::Propagate,
            server_host: "0.0.0.0".to_string(),
            server_port: 3000,
        }
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.hash_period_seconds == 0 {
            return Err(LedgerError::Config(
                "hash_period_seconds must be greater than zero".to_string(),
            ));
        }

        if self.hash_salt.trim().is_empty() {
            return Err(LedgerError::Config("hash_salt cannot be empty".to_string()));
        }

        if self.verify_interval_secs == 0 {
            return Err(LedgerError::Config(
                "verify_interval_secs must be greater than zero".to_string(),
            ));
        }

        if self.verify_timeout_secs == 0 {
            return Err(LedgerError::Config(
                "verify_timeout_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
