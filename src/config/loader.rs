//! Layered configuration loading
//!
//! Defaults, then an optional TOML file, then `LEDGER_*` environment variables.

use std::path::Path;

use ::config::{Config, Environment, File, FileFormat};
use tracing::info;

use super::LedgerConfig;
use crate::error::LedgerError;

pub const DEFAULT_CONFIG_FILE: &str = "ledger.toml";
pub const ENV_PREFIX: &str = "LEDGER";

impl LedgerConfig {
    /// Load configuration from `path` (or `ledger.toml` when absent) and the environment.
    ///
    /// A missing default file is not an error; a missing explicit file is.
    pub fn load(path: Option<&Path>) -> Result<Self, LedgerError> {
        let defaults = LedgerConfig::default();

        let mut builder = Config::builder()
            .set_default("database_url", defaults.database_url.clone())?
            .set_default("hash_period_seconds", defaults.hash_period_seconds)?
            .set_default("hash_salt", defaults.hash_salt.clone())?
            .set_default("verify_interval_secs", defaults.verify_interval_secs)?
            .set_default("verify_timeout_secs", defaults.verify_timeout_secs)?
            .set_default("verify_mode", "linked")?
            .set_default("record_failure_policy", "propagate")?
            .set_default("server_host", defaults.server_host.clone())?
            .set_default("server_port", defaults.server_port as u64)?;

        builder = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(LedgerError::Config(format!(
                        "Configuration file not found: {:?}",
                        path
                    )));
                }
                info!("Loading ledger configuration from: {:?}", path);
                builder.add_source(File::from(path).format(FileFormat::Toml))
            }
            None => builder.add_source(
                File::with_name(DEFAULT_CONFIG_FILE)
                    .format(FileFormat::Toml)
                    .required(false),
            ),
        };

        let config: LedgerConfig = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }
}
