use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing::{error, info};

use site_ledger::config::LedgerConfig;
use site_ledger::database::Database;
use site_ledger::ledger::{AuditSweep, Ledger, SweepReport, VerifyMode};

/// Exit status when the run itself fails: bad configuration, unreadable database, unknown tenant.
const EXIT_RUN_ERROR: i32 = 2;

#[tokio::main]
async fn main() {
    let matches = Command::new("verify-ledger")
        .version("0.1.0")
        .about("Verify the integrity of site ledger hash chains")
        .arg(
            Arg::new("database-url")
                .short('d')
                .long("database-url")
                .value_name("URL")
                .help("Ledger database URL (defaults to the configured one)"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .help("Configuration file"),
        )
        .arg(
            Arg::new("tenant")
                .short('t')
                .long("tenant")
                .value_name("TENANT")
                .help("Verify only this tenant"),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .help("Verification mode: linked or stored"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Enable verbose output"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .help("Suppress output except errors"),
        )
        .get_matches();

    let verbose = matches.get_flag("verbose");
    let quiet = matches.get_flag("quiet");

    let level = if quiet {
        tracing::Level::ERROR
    } else if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let report = match verify_ledger(&matches).await {
        Ok(report) => report,
        Err(e) => {
            error!("Ledger verification failed: {}", e);
            std::process::exit(EXIT_RUN_ERROR);
        }
    };

    if !quiet {
        println!("{}", report.render(verbose));
    }

    std::process::exit(report.exit_code());
}

async fn verify_ledger(matches: &ArgMatches) -> Result<SweepReport> {
    let config_path = matches.get_one::<String>("config").map(PathBuf::from);
    let mut config = LedgerConfig::load(config_path.as_deref())?;
    if let Some(url) = matches.get_one::<String>("database-url") {
        config.database_url = url.clone();
    }
    if let Some(mode) = matches.get_one::<String>("mode") {
        config.verify_mode = mode.parse::<VerifyMode>()?;
    }

    info!("Verifying ledger at {} ({} mode)", config.database_url, config.verify_mode);

    let database = Database::open_existing(&config.database_url).await?;
    let ledger = Ledger::from_config(Arc::new(database), &config);
    let report = AuditSweep::from_config(&ledger, &config)
        .run_for(matches.get_one::<String>("tenant").map(String::as_str))
        .await?;
    Ok(report)
}
