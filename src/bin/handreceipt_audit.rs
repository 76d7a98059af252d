//! handreceipt-audit: Ledger chain verifier
//!
//! Walks the custody ledger from genesis, recomputing every event hash and
//! checking every link. Intended for cron jobs and incident response.
//!
//! ## Configuration
//! - HANDRECEIPT_CONFIG: Path to a YAML config file (optional)
//! - HANDRECEIPT__STORAGE__TYPE: `sqlite` or `postgres`
//! - HANDRECEIPT_LOG: Log filter (default: info)
//!
//! Exits with status 1 when the chain is broken, 2 when the check could not
//! run.

use std::process::ExitCode;

use tracing::{error, info};

use handreceipt_custody::config::Config;
use handreceipt_custody::coordinator::CustodyCoordinator;
use handreceipt_custody::storage::init_storage;
use handreceipt_custody::utils::bootstrap::init_tracing;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let path = std::env::args().nth(1);
    let config = match Config::load(path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            return ExitCode::from(2);
        }
    };

    let store = match init_storage(&config.storage).await {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "Failed to open custody store");
            return ExitCode::from(2);
        }
    };
    let coordinator = CustodyCoordinator::new(store, config.custody);

    match coordinator.verify_chain().await {
        Ok(report) if report.is_intact() => {
            info!(
                events = report.events_checked,
                head = ?report.head,
                "Ledger chain intact"
            );
            ExitCode::SUCCESS
        }
        Ok(report) => {
            error!(
                events = report.events_checked,
                problems = report.problems.len(),
                "Ledger chain broken"
            );
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "Chain verification failed");
            ExitCode::from(2)
        }
    }
}
