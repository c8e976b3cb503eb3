use anyhow::Result;
use tracing::{error, info, warn};

use audit_chain_service::config::Config;
use audit_chain_service::jobs::{IntegrityCheckJob, JobScheduler, PoolMetricsJob};
use audit_chain_service::services::{spawn_audit_writer, IntegrityService};
use audit_chain_service::{bootstrap, logging, metrics};
use domain::services::audit::audit_helpers;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load()?;

    logging::init_logging(&config.logging);

    info!("Starting audit chain service v{}", VERSION);

    if config.metrics.enabled {
        metrics::init_metrics(&config.metrics)?;
        info!(addr = %config.metrics.listen_addr, "Prometheus exporter listening");
    }

    let db_config: persistence::db::DatabaseConfig = (&config.database).into();
    let store = persistence::db::connect_store(&db_config).await?;
    info!(backend = %store.backend(), "Connected to audit log store");

    // Halts startup unless every row is chained and the enforcer is active.
    let chain = bootstrap(store).await?;
    let store = chain.into_store();

    let (audit_logger, writer) = spawn_audit_writer(store.clone(), &config.audit);
    let integrity = IntegrityService::new(store.clone(), config.audit.verify_batch_size);

    let mut scheduler = JobScheduler::new();
    scheduler.register(PoolMetricsJob::new(store.clone()));
    if config.audit.integrity_check_interval_mins > 0 {
        scheduler.register(IntegrityCheckJob::new(
            integrity.clone(),
            config.audit.integrity_check_interval_mins,
        ));
    }
    scheduler.start();

    audit_logger
        .log(audit_helpers::system_started(VERSION))
        .await;

    let outcome = integrity.verify_integrity().await;
    if outcome.is_valid() {
        info!("{}", outcome.message());
    } else {
        error!("{}", outcome.message());
    }

    info!("Audit chain service running, press Ctrl-C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");

    audit_logger
        .log(audit_helpers::system_stopped(VERSION))
        .await;

    let shutdown_timeout = config.audit.shutdown_timeout();
    scheduler.shutdown();
    scheduler.wait_for_shutdown(shutdown_timeout).await;
    writer.shutdown(shutdown_timeout).await;

    info!("Audit chain service stopped");
    Ok(())
}
