//! Periodic reclamation of chunks abandoned by crashed workers.
//!
//! Runs [`JobService::recover_stale_chunks`] on a fixed interval until
//! cancelled. Safe to run in every worker process at once.

use std::time::Duration;

use giga_pipeline::JobService;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Run one sweep, logging the outcome. Errors are logged and swallowed.
pub async fn sweep_once(service: &JobService) -> usize {
    match service.recover_stale_chunks().await {
        Ok(report) if report.total() == 0 => {
            tracing::debug!("Recovery sweep: nothing to reclaim");
            0
        }
        Ok(report) => {
            tracing::info!(recovered = report.total(), "Recovery sweep: reclaimed chunks");
            report.total()
        }
        Err(e) => {
            tracing::error!(error = %e, "Recovery sweep failed");
            0
        }
    }
}

/// Sweep every `every` until `cancel` fires. The first sweep happens one
/// period after start; run [`sweep_once`] beforehand for a startup sweep.
pub async fn run(service: JobService, every: Duration, cancel: CancellationToken) {
    tracing::info!(
        interval_secs = every.as_secs(),
        stale_after_secs = service.config().stale_after.as_secs(),
        "Recovery sweeper started"
    );

    let mut interval = interval_at(Instant::now() + every, every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Recovery sweeper stopping");
                break;
            }
            _ = interval.tick() => {
                sweep_once(&service).await;
            }
        }
    }
}
