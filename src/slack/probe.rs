use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::connection::ConnectionManager;
use crate::metrics::Metrics;

/// Periodically verify the upstream credentials while connected.
///
/// Outcomes are only logged and counted; reconnecting is left to the
/// connection manager's own error path.
pub fn spawn_liveness_probe(
    manager: Arc<ConnectionManager>,
    period: Duration,
    metrics: Metrics,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        log::info!("💓 Starting liveness probe (interval: {}s)", period.as_secs());
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if !manager.is_connected() {
                let state = manager.state();
                log::warn!(
                    "⚠️  Slack not connected (phase: {:?}, failures: {})",
                    state.phase,
                    state.consecutive_failures
                );
                continue;
            }

            match manager.probe().await {
                Ok(()) => log::debug!("💓 Liveness probe ok"),
                Err(e) => {
                    metrics.inc_probe_failure();
                    log::error!("❌ Liveness probe failed: {}", e);
                }
            }
        }
        log::info!("💓 Liveness probe stopped");
    })
}
