//! Background scheduler tick (§4.2): ticks `af-scheduler` on a fixed
//! interval and logs what moved.

use std::sync::Arc;
use std::time::Duration;

use af_store::{LivenessStore, ResourceStore};
use tokio_util::sync::CancellationToken;

const TICK_INTERVAL: Duration = Duration::from_secs(5);

pub async fn run(store: Arc<ResourceStore>, liveness: Arc<LivenessStore>, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(TICK_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let report = af_scheduler::tick(&store, &liveness);
                if !report.requeued.is_empty() || !report.scheduled.is_empty() {
                    tracing::info!(
                        requeued = report.requeued.len(),
                        scheduled = report.scheduled.len(),
                        left_queued = report.left_queued.len(),
                        "scheduler tick"
                    );
                } else {
                    tracing::debug!(
                        left_queued = report.left_queued.len(),
                        "scheduler tick (idle)"
                    );
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }
}
