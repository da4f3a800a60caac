use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::{Engine, ExpiryTrigger};
use crate::model::Ms;

/// Periodically fail pending transactions whose showing has already started.
pub async fn run_sweeper(engine: Arc<Engine>, every: Duration, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                sweep_once(&engine, chrono::Utc::now().timestamp_millis()).await;
            }
            _ = shutdown.cancelled() => break,
        }
    }
    debug!("pending sweeper stopped");
}

/// One sweep pass. Returns how many transactions were expired.
///
/// A failure on one transaction is logged and the pass moves on.
pub async fn sweep_once(engine: &Engine, now: Ms) -> usize {
    let started = Instant::now();
    let overdue = engine.collect_overdue(now);
    let mut expired = 0;
    for id in overdue {
        match engine.expire_reservation(id, ExpiryTrigger::Sweep).await {
            Ok(true) => expired += 1,
            // Settled between collect and expire
            Ok(false) => debug!("sweep skip {id}: already settled"),
            Err(e) => warn!("sweep failed to expire {id}: {e}"),
        }
    }
    metrics::histogram!(crate::observability::SWEEP_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());
    if expired > 0 {
        info!("sweep expired {expired} pending transactions");
    }
    expired
}
