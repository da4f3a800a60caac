use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::engine::{DependencyError, Engine, ExpiryTrigger};

/// Run a payment-timeout once, `delay` from now.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Best-effort: a lost job is caught by the periodic sweep.
    async fn schedule_once(
        &self,
        key: &str,
        delay: Duration,
        transaction_id: Ulid,
    ) -> Result<(), DependencyError>;
}

pub fn payment_timeout_key(transaction_id: Ulid) -> String {
    format!("payment-timeout:{transaction_id}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutJob {
    pub key: String,
    pub delay: Duration,
    pub transaction_id: Ulid,
}

/// In-process queue feeding [`run_timeout_worker`].
#[derive(Debug, Clone)]
pub struct TimeoutQueue {
    tx: mpsc::UnboundedSender<TimeoutJob>,
}

impl TimeoutQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimeoutJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl JobQueue for TimeoutQueue {
    async fn schedule_once(
        &self,
        key: &str,
        delay: Duration,
        transaction_id: Ulid,
    ) -> Result<(), DependencyError> {
        self.tx
            .send(TimeoutJob {
                key: key.to_string(),
                delay,
                transaction_id,
            })
            .map_err(|_| DependencyError::new("jobs", "timeout worker is not running"))
    }
}

/// Sleep out each job's delay, then force-fail its transaction if still pending.
///
/// A key already waiting is dropped. On shutdown, jobs still sleeping are
/// abandoned; an expiry already in progress runs to completion.
pub async fn run_timeout_worker(
    engine: Arc<Engine>,
    mut rx: mpsc::UnboundedReceiver<TimeoutJob>,
    shutdown: CancellationToken,
) {
    let mut waiting: HashSet<String> = HashSet::new();
    let mut inflight: JoinSet<String> = JoinSet::new();

    loop {
        tokio::select! {
            job = rx.recv() => {
                let Some(job) = job else { break };
                if !waiting.insert(job.key.clone()) {
                    debug!("timeout job {} already scheduled", job.key);
                    continue;
                }
                inflight.spawn(fire(engine.clone(), job, shutdown.clone()));
            }
            Some(done) = inflight.join_next(), if !inflight.is_empty() => {
                match done {
                    Ok(key) => { waiting.remove(&key); }
                    Err(e) => warn!("timeout job panicked: {e}"),
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }

    info!("stopping timeout worker, {} jobs outstanding", inflight.len());
    while inflight.join_next().await.is_some() {}
}

async fn fire(engine: Arc<Engine>, job: TimeoutJob, shutdown: CancellationToken) -> String {
    tokio::select! {
        _ = tokio::time::sleep(job.delay) => {}
        _ = shutdown.cancelled() => return job.key,
    }
    match engine
        .expire_reservation(job.transaction_id, ExpiryTrigger::Deferred)
        .await
    {
        Ok(true) => info!("payment window elapsed for transaction {}", job.transaction_id),
        Ok(false) => debug!("timeout for {}: already settled", job.transaction_id),
        Err(e) => warn!("timeout for {} failed: {e}", job.transaction_id),
    }
    job.key
}
