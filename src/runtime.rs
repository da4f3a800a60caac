use std::io;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::engine::{Collaborators, Engine};
use crate::jobs::{self, TimeoutQueue};
use crate::notify::Notifier;
use crate::promo::PromoService;
use crate::reaper;

/// A running engine with its timeout worker and sweeper.
pub struct Runtime {
    pub engine: Arc<Engine>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Runtime {
    /// Open the engine under `config.data_dir` and spawn its background tasks.
    pub fn start(
        config: &Config,
        promos: Arc<dyn PromoService>,
        notifier: Arc<dyn Notifier>,
    ) -> io::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let (queue, job_rx) = TimeoutQueue::new();
        let collaborators = Collaborators {
            promos,
            notifier,
            jobs: Arc::new(queue),
        };
        let engine = Arc::new(Engine::new(
            config.wal_path(),
            collaborators,
            config.payment_timeout,
        )?);

        let shutdown = CancellationToken::new();
        let tasks = vec![
            tokio::spawn(jobs::run_timeout_worker(
                engine.clone(),
                job_rx,
                shutdown.clone(),
            )),
            tokio::spawn(reaper::run_sweeper(
                engine.clone(),
                config.sweep_interval,
                shutdown.clone(),
            )),
        ];

        info!("showtime engine started");
        info!("  data_dir: {}", config.data_dir.display());
        info!(
            "  payment timeout: {}",
            config
                .payment_timeout
                .map_or("disabled".to_string(), |d| format!("{}m", d.as_secs() / 60))
        );
        info!("  sweep every {}s", config.sweep_interval.as_secs());

        Ok(Self {
            engine,
            shutdown,
            tasks,
        })
    }

    /// Stop background tasks and wait for them to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("background task ended abnormally: {e}");
            }
        }
        info!("showtime engine stopped");
    }
}
