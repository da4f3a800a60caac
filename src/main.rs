use std::path::Path;
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Deserialize;
use tracing::{info, warn};
use ulid::Ulid;

use showtime::allocator::AllocationPolicy;
use showtime::config::Config;
use showtime::engine::{Engine, EngineError};
use showtime::notify::NotifyHub;
use showtime::promo::StaticPromos;
use showtime::runtime::Runtime;

#[derive(Debug, Deserialize)]
struct Catalog {
    #[serde(default)]
    studios: Vec<CatalogStudio>,
    #[serde(default)]
    movies: Vec<CatalogMovie>,
}

#[derive(Debug, Deserialize)]
struct CatalogStudio {
    id: Ulid,
    name: String,
    seat_capacity: u32,
}

#[derive(Debug, Deserialize)]
struct CatalogMovie {
    id: Ulid,
    title: String,
    duration_minutes: u32,
}

/// Register catalog entries. Entries already present from a previous run are skipped.
async fn load_catalog(engine: &Engine, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let catalog: Catalog = serde_json::from_slice(&std::fs::read(path)?)?;
    let mut added = 0;
    for s in catalog.studios {
        match engine.create_studio(s.id, s.name, s.seat_capacity).await {
            Ok(()) => added += 1,
            Err(EngineError::AlreadyExists(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }
    for m in catalog.movies {
        match engine.create_movie(m.id, m.title, m.duration_minutes).await {
            Ok(()) => added += 1,
            Err(EngineError::AlreadyExists(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }
    info!("catalog {}: {added} new entries", path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    showtime::observability::init(config.metrics_port);

    let runtime = Runtime::start(
        &config,
        Arc::new(StaticPromos::default()),
        Arc::new(NotifyHub::new()),
    )?;

    if let Some(path) = &config.catalog {
        load_catalog(&runtime.engine, path).await?;
    }

    if let Some((from, to)) = config.allocate {
        let policy = AllocationPolicy {
            showings_per_movie: config.showings_per_movie,
            ..AllocationPolicy::default()
        };
        let mut rng = match config.allocation_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        match runtime.engine.run_allocation(from, to, &policy, &mut rng).await {
            Ok((_, shortfalls)) if !shortfalls.is_empty() => {
                warn!("{} movie-days fell short of the showing target", shortfalls.len());
            }
            Ok(_) => {}
            Err(e) => warn!("allocation {from}..={to} failed: {e}"),
        }
    }

    // Graceful shutdown on SIGTERM/ctrl-c
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }

    info!("shutdown signal received");
    runtime.shutdown().await;
    Ok(())
}
