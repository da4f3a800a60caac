use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{info, warn};

/// Process configuration, read once from `SHOWTIME_*` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    /// `None` disables the deferred timeout; the sweep still runs.
    pub payment_timeout: Option<Duration>,
    pub sweep_interval: Duration,
    pub showings_per_movie: u32,
    /// JSON file of studios and movies to register at startup.
    pub catalog: Option<PathBuf>,
    /// Inclusive date range to allocate at startup.
    pub allocate: Option<(NaiveDate, NaiveDate)>,
    pub allocation_seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            payment_timeout: None,
            sweep_interval: Duration::from_secs(60),
            showings_per_movie: 3,
            catalog: None,
            allocate: None,
            allocation_seed: None,
        }
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("ignoring {key}={raw:?}: {e}");
            None
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparsable values fall back to defaults with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let payment_timeout = match parsed::<i64>(&lookup, "SHOWTIME_PAYMENT_TIMEOUT_MINUTES") {
            Some(minutes) if minutes > 0 => Some(Duration::from_secs((minutes as u64).saturating_mul(60))),
            Some(minutes) => {
                info!("payment timeout of {minutes} minutes disables the deferred job");
                None
            }
            None => {
                info!("no payment timeout configured; pending reservations rely on the sweep");
                None
            }
        };

        let sweep_interval = parsed::<u64>(&lookup, "SHOWTIME_SWEEP_INTERVAL_SECS")
            .filter(|&s| s > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.sweep_interval);

        let allocate = match (
            parsed::<NaiveDate>(&lookup, "SHOWTIME_ALLOCATE_FROM"),
            parsed::<NaiveDate>(&lookup, "SHOWTIME_ALLOCATE_TO"),
        ) {
            (Some(from), Some(to)) => Some((from, to)),
            (None, None) => None,
            _ => {
                warn!("SHOWTIME_ALLOCATE_FROM and SHOWTIME_ALLOCATE_TO must be set together");
                None
            }
        };

        Self {
            data_dir: lookup("SHOWTIME_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            metrics_port: parsed(&lookup, "SHOWTIME_METRICS_PORT"),
            payment_timeout,
            sweep_interval,
            showings_per_movie: parsed(&lookup, "SHOWTIME_SHOWINGS_PER_MOVIE")
                .unwrap_or(defaults.showings_per_movie),
            catalog: lookup("SHOWTIME_CATALOG").map(PathBuf::from),
            allocate,
            allocation_seed: parsed(&lookup, "SHOWTIME_ALLOCATION_SEED"),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("showtime.wal")
    }
}
