use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use log::warn;

/// Runtime settings for a [`SyncStore`](crate::store::SyncStore).
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Directory holding the LMDB environment.
    pub data_dir: PathBuf,
    /// Environment name; the database lives at `<data_dir>/<store_name>.lmdb`.
    pub store_name: String,
    /// LMDB map size in bytes.
    pub map_size: usize,
    pub sync_interval: Duration,
    /// Delay before the one-shot sync scheduled by `start()`.
    pub startup_delay: Duration,
    pub history_days: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            store_name: "mindctrl".to_string(),
            map_size: 10 * 1024 * 1024,
            sync_interval: Duration::from_secs(5 * 60),
            startup_delay: Duration::from_secs(2),
            history_days: 30,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            data_dir: std::env::var("MINDCTRL_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            store_name: std::env::var("MINDCTRL_STORE_NAME").unwrap_or(defaults.store_name),
            map_size: env_or("MINDCTRL_MAP_SIZE", defaults.map_size),
            sync_interval: Duration::from_secs(env_or(
                "MINDCTRL_SYNC_INTERVAL_SECS",
                defaults.sync_interval.as_secs(),
            )),
            startup_delay: Duration::from_millis(env_or(
                "MINDCTRL_STARTUP_DELAY_MS",
                u64::try_from(defaults.startup_delay.as_millis()).unwrap_or(u64::MAX),
            )),
            history_days: env_or("MINDCTRL_HISTORY_DAYS", defaults.history_days),
        }
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(&self.store_name)
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring malformed {name}={raw:?}, using default");
                default
            }
        },
        Err(_) => default,
    }
}
