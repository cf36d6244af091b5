//! Lifecycle of the background full sync.
//!
//! Three triggers run [`SyncStore::sync_all_data`]: a periodic timer, a one-shot
//! timer armed by [`SyncStore::start`], and the host's unload hook
//! ([`SyncStore::on_unload`]). Every trigger runs its sync as a detached task, so
//! runs may overlap and stopping the timers never cancels a sync already in flight.

use std::sync::{Arc, Weak};

use log::{info, warn};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::store::SyncStore;

#[derive(Default)]
pub(crate) struct Timers {
    periodic: Option<JoinHandle<()>>,
    startup: Option<JoinHandle<()>>,
}

impl Timers {
    fn abort_all(&mut self) {
        if let Some(handle) = self.periodic.take() {
            handle.abort();
        }
        if let Some(handle) = self.startup.take() {
            handle.abort();
        }
    }
}

impl SyncStore {
    /// Starts the periodic sync and schedules one sync after the startup delay.
    ///
    /// Must be called from within a tokio runtime. Returns `false` for headless
    /// stores and when auto-sync was already running.
    pub async fn start(self: &Arc<Self>) -> bool {
        if self.is_headless() {
            return false;
        }
        let started = self.start_auto_sync().await;

        let mut timers = self.timers.lock().await;
        let startup_pending = timers.startup.as_ref().is_some_and(|h| !h.is_finished());
        if !startup_pending {
            let store = Arc::downgrade(self);
            let delay = self.config.startup_delay;
            timers.startup = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                spawn_sync(&store);
            }));
        }
        started
    }

    /// Cancels both timers. Syncs already running are left to finish.
    pub async fn stop(&self) {
        let mut timers = self.timers.lock().await;
        let was_running = timers.periodic.is_some();
        timers.abort_all();
        if was_running {
            info!("Auto-sync stopped");
        }
    }

    pub async fn start_auto_sync(self: &Arc<Self>) -> bool {
        if self.is_headless() {
            return false;
        }
        let period = self.config.sync_interval;
        if period.is_zero() {
            warn!("Sync interval is zero, auto-sync disabled");
            return false;
        }

        let mut timers = self.timers.lock().await;
        if timers.periodic.is_some() {
            return false;
        }

        let store = Arc::downgrade(self);
        timers.periodic = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !spawn_sync(&store) {
                    break;
                }
            }
        }));

        info!("Auto-sync started (every {}s)", period.as_secs());
        true
    }

    pub async fn stop_auto_sync(&self) -> bool {
        let mut timers = self.timers.lock().await;
        match timers.periodic.take() {
            Some(handle) => {
                handle.abort();
                info!("Auto-sync stopped");
                true
            }
            None => false,
        }
    }

    pub async fn is_auto_sync_running(&self) -> bool {
        self.timers.lock().await.periodic.is_some()
    }

    /// Unload hook: one last full sync before the host goes away.
    pub async fn on_unload(&self) -> bool {
        info!("Unload requested, syncing");
        self.sync_all_data().await
    }
}

impl Drop for SyncStore {
    fn drop(&mut self) {
        self.timers.get_mut().abort_all();
    }
}

/// Runs one sync in its own task. `false` once the store has been dropped.
fn spawn_sync(store: &Weak<SyncStore>) -> bool {
    let Some(store) = store.upgrade() else {
        return false;
    };
    tokio::spawn(async move {
        store.sync_all_data().await;
    });
    true
}
