//! The storage sync context.
//!
//! [`SyncStore`] owns everything the layer needs: the cache tier chosen at
//! construction, the device user id and the auto-sync timers. Application code
//! calls its typed save/get methods; the lifecycle methods live in
//! [`auto_sync`](crate::auto_sync).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mindctrl_sync::{HydrationSnapshot, MemoryRemoteStore, RemoteStore, SyncConfig, SyncStore};
//!
//! # async fn run() -> Result<(), mindctrl_sync::StoreError> {
//! let remote: Arc<dyn RemoteStore> = Arc::new(MemoryRemoteStore::new());
//! let store = Arc::new(SyncStore::open(SyncConfig::from_env(), Some(remote))?);
//!
//! store.save_hydration_data(&HydrationSnapshot::default()).await;
//! let history = store.get_hydration_history(30).await;
//!
//! store.start().await;
//! // ... later, when the host shuts down:
//! store.on_unload().await;
//! store.stop().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use log::{error, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};

use crate::auto_sync::Timers;
use crate::clock::{format_day, format_instant, Clock, SystemClock};
use crate::config::SyncConfig;
use crate::error::StoreResult;
use crate::identity::{resolve_user_id, UserId};
use crate::local_store::{LmdbLocalStore, LocalStore};
use crate::models::{
    collections, keys, Analytics, HistoryEntry, HydrationSnapshot, SleepSnapshot, Task,
    TaskCompletion, TaskCompletionRecord, TaskListDocument,
};
use crate::remote_store::{Direction, Fields, Query, RemoteStore, WriteMode};
use crate::tier::{CacheTier, HeadlessTier, LocalTier, ReplicatedTier};

const MAX_ANALYTICS_DAYS: i64 = 36_500;

pub struct SyncStore {
    tier: Box<dyn CacheTier>,
    user_id: UserId,
    clock: Arc<dyn Clock>,
    pub(crate) config: SyncConfig,
    pub(crate) timers: tokio::sync::Mutex<Timers>,
}

impl SyncStore {
    /// Builds a store over `local`, replicating to `remote` when one is given.
    pub fn new(
        config: SyncConfig,
        local: Arc<dyn LocalStore>,
        remote: Option<Arc<dyn RemoteStore>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let user_id = resolve_user_id(local.as_ref(), clock.as_ref());
        let tier: Box<dyn CacheTier> = match remote {
            Some(remote) => Box::new(ReplicatedTier::new(local, remote, Arc::clone(&clock))),
            None => Box::new(LocalTier::new(local)),
        };
        info!("Sync store ready for {user_id}");
        Self {
            tier,
            user_id,
            clock,
            config,
            timers: tokio::sync::Mutex::new(Timers::default()),
        }
    }

    /// Opens the LMDB local store described by `config`.
    pub fn open(config: SyncConfig, remote: Option<Arc<dyn RemoteStore>>) -> StoreResult<Self> {
        let local = LmdbLocalStore::open(config.store_path(), config.map_size)?;
        Ok(Self::new(config, Arc::new(local), remote, Arc::new(SystemClock)))
    }

    /// A store for contexts without local persistence. It carries the
    /// placeholder user id, has no remote handle, and every operation fails softly.
    pub fn headless(config: SyncConfig) -> Self {
        Self {
            tier: Box::new(HeadlessTier),
            user_id: UserId::placeholder(),
            clock: Arc::new(SystemClock),
            config,
            timers: tokio::sync::Mutex::new(Timers::default()),
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn is_headless(&self) -> bool {
        self.tier.local().is_none()
    }

    pub fn has_remote(&self) -> bool {
        self.tier.remote().is_some()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // ---- generic accessor ----

    pub async fn set_item<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        let user_id = self.user_id.clone();
        self.set_item_for(key, value, &user_id).await
    }

    pub async fn set_item_for<T: Serialize + ?Sized>(&self, key: &str, value: &T, user_id: &UserId) -> bool {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                error!("Could not serialize value for '{key}': {e}");
                return false;
            }
        };
        self.tier.set_item(key, &value, user_id).await
    }

    pub async fn get_item<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let user_id = self.user_id.clone();
        self.get_item_for(key, &user_id).await
    }

    pub async fn get_item_for<T: DeserializeOwned>(&self, key: &str, user_id: &UserId) -> Option<T> {
        let value = self.tier.get_item(key, user_id).await?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                warn!("Stored value for '{key}' does not have the expected shape: {e}");
                None
            }
        }
    }

    // ---- hydration ----

    /// Stores the current hydration snapshot and archives it as today's entry.
    pub async fn save_hydration_data(&self, snapshot: &HydrationSnapshot) -> bool {
        if self.is_headless() {
            return false;
        }
        let today = self.today();
        let mut stamped = snapshot.clone();
        stamped.date = Some(today.clone());
        stamped.saved_at = Some(format_instant(self.clock.now()));

        let stored = self.set_item(keys::HYDRATION, &stamped).await;
        let archived = self
            .archive(collections::HYDRATION_HISTORY, &today, &stamped)
            .await;

        if stored && archived {
            info!("Hydration data saved");
        }
        stored && archived
    }

    pub async fn get_hydration_data(&self) -> Option<HydrationSnapshot> {
        self.get_item(keys::HYDRATION).await
    }

    /// Most recent `days` archived hydration entries, newest first.
    pub async fn get_hydration_history(&self, days: usize) -> Vec<HistoryEntry<HydrationSnapshot>> {
        self.history(collections::HYDRATION_HISTORY, days).await
    }

    // ---- sleep ----

    /// Stores the current sleep snapshot; archives it only once some sleep was recorded today.
    pub async fn save_sleep_data(&self, snapshot: &SleepSnapshot) -> bool {
        if self.is_headless() {
            return false;
        }
        let today = self.today();
        let mut stamped = snapshot.clone();
        stamped.date = Some(today.clone());
        stamped.saved_at = Some(format_instant(self.clock.now()));

        let stored = self.set_item(keys::SLEEP, &stamped).await;
        let archived = if stamped.has_sleep() {
            self.archive(collections::SLEEP_HISTORY, &today, &stamped).await
        } else {
            true
        };

        if stored && archived {
            info!("Sleep data saved");
        }
        stored && archived
    }

    pub async fn get_sleep_data(&self) -> Option<SleepSnapshot> {
        self.get_item(keys::SLEEP).await
    }

    pub async fn get_sleep_history(&self, days: usize) -> Vec<HistoryEntry<SleepSnapshot>> {
        self.history(collections::SLEEP_HISTORY, days).await
    }

    // ---- tasks ----

    /// Stores the whole task list, locally and as the single `<userId>_current` document.
    pub async fn save_tasks(&self, tasks: &[Task]) -> bool {
        if self.is_headless() {
            return false;
        }
        let stored = self.set_item(keys::TASKS, tasks).await;

        let backed_up = match self.tier.remote() {
            Some(remote) => {
                let document = TaskListDocument {
                    user_id: self.user_id.as_str().to_string(),
                    tasks: tasks.to_vec(),
                    last_modified: format_instant(self.clock.now()),
                    date: self.today(),
                };
                let fields = match to_fields(&document) {
                    Ok(fields) => fields,
                    Err(e) => {
                        error!("Could not encode task list: {e}");
                        return false;
                    }
                };

                match remote
                    .set_document(collections::TASKS, &self.user_id.doc_id("current"), fields, WriteMode::Overwrite)
                    .await
                {
                    Ok(()) => true,
                    Err(e) => {
                        error!("Error saving task list: {e}");
                        false
                    }
                }
            }
            None => true,
        };

        if stored && backed_up {
            info!("Tasks saved: {} tasks", tasks.len());
        }
        stored && backed_up
    }

    pub async fn get_tasks(&self) -> Vec<Task> {
        self.get_item(keys::TASKS).await.unwrap_or_default()
    }

    /// Appends one completion event. Needs a remote store; nothing is kept locally.
    pub async fn save_task_completion(&self, task_id: &str, completion: &TaskCompletion) -> bool {
        let Some(remote) = self.tier.remote() else {
            return false;
        };

        let now = self.clock.now();
        let record = TaskCompletionRecord {
            user_id: self.user_id.as_str().to_string(),
            task_id: task_id.to_string(),
            completion: completion.clone(),
            date: format_day(self.clock.today()),
            timestamp: None,
        };
        let fields = match to_fields(&record) {
            Ok(fields) => fields,
            Err(e) => {
                error!("Could not encode completion of task {task_id}: {e}");
                return false;
            }
        };

        let doc_id = self.user_id.doc_id(&format!("{task_id}_{}", now.timestamp_millis()));
        match remote
            .set_document(collections::TASK_COMPLETIONS, &doc_id, fields, WriteMode::Overwrite)
            .await
        {
            Ok(()) => {
                info!("Task completion saved: {task_id}");
                true
            }
            Err(e) => {
                error!("Error saving task completion: {e}");
                false
            }
        }
    }

    // ---- wake state ----

    pub async fn get_wake_state(&self) -> Option<JsonValue> {
        self.get_item(keys::WAKE_STATE).await
    }

    // ---- analytics ----

    /// Archived hydration and sleep days plus task completions from the last `days` days.
    pub async fn get_analytics(&self, days: usize) -> Analytics {
        let mut analytics = Analytics {
            period: days,
            ..Analytics::default()
        };
        let Some(remote) = self.tier.remote() else {
            return analytics;
        };

        analytics.hydration = self.get_hydration_history(days).await;
        analytics.sleep = self.get_sleep_history(days).await;

        let span = i64::try_from(days).unwrap_or(i64::MAX).min(MAX_ANALYTICS_DAYS);
        let since = self.clock.today() - ChronoDuration::days(span);
        let query = Query::new(collections::TASK_COMPLETIONS)
            .where_eq("userId", self.user_id.as_str())
            .where_gte("date", format_day(since))
            .order_by("date", Direction::Descending);
        analytics.tasks = match remote.query(&query).await {
            Ok(docs) => docs
                .iter()
                .filter_map(|doc| match doc.decode::<TaskCompletionRecord>() {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!("Skipping unreadable completion record: {e}");
                        None
                    }
                })
                .collect(),
            Err(e) => {
                error!("Error fetching task completions: {e}");
                Vec::new()
            }
        };
        analytics
    }

    // ---- full sync ----

    /// Rewrites every non-empty local domain to the remote store.
    ///
    /// Returns `false` only when the local store cannot be read or holds invalid
    /// JSON. A domain whose contents do not decode is skipped, and failures of
    /// individual saves are logged and left for the next run.
    pub async fn sync_all_data(&self) -> bool {
        let Some(local) = self.tier.local() else {
            return false;
        };
        info!("Starting data sync...");

        let LocalDomains { hydration, sleep, tasks, wake_state } = match read_domains(local) {
            Ok(domains) => domains,
            Err(e) => {
                error!("Error syncing data: {e}");
                return false;
            }
        };

        if let Some(hydration) = hydration {
            if !self.save_hydration_data(&hydration).await {
                warn!("Hydration domain not fully synced");
            }
        }
        if let Some(sleep) = sleep {
            if !self.save_sleep_data(&sleep).await {
                warn!("Sleep domain not fully synced");
            }
        }
        if let Some(tasks) = tasks {
            if !self.save_tasks(&tasks).await {
                warn!("Task domain not fully synced");
            }
        }
        if let Some(wake_state) = wake_state {
            if !self.set_item(keys::WAKE_STATE, &wake_state).await {
                warn!("Wake state not synced");
            }
        }

        info!("Data sync completed");
        true
    }

    // ---- helpers ----

    fn today(&self) -> String {
        format_day(self.clock.today())
    }

    /// Overwrites `<collection>/<userId>_<date>`; at most one entry per user per day.
    async fn archive<T: Serialize>(&self, collection: &str, date: &str, snapshot: &T) -> bool {
        let Some(remote) = self.tier.remote() else {
            return true;
        };
        let mut fields = match to_fields(snapshot) {
            Ok(fields) => fields,
            Err(e) => {
                error!("Could not encode {collection} entry: {e}");
                return false;
            }
        };
        fields.insert("userId".to_string(), json!(self.user_id.as_str()));
        fields.insert("date".to_string(), json!(date));

        match remote
            .set_document(collection, &self.user_id.doc_id(date), fields, WriteMode::Overwrite)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!("Error archiving {collection} entry for {date}: {e}");
                false
            }
        }
    }

    async fn history<T: DeserializeOwned>(&self, collection: &str, days: usize) -> Vec<HistoryEntry<T>> {
        let Some(remote) = self.tier.remote() else {
            return Vec::new();
        };
        let query = Query::new(collection)
            .where_eq("userId", self.user_id.as_str())
            .order_by("date", Direction::Descending)
            .limit(days);

        match remote.query(&query).await {
            Ok(docs) => docs
                .iter()
                .filter_map(|doc| match doc.decode::<HistoryEntry<T>>() {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        warn!("Skipping unreadable {collection} entry: {e}");
                        None
                    }
                })
                .collect(),
            Err(e) => {
                error!("Error fetching {collection}: {e}");
                Vec::new()
            }
        }
    }
}

fn to_fields<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Fields> {
    match serde_json::to_value(value)? {
        JsonValue::Object(fields) => Ok(fields),
        other => {
            let mut fields = Fields::new();
            fields.insert("value".to_string(), other);
            Ok(fields)
        }
    }
}

/// Reads and parses one local domain, substituting `default` when it is absent.
fn read_domain(local: &dyn LocalStore, key: &str, default: JsonValue) -> StoreResult<JsonValue> {
    match local.get_item(key)? {
        Some(raw) if !raw.is_empty() => Ok(serde_json::from_str(&raw)?),
        _ => Ok(default),
    }
}

/// The non-empty local domains, decoded.
struct LocalDomains {
    hydration: Option<HydrationSnapshot>,
    sleep: Option<SleepSnapshot>,
    tasks: Option<Vec<Task>>,
    wake_state: Option<JsonValue>,
}

fn read_domains(local: &dyn LocalStore) -> StoreResult<LocalDomains> {
    let hydration = read_domain(local, keys::HYDRATION, json!({}))?;
    let sleep = read_domain(local, keys::SLEEP, json!({}))?;
    let tasks = read_domain(local, keys::TASKS, json!([]))?;
    let wake_state = read_domain(local, keys::WAKE_STATE, json!({}))?;

    Ok(LocalDomains {
        hydration: decode_domain(keys::HYDRATION, hydration),
        sleep: decode_domain(keys::SLEEP, sleep),
        tasks: decode_domain(keys::TASKS, tasks),
        wake_state: has_content(&wake_state).then_some(wake_state),
    })
}

/// `None` for an empty domain or one whose shape does not decode.
fn decode_domain<T: DeserializeOwned>(key: &str, value: JsonValue) -> Option<T> {
    if !has_content(&value) {
        return None;
    }
    match serde_json::from_value(value) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            warn!("Skipping local domain '{key}': {e}");
            None
        }
    }
}

fn has_content(value: &JsonValue) -> bool {
    match value {
        JsonValue::Object(map) => !map.is_empty(),
        JsonValue::Array(items) => !items.is_empty(),
        _ => false,
    }
}
