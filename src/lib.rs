//! # MindCTRL Sync
//!
//! Offline-first persistence for a personal productivity app (hydration, sleep and
//! task tracking). Every write lands in a device-local store first; when a remote
//! document store is configured the data is also replicated there, and a periodic
//! full sync keeps the remote copy converging on the local state.
//!
//! ## Features
//!
//! - **Two-tier cache**: local store first, remote second, remote wins on read
//! - **LMDB-backed local store**: durable once a write returns
//! - **Daily history**: one archived hydration / sleep entry per user per day
//! - **Auto-sync**: periodic, startup and unload-triggered full resyncs
//! - **Soft failure**: data calls never return errors, they log and fall back
//! - **FFI surface**: C-compatible entry points for host shells
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use mindctrl_sync::{MemoryRemoteStore, RemoteStore, SyncConfig, SyncStore, Task};
//!
//! # async fn run() -> Result<(), mindctrl_sync::StoreError> {
//! let remote: Arc<dyn RemoteStore> = Arc::new(MemoryRemoteStore::new());
//! let store = Arc::new(SyncStore::open(SyncConfig::from_env(), Some(remote))?);
//!
//! let task = Task { id: 1, title: "Stretch".to_string(), ..Task::default() };
//! store.save_tasks(&[task]).await;
//! store.start().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## FFI Functions
//!
//! FFI stores are LMDB-backed and local-only. Every function returns a JSON
//! [`AppResponse`](app_response::AppResponse) string that must be released with
//! [`free_response`].
//!
//! - [`create_store`] - Open (or create) a store
//! - [`set_item`] / [`get_item`] - Generic key-value access
//! - [`save_hydration_data`], [`save_sleep_data`], [`save_tasks`] - Domain savers
//! - [`sync_all_data`] - Full resync of the local domains
//! - [`get_user_id`] - Device user id
//! - [`get_hydration_history`] - Archived hydration days
//! - [`close_store`] - Release the store

pub mod app_response;
pub mod auto_sync;
pub mod clock;
pub mod config;
pub mod error;
pub mod identity;
pub mod local_store;
pub mod models;
pub mod remote_store;
pub mod store;
pub mod tier;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::path::PathBuf;
use std::sync::Arc;

use log::{info, warn};
use serde_json::Value as JsonValue;
use tokio::runtime::Runtime;

use crate::app_response::AppResponse;

pub use crate::clock::{Clock, FixedClock, SystemClock};
pub use crate::config::SyncConfig;
pub use crate::error::{RemoteError, StoreError};
pub use crate::identity::UserId;
pub use crate::local_store::{LmdbLocalStore, LocalStore, MemoryLocalStore};
pub use crate::models::{
    Analytics, HistoryEntry, HydrationSnapshot, SleepSnapshot, Task, TaskCompletion,
};
pub use crate::remote_store::{MemoryRemoteStore, RemoteStore};
pub use crate::store::SyncStore;

/// A store handed out across the FFI boundary, with the runtime that drives it.
pub struct FfiStore {
    runtime: Runtime,
    store: Arc<SyncStore>,
}

/// Opens the store named `name`, creating `<name>.lmdb` if needed.
///
/// # Returns
///
/// A pointer to the store, or null on failure. Release it with [`close_store`].
///
/// # Examples
///
/// ```no_run
/// use std::ffi::CString;
/// use mindctrl_sync::create_store;
///
/// let name = CString::new("my_store").unwrap();
/// let store = create_store(name.as_ptr());
///
/// if !store.is_null() {
///     // Store opened successfully
/// }
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn create_store(name: *const c_char) -> *mut FfiStore {
    if name.is_null() {
        warn!("Null name pointer passed to create_store");
        return std::ptr::null_mut();
    }

    let name_str = match unsafe { CStr::from_ptr(name).to_str() } {
        Ok(s) => s,
        Err(e) => {
            warn!("Invalid UTF-8 in name parameter: {e}");
            return std::ptr::null_mut();
        }
    };

    if name_str.trim().is_empty() {
        warn!("Empty store name passed to create_store");
        return std::ptr::null_mut();
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            warn!("❌ Failed to build runtime: {e}");
            return std::ptr::null_mut();
        }
    };

    let config = SyncConfig {
        data_dir: PathBuf::new(),
        store_name: name_str.to_string(),
        ..SyncConfig::from_env()
    };

    match SyncStore::open(config, None) {
        Ok(store) => {
            info!("✅ Store '{name_str}' opened for {}", store.user_id());
            Box::into_raw(Box::new(FfiStore {
                runtime,
                store: Arc::new(store),
            }))
        }
        Err(e) => {
            warn!("❌ Failed to open store '{name_str}': {e}");
            std::ptr::null_mut()
        }
    }
}

/// Stores a JSON value under `key`.
///
/// # Examples
///
/// ```no_run
/// use std::ffi::CString;
/// use mindctrl_sync::{create_store, set_item};
///
/// let name = CString::new("my_store").unwrap();
/// let store = create_store(name.as_ptr());
///
/// let key = CString::new("mindctrl_wake_state").unwrap();
/// let value = CString::new(r#"{"wokeAt":"07:15"}"#).unwrap();
/// let result = set_item(store, key.as_ptr(), value.as_ptr());
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn set_item(state: *mut FfiStore, key: *const c_char, json_ptr: *const c_char) -> *const c_char {
    let state = match store_ref(state, "set_item") {
        Ok(state) => state,
        Err(err) => return err,
    };
    let key = match c_ptr_to_string(key, "key") {
        Ok(key) => key,
        Err(err) => return err,
    };
    let value: JsonValue = match parse_json(json_ptr) {
        Ok(value) => value,
        Err(err) => return err,
    };

    let stored = state.runtime.block_on(state.store.set_item(&key, &value));
    bool_response(stored, format!("Item '{key}' stored"), format!("Item '{key}' could not be stored"))
}

/// Reads the JSON value stored under `key`.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_item(state: *mut FfiStore, key: *const c_char) -> *const c_char {
    let state = match store_ref(state, "get_item") {
        Ok(state) => state,
        Err(err) => return err,
    };
    let key = match c_ptr_to_string(key, "key") {
        Ok(key) => key,
        Err(err) => return err,
    };

    match state.runtime.block_on(state.store.get_item::<JsonValue>(&key)) {
        Some(value) => response_to_c_string(&AppResponse::Ok(value.to_string())),
        None => response_to_c_string(&AppResponse::NotFound(format!("No item stored under key: {key}"))),
    }
}

/// Saves a hydration snapshot given as JSON.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn save_hydration_data(state: *mut FfiStore, json_ptr: *const c_char) -> *const c_char {
    let state = match store_ref(state, "save_hydration_data") {
        Ok(state) => state,
        Err(err) => return err,
    };
    let snapshot: HydrationSnapshot = match parse_json(json_ptr) {
        Ok(snapshot) => snapshot,
        Err(err) => return err,
    };

    let saved = state.runtime.block_on(state.store.save_hydration_data(&snapshot));
    bool_response(saved, "Hydration data saved", "Hydration data could not be saved")
}

/// Saves a sleep snapshot given as JSON.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn save_sleep_data(state: *mut FfiStore, json_ptr: *const c_char) -> *const c_char {
    let state = match store_ref(state, "save_sleep_data") {
        Ok(state) => state,
        Err(err) => return err,
    };
    let snapshot: SleepSnapshot = match parse_json(json_ptr) {
        Ok(snapshot) => snapshot,
        Err(err) => return err,
    };

    let saved = state.runtime.block_on(state.store.save_sleep_data(&snapshot));
    bool_response(saved, "Sleep data saved", "Sleep data could not be saved")
}

/// Saves the full task list given as a JSON array.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn save_tasks(state: *mut FfiStore, json_ptr: *const c_char) -> *const c_char {
    let state = match store_ref(state, "save_tasks") {
        Ok(state) => state,
        Err(err) => return err,
    };
    let tasks: Vec<Task> = match parse_json(json_ptr) {
        Ok(tasks) => tasks,
        Err(err) => return err,
    };

    let saved = state.runtime.block_on(state.store.save_tasks(&tasks));
    bool_response(saved, format!("{} tasks saved", tasks.len()), "Tasks could not be saved")
}

/// Runs one full sync of the local domains.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn sync_all_data(state: *mut FfiStore) -> *const c_char {
    let state = match store_ref(state, "sync_all_data") {
        Ok(state) => state,
        Err(err) => return err,
    };

    let synced = state.runtime.block_on(state.store.sync_all_data());
    bool_response(synced, "Data sync completed", "Data sync failed")
}

/// Returns the device user id the store writes under.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_user_id(state: *mut FfiStore) -> *const c_char {
    let state = match store_ref(state, "get_user_id") {
        Ok(state) => state,
        Err(err) => return err,
    };
    response_to_c_string(&AppResponse::success(state.store.user_id().as_str()))
}

/// Archived hydration days as a JSON array, newest first, limited to the
/// configured history window.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_hydration_history(state: *mut FfiStore) -> *const c_char {
    let state = match store_ref(state, "get_hydration_history") {
        Ok(state) => state,
        Err(err) => return err,
    };

    let days = state.store.config().history_days;
    let history = state.runtime.block_on(state.store.get_hydration_history(days));
    match serde_json::to_string(&history) {
        Ok(json) => response_to_c_string(&AppResponse::Ok(json)),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Releases a store created by [`create_store`]. The pointer must not be used afterwards.
///
/// # Notes
///
/// The LMDB environment is closed when the store is dropped.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn close_store(state: *mut FfiStore) -> *const c_char {
    if state.is_null() {
        let error = AppResponse::BadRequest("Null state pointer passed to close_store".to_string());
        return response_to_c_string(&error);
    }

    let state = unsafe { Box::from_raw(state) };
    let FfiStore { runtime, store } = *state;
    runtime.block_on(store.stop());
    drop(store);
    drop(runtime);

    response_to_c_string(&AppResponse::Ok("Store closed successfully".to_string()))
}

/// Releases a response string returned by any function of this module.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn free_response(ptr: *const c_char) {
    if ptr.is_null() {
        return;
    }
    drop(unsafe { CString::from_raw(ptr as *mut c_char) });
}

fn store_ref<'a>(state: *mut FfiStore, fn_name: &str) -> Result<&'a FfiStore, *const c_char> {
    match unsafe { state.as_ref() } {
        Some(state) => Ok(state),
        None => {
            let error = AppResponse::BadRequest(format!("Null state pointer passed to {fn_name}"));
            Err(response_to_c_string(&error))
        }
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(json_ptr: *const c_char) -> Result<T, *const c_char> {
    let json_str = c_ptr_to_string(json_ptr, "JSON")?;
    serde_json::from_str(&json_str).map_err(|e| {
        let error = AppResponse::SerializationError(format!("Invalid JSON: {e}"));
        response_to_c_string(&error)
    })
}

fn bool_response(ok: bool, success: impl Into<String>, failure: impl Into<String>) -> *const c_char {
    let response = if ok {
        AppResponse::Ok(success.into())
    } else {
        AppResponse::DatabaseError(failure.into())
    };
    response_to_c_string(&response)
}

/// Serializes an [`AppResponse`] into a C string owned by the caller.
///
/// Returns a null pointer if serialization or C string creation fails.
fn response_to_c_string(response: &AppResponse) -> *const c_char {
    let json = match serde_json::to_string(response) {
        Ok(j) => j,
        Err(e) => {
            warn!("Error serializing response: {e}");
            return std::ptr::null();
        }
    };

    match CString::new(json) {
        Ok(c_str) => c_str.into_raw(),
        Err(e) => {
            warn!("Error creating CString: {e}");
            std::ptr::null()
        }
    }
}

/// Converts a C string pointer to a Rust String.
///
/// # Returns
///
/// * `Ok(String)` - If conversion was successful
/// * `Err(*const c_char)` - Error response in C format if the pointer was null or not UTF-8
fn c_ptr_to_string(ptr: *const c_char, field_name: &str) -> Result<String, *const c_char> {
    if ptr.is_null() {
        let error = AppResponse::BadRequest(format!("Null {field_name} pointer"));
        return Err(response_to_c_string(&error));
    }

    match unsafe { CStr::from_ptr(ptr).to_str() } {
        Ok(s) => Ok(s.to_string()),
        Err(e) => {
            let error = AppResponse::BadRequest(format!("Invalid UTF-8 in {field_name}: {e}"));
            Err(response_to_c_string(&error))
        }
    }
}
