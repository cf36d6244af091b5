//! Two-tier cache policy: local store first, remote store second, remote wins on read.
//!
//! The policy is chosen once, when a [`SyncStore`](crate::store::SyncStore) is built:
//! [`HeadlessTier`] when there is no local store, [`LocalTier`] when there is no
//! remote handle, and [`ReplicatedTier`] otherwise. None of these ever return an
//! error to the caller; failures are logged and reported as `false` / `None`.

use std::sync::Arc;

use async_trait::async_trait;
use log::{error, warn};
use serde_json::{json, Value as JsonValue};

use crate::clock::{format_instant, Clock};
use crate::error::StoreResult;
use crate::identity::UserId;
use crate::local_store::LocalStore;
use crate::models::{collections, UserDataRecord};
use crate::remote_store::{Fields, RemoteStore, WriteMode};

#[async_trait]
pub trait CacheTier: Send + Sync {
    /// `true` if the value reached at least one of the tiers.
    async fn set_item(&self, key: &str, value: &JsonValue, user_id: &UserId) -> bool;

    async fn get_item(&self, key: &str, user_id: &UserId) -> Option<JsonValue>;

    fn local(&self) -> Option<&dyn LocalStore>;

    fn remote(&self) -> Option<&dyn RemoteStore>;
}

pub struct HeadlessTier;

#[async_trait]
impl CacheTier for HeadlessTier {
    async fn set_item(&self, key: &str, _value: &JsonValue, _user_id: &UserId) -> bool {
        warn!("No local store in this context, dropping write of '{key}'");
        false
    }

    async fn get_item(&self, _key: &str, _user_id: &UserId) -> Option<JsonValue> {
        None
    }

    fn local(&self) -> Option<&dyn LocalStore> {
        None
    }

    fn remote(&self) -> Option<&dyn RemoteStore> {
        None
    }
}

pub struct LocalTier {
    local: Arc<dyn LocalStore>,
}

impl LocalTier {
    pub fn new(local: Arc<dyn LocalStore>) -> Self {
        Self { local }
    }
}

#[async_trait]
impl CacheTier for LocalTier {
    async fn set_item(&self, key: &str, value: &JsonValue, _user_id: &UserId) -> bool {
        match write_local(self.local.as_ref(), key, value) {
            Ok(()) => true,
            Err(e) => {
                error!("Local store write of '{key}' failed: {e}");
                false
            }
        }
    }

    async fn get_item(&self, key: &str, _user_id: &UserId) -> Option<JsonValue> {
        read_local(self.local.as_ref(), key)
    }

    fn local(&self) -> Option<&dyn LocalStore> {
        Some(self.local.as_ref())
    }

    fn remote(&self) -> Option<&dyn RemoteStore> {
        None
    }
}

pub struct ReplicatedTier {
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
    clock: Arc<dyn Clock>,
}

impl ReplicatedTier {
    pub fn new(local: Arc<dyn LocalStore>, remote: Arc<dyn RemoteStore>, clock: Arc<dyn Clock>) -> Self {
        Self { local, remote, clock }
    }
}

#[async_trait]
impl CacheTier for ReplicatedTier {
    async fn set_item(&self, key: &str, value: &JsonValue, user_id: &UserId) -> bool {
        let local_ok = match write_local(self.local.as_ref(), key, value) {
            Ok(()) => true,
            Err(e) => {
                warn!("Local store write of '{key}' failed: {e}");
                false
            }
        };

        let mut fields = Fields::new();
        fields.insert("data".to_string(), value.clone());
        fields.insert("userId".to_string(), json!(user_id.as_str()));
        fields.insert("key".to_string(), json!(key));
        fields.insert("lastModified".to_string(), json!(format_instant(self.clock.now())));

        let remote_ok = match self
            .remote
            .set_document(collections::USER_DATA, &user_id.doc_id(key), fields, WriteMode::Merge)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!("Remote write of '{key}' failed, keeping local copy only: {e}");
                false
            }
        };

        if !local_ok && !remote_ok {
            error!("Write of '{key}' was lost: neither local nor remote store accepted it");
        }
        local_ok || remote_ok
    }

    async fn get_item(&self, key: &str, user_id: &UserId) -> Option<JsonValue> {
        match self.remote.get_document(collections::USER_DATA, &user_id.doc_id(key)).await {
            Ok(Some(doc)) => match doc.decode::<UserDataRecord>() {
                Ok(UserDataRecord { data: Some(data), .. }) => {
                    if let Err(e) = write_local(self.local.as_ref(), key, &data) {
                        warn!("Could not refresh local copy of '{key}': {e}");
                    }
                    return Some(data);
                }
                Ok(_) => {}
                Err(e) => warn!("Remote record for '{key}' is unreadable, using local copy: {e}"),
            },
            Ok(None) => {}
            Err(e) => warn!("Remote read of '{key}' failed, using local copy: {e}"),
        }
        read_local(self.local.as_ref(), key)
    }

    fn local(&self) -> Option<&dyn LocalStore> {
        Some(self.local.as_ref())
    }

    fn remote(&self) -> Option<&dyn RemoteStore> {
        Some(self.remote.as_ref())
    }
}

fn write_local(local: &dyn LocalStore, key: &str, value: &JsonValue) -> StoreResult<()> {
    let raw = serde_json::to_string(value)?;
    local.set_item(key, &raw)
}

fn read_local(local: &dyn LocalStore, key: &str) -> Option<JsonValue> {
    let raw = match local.get_item(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!("Local store read of '{key}' failed: {e}");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Local value for '{key}' is not valid JSON: {e}");
            None
        }
    }
}

