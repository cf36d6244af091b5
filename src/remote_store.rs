//! Client seam for the remote document database.
//!
//! Documents are JSON objects addressed by `(collection, id)`. The store stamps a
//! server-side write time into the [`SERVER_TIMESTAMP_FIELD`] of every document it
//! writes. [`MemoryRemoteStore`] is an in-process implementation used by hosts
//! without network access and by the test suite.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};
use tokio::sync::RwLock;

use crate::clock::format_instant;
use crate::error::{RemoteError, RemoteResult};

pub const SERVER_TIMESTAMP_FIELD: &str = "timestamp";

pub type Fields = Map<String, JsonValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Fields absent from the write keep their stored values.
    Merge,
    /// The write replaces the whole document.
    Overwrite,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.fields.get(field)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> RemoteResult<T> {
        serde_json::from_value(JsonValue::Object(self.fields.clone()))
            .map_err(|e| RemoteError::Decode(format!("{}: {e}", self.id)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, JsonValue),
    Gte(String, JsonValue),
}

/// Collection query: filters, at most one sort key and an optional limit.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.filters.push(Filter::Eq(field.into(), value.into()));
        self
    }

    pub fn where_gte(mut self, field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.filters.push(Filter::Gte(field.into(), value.into()));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, fields: &Fields) -> bool {
        self.filters.iter().all(|filter| match filter {
            Filter::Eq(field, value) => fields.get(field) == Some(value),
            Filter::Gte(field, value) => fields
                .get(field)
                .and_then(|stored| compare_json(stored, value))
                .map(|ord| ord != CmpOrdering::Less)
                .unwrap_or(false),
        })
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn get_document(&self, collection: &str, id: &str) -> RemoteResult<Option<Document>>;

    async fn set_document(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        mode: WriteMode,
    ) -> RemoteResult<()>;

    async fn query(&self, query: &Query) -> RemoteResult<Vec<Document>>;
}

/// One accepted write, as recorded by [`MemoryRemoteStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub collection: String,
    pub id: String,
    pub mode: WriteMode,
    pub fields: Fields,
}

/// In-process document store.
///
/// While offline (`set_online(false)`) every call fails with
/// [`RemoteError::Unavailable`], which is how a dropped connection looks to callers.
#[derive(Default)]
pub struct MemoryRemoteStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Document>>>,
    writes: RwLock<Vec<WriteRecord>>,
    offline: AtomicBool,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_online(&self, online: bool) {
        self.offline.store(!online, Ordering::SeqCst);
    }

    /// Every accepted write, oldest first.
    pub async fn writes(&self) -> Vec<WriteRecord> {
        self.writes.read().await.clone()
    }

    pub async fn writes_to(&self, collection: &str) -> Vec<WriteRecord> {
        self.writes
            .read()
            .await
            .iter()
            .filter(|w| w.collection == collection)
            .cloned()
            .collect()
    }

    pub async fn document_count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    fn check_online(&self) -> RemoteResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("client is offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn get_document(&self, collection: &str, id: &str) -> RemoteResult<Option<Document>> {
        self.check_online()?;
        let collections = self.collections.read().await;
        Ok(collections.get(collection).and_then(|docs| docs.get(id)).cloned())
    }

    async fn set_document(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        mode: WriteMode,
    ) -> RemoteResult<()> {
        self.check_online()?;
        if id.is_empty() {
            return Err(RemoteError::Rejected(format!("empty document id in '{collection}'")));
        }

        let now = Utc::now();
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();

        let mut stored = match (mode, docs.remove(id)) {
            (WriteMode::Merge, Some(existing)) => existing.fields,
            _ => Fields::new(),
        };
        for (field, value) in fields.iter() {
            stored.insert(field.clone(), value.clone());
        }
        stored.insert(
            SERVER_TIMESTAMP_FIELD.to_string(),
            JsonValue::String(format_instant(now)),
        );

        docs.insert(
            id.to_string(),
            Document {
                id: id.to_string(),
                fields: stored,
            },
        );
        drop(collections);

        debug!("Remote write {collection}/{id} ({mode:?})");
        self.writes.write().await.push(WriteRecord {
            collection: collection.to_string(),
            id: id.to_string(),
            mode,
            fields,
        });
        Ok(())
    }

    async fn query(&self, query: &Query) -> RemoteResult<Vec<Document>> {
        self.check_online()?;
        let collections = self.collections.read().await;
        let mut docs: Vec<Document> = collections
            .get(&query.collection)
            .map(|docs| docs.values().filter(|d| query.matches(&d.fields)).cloned().collect())
            .unwrap_or_default();

        if let Some((field, direction)) = &query.order_by {
            // Documents without the sort field are excluded, as ordered queries do.
            docs.retain(|d| d.fields.contains_key(field));
            docs.sort_by(|a, b| {
                let ord = match (a.fields.get(field), b.fields.get(field)) {
                    (Some(x), Some(y)) => compare_json(x, y).unwrap_or(CmpOrdering::Equal),
                    _ => CmpOrdering::Equal,
                };
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }

        if let Some(limit) = query.limit {
            docs.truncate(limit);
        }
        Ok(docs)
    }
}

/// Orders two JSON scalars of the same kind; `None` for mixed or compound values.
fn compare_json(a: &JsonValue, b: &JsonValue) -> Option<CmpOrdering> {
    match (a, b) {
        (JsonValue::String(x), JsonValue::String(y)) => Some(x.cmp(y)),
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (JsonValue::Bool(x), JsonValue::Bool(y)) => Some(x.cmp(y)),
        (JsonValue::Null, JsonValue::Null) => Some(CmpOrdering::Equal),
        _ => None,
    }
}
