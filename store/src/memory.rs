use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use store_api::{
    apply_increment, Document, Fields, Filter, Patch, Query, RemoteStore, Result, StoreError,
    Subscription,
};
use tracing::debug;
use uuid::Uuid;

use crate::clock::ServerClock;
use crate::subscribers::Subscribers;

/// Store operation, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Query,
    Get,
    Add,
    Create,
    Update,
    Increment,
}

impl Operation {
    fn is_write(self) -> bool {
        !matches!(self, Self::Query | Self::Get)
    }
}

struct FailRule {
    op: Operation,
    needle: String,
}

/// In-process document store. Every collection is a sorted map of id to
/// fields; writes are published to subscribers after they are applied.
///
/// Latency and failures can be injected so callers can exercise in-flight
/// concurrency and backend errors.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, BTreeMap<String, Fields>>>,
    clock: ServerClock,
    subscribers: Subscribers,
    latency: Option<Duration>,
    failures: Mutex<Vec<FailRule>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every operation by `latency` before it touches any data.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Fail every `op` whose target (`collection/id` plus the field for
    /// increments) contains `needle`. An empty needle matches everything.
    pub fn fail_on(&self, op: Operation, needle: impl Into<String>) {
        self.failures.lock().push(FailRule {
            op,
            needle: needle.into(),
        });
    }

    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    /// Number of write operations issued, whether or not they changed data.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of documents currently stored in `collection`.
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .get(collection)
            .map_or(0, |c| c.len())
    }

    async fn enter(&self, op: Operation, target: &str) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let failing = self
            .failures
            .lock()
            .iter()
            .any(|rule| rule.op == op && target.contains(&rule.needle));
        if failing {
            debug!(?op, target, "injected store failure");
            return Err(StoreError::Unavailable(format!("{op:?} {target}")));
        }
        if op.is_write() {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Read-modify-write of an existing document under the collection lock.
    /// Subscribers are notified before the lock is released so they observe
    /// writes in the order they were applied.
    fn modify<F>(&self, collection: &str, id: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut Fields) -> Result<()>,
    {
        let mut collections = self.collections.lock();
        let slot = collections
            .get_mut(collection)
            .and_then(|c| c.get_mut(id))
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        let before = slot.clone();
        f(slot)?;
        let after = Document::new(id, slot.clone());
        self.subscribers
            .publish(collection, Some(&Document::new(id, before)), &after);
        Ok(())
    }

    /// Insert a new document unless `id` is taken. Returns whether it was inserted.
    fn insert(&self, collection: &str, id: &str, patch: &Patch) -> bool {
        let now = self.clock.now_ms();
        let mut collections = self.collections.lock();
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.contains_key(id) {
            return false;
        }
        let mut fields = Fields::new();
        patch.apply(&mut fields, now);
        docs.insert(id.to_string(), fields.clone());
        self.subscribers
            .publish(collection, None, &Document::new(id, fields));
        true
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        self.enter(Operation::Query, collection).await?;
        let docs: Vec<Document> = self
            .collections
            .lock()
            .get(collection)
            .map(|c| {
                c.iter()
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(query.apply(docs))
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.enter(Operation::Get, &format!("{collection}/{id}")).await?;
        Ok(self
            .collections
            .lock()
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }

    async fn add(&self, collection: &str, patch: Patch) -> Result<String> {
        self.enter(Operation::Add, collection).await?;
        let id = Uuid::new_v4().simple().to_string();
        self.insert(collection, &id, &patch);
        Ok(id)
    }

    async fn create(&self, collection: &str, id: &str, patch: Patch) -> Result<bool> {
        self.enter(Operation::Create, &format!("{collection}/{id}")).await?;
        Ok(self.insert(collection, id, &patch))
    }

    async fn update(&self, collection: &str, id: &str, patch: Patch) -> Result<()> {
        self.enter(Operation::Update, &format!("{collection}/{id}")).await?;
        let now = self.clock.now_ms();
        self.modify(collection, id, |fields| {
            patch.apply(fields, now);
            Ok(())
        })
    }

    async fn increment(&self, collection: &str, id: &str, field: &str, delta: i64) -> Result<()> {
        self.enter(Operation::Increment, &format!("{collection}/{id}/{field}"))
            .await?;
        self.modify(collection, id, |fields| {
            if apply_increment(fields, field, delta) {
                Ok(())
            } else {
                Err(StoreError::NotNumeric {
                    collection: collection.into(),
                    id: id.into(),
                    field: field.into(),
                })
            }
        })
    }

    fn subscribe(&self, collection: &str, filters: Vec<Filter>) -> Subscription {
        self.subscribers.subscribe(collection, filters)
    }
}
