use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use quorum_core::{
    compare_values, Direction, Document, DocumentRef, DocumentStore, FieldOp, Query, Snapshot,
    StoreError, StoreResult, Subscription, SubscriptionSender, Update, WatcherId,
};

/// An in-memory [DocumentStore] with live queries.
///
/// Backs local development and tests. Writes notify matching watchers
/// synchronously while the commit lock is held, so deliveries always
/// arrive in commit order and never interleave.
///
/// Faults can be injected to exercise failure paths: one-shot write and
/// read rejections matched by path fragment, and forced live query
/// failures.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    state: Mutex<State>,
    watchers: DashMap<WatcherId, Watcher>,
}

#[derive(Default)]
struct State {
    collections: HashMap<String, Collection>,
    /// Bumps on every committed write, used as an insertion tie-breaker
    /// when sorting query results.
    sequence: u64,
    write_faults: Vec<Fault>,
    read_faults: Vec<Fault>,
}

#[derive(Default)]
struct Collection {
    documents: BTreeMap<String, StoredDocument>,
}

struct StoredDocument {
    fields: Map<String, Value>,
    inserted: u64,
}

struct Watcher {
    query: Query,
    sender: SubscriptionSender,
}

struct Fault {
    fragment: String,
    reason: String,
}

impl State {
    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    fn take_write_fault(&mut self, path: &str) -> Option<Fault> {
        let index = self
            .write_faults
            .iter()
            .position(|fault| path.contains(&fault.fragment))?;

        Some(self.write_faults.remove(index))
    }

    fn take_read_fault(&mut self, target: &str) -> Option<Fault> {
        let index = self
            .read_faults
            .iter()
            .position(|fault| target.contains(&fault.fragment))?;

        Some(self.read_faults.remove(index))
    }

    fn run_query(&self, query: &Query) -> Snapshot {
        let mut matches: Vec<(&String, &String, &StoredDocument)> = vec![];

        for (path, collection) in &self.collections {
            if !query.covers_collection(path) {
                continue;
            }

            for (id, stored) in &collection.documents {
                if query.matches(&stored.fields) {
                    matches.push((path, id, stored));
                }
            }
        }

        match &query.order {
            Some(order) => matches.sort_by(|(_, _, a), (_, _, b)| {
                let a_key = a.fields.get(&order.field).unwrap_or(&Value::Null);
                let b_key = b.fields.get(&order.field).unwrap_or(&Value::Null);

                let by_field = match order.direction {
                    Direction::Ascending => compare_values(a_key, b_key),
                    Direction::Descending => compare_values(b_key, a_key),
                };

                by_field.then(a.inserted.cmp(&b.inserted))
            }),
            None => matches.sort_by_key(|(_, _, stored)| stored.inserted),
        }

        if let Some(limit) = query.limit {
            matches.truncate(limit);
        }

        matches
            .into_iter()
            .map(|(path, id, stored)| Document::new(id.clone(), path.clone(), stored.fields.clone()))
            .collect()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                state: Default::default(),
                watchers: Default::default(),
            }),
        }
    }

    /// Makes the next write whose document path contains `fragment` fail
    /// with [StoreError::Rejected]. Consumed by the write it rejects.
    pub fn reject_next_write(&self, fragment: impl Into<String>, reason: impl Into<String>) {
        self.inner.state.lock().write_faults.push(Fault {
            fragment: fragment.into(),
            reason: reason.into(),
        });
    }

    /// Makes the next read or fetch touching a matching path fail with
    /// [StoreError::Transport]. Consumed by the operation it fails.
    pub fn reject_next_read(&self, fragment: impl Into<String>, reason: impl Into<String>) {
        self.inner.state.lock().read_faults.push(Fault {
            fragment: fragment.into(),
            reason: reason.into(),
        });
    }

    /// Fails every live query whose target contains `fragment`. Affected
    /// subscriptions receive one error and are torn down; new watches are
    /// unaffected.
    pub fn break_live_queries(&self, fragment: &str, reason: &str) {
        // Holding the commit lock keeps the failure ordered against writes.
        let _state = self.inner.state.lock();
        let mut broken = vec![];

        for entry in self.inner.watchers.iter() {
            let watcher = entry.value();

            if !watcher.query.target_name().contains(fragment) {
                continue;
            }

            watcher.sender.send(Err(StoreError::Subscription {
                target: watcher.query.target_name().to_string(),
                reason: reason.to_string(),
            }));

            broken.push(*entry.key());
        }

        for id in broken {
            self.inner.watchers.remove(&id);
        }
    }

    /// Number of documents currently under a collection path.
    pub fn count(&self, collection: &str) -> usize {
        self.inner
            .state
            .lock()
            .collections
            .get(collection)
            .map(|collection| collection.documents.len())
            .unwrap_or(0)
    }

    fn notify(&self, state: &State, collection_path: &str) {
        let mut dead = vec![];

        for entry in self.inner.watchers.iter() {
            let watcher = entry.value();

            if !watcher.query.covers_collection(collection_path) {
                continue;
            }

            let snapshot = state.run_query(&watcher.query);

            if !watcher.sender.send(Ok(snapshot)) {
                dead.push(*entry.key());
            }
        }

        for id in dead {
            self.inner.watchers.remove(&id);
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, doc: &DocumentRef) -> StoreResult<Option<Document>> {
        let mut state = self.inner.state.lock();

        if let Some(fault) = state.take_read_fault(&doc.path()) {
            return Err(StoreError::Transport(fault.reason));
        }

        let document = state
            .collections
            .get(doc.collection().path())
            .and_then(|collection| collection.documents.get(doc.id()))
            .map(|stored| {
                Document::new(
                    doc.id(),
                    doc.collection().path(),
                    stored.fields.clone(),
                )
            });

        Ok(document)
    }

    async fn set(&self, doc: &DocumentRef, fields: Value) -> StoreResult<()> {
        let Value::Object(fields) = fields else {
            return Err(StoreError::Rejected {
                path: doc.path(),
                reason: "document body must be an object".to_string(),
            });
        };

        let mut state = self.inner.state.lock();

        if let Some(fault) = state.take_write_fault(&doc.path()) {
            return Err(StoreError::Rejected {
                path: doc.path(),
                reason: fault.reason,
            });
        }

        let sequence = state.next_sequence();

        let collection = state
            .collections
            .entry(doc.collection().path().to_string())
            .or_default();

        // A replaced document keeps its original insertion position.
        let inserted = collection
            .documents
            .get(doc.id())
            .map(|existing| existing.inserted)
            .unwrap_or(sequence);

        collection
            .documents
            .insert(doc.id().to_string(), StoredDocument { fields, inserted });

        self.notify(&state, doc.collection().path());
        Ok(())
    }

    async fn update(&self, doc: &DocumentRef, update: Update) -> StoreResult<()> {
        let mut state = self.inner.state.lock();

        if let Some(fault) = state.take_write_fault(&doc.path()) {
            return Err(StoreError::Rejected {
                path: doc.path(),
                reason: fault.reason,
            });
        }

        let stored = state
            .collections
            .get_mut(doc.collection().path())
            .and_then(|collection| collection.documents.get_mut(doc.id()))
            .ok_or(StoreError::NotFound { path: doc.path() })?;

        for (field, op) in update.ops() {
            apply_op(&mut stored.fields, field, op);
        }

        self.notify(&state, doc.collection().path());
        Ok(())
    }

    async fn delete(&self, doc: &DocumentRef) -> StoreResult<()> {
        let mut state = self.inner.state.lock();

        if let Some(fault) = state.take_write_fault(&doc.path()) {
            return Err(StoreError::Rejected {
                path: doc.path(),
                reason: fault.reason,
            });
        }

        state
            .collections
            .get_mut(doc.collection().path())
            .and_then(|collection| collection.documents.remove(doc.id()))
            .ok_or(StoreError::NotFound { path: doc.path() })?;

        self.notify(&state, doc.collection().path());
        Ok(())
    }

    async fn fetch(&self, query: &Query) -> StoreResult<Vec<Document>> {
        let mut state = self.inner.state.lock();

        if let Some(fault) = state.take_read_fault(query.target_name()) {
            return Err(StoreError::Transport(fault.reason));
        }

        Ok(state.run_query(query))
    }

    fn watch(&self, query: &Query) -> Subscription {
        let weak = Arc::downgrade(&self.inner);

        let (sender, subscription) = Subscription::channel(move |id: WatcherId| {
            if let Some(inner) = weak.upgrade() {
                inner.watchers.remove(&id);
            }
        });

        // The lock keeps the initial snapshot ordered against writes.
        let state = self.inner.state.lock();

        sender.send(Ok(state.run_query(query)));

        self.inner.watchers.insert(
            subscription.id(),
            Watcher {
                query: query.clone(),
                sender,
            },
        );

        subscription
    }
}

fn apply_op(fields: &mut Map<String, Value>, field: &str, op: &FieldOp) {
    match op {
        FieldOp::Set(value) => {
            fields.insert(field.to_string(), value.clone());
        }
        FieldOp::ArrayUnion(values) => {
            let entry = fields
                .entry(field.to_string())
                .or_insert_with(|| Value::Array(vec![]));

            if !entry.is_array() {
                *entry = Value::Array(vec![]);
            }

            if let Value::Array(existing) = entry {
                for value in values {
                    if !existing.contains(value) {
                        existing.push(value.clone());
                    }
                }
            }
        }
        FieldOp::Increment(by) => {
            let current = fields.get(field).and_then(Value::as_i64).unwrap_or(0);
            fields.insert(field.to_string(), Value::from(current + by));
        }
    }
}
