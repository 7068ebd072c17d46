use std::sync::Arc;

use log::warn;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::{DecodeError, Document, DocumentStore, Query, StoreError, SubscriptionHandle};

/// Lifecycle of a live-bound list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListPhase {
    /// No snapshot has arrived yet.
    Loading,
    /// The list mirrors the latest delivered snapshot.
    Live,
    /// The live query failed. The list is emptied and does not recover;
    /// binding a new list is the only retry.
    Failed,
}

pub type ResortFn<T> = Box<dyn Fn(&mut Vec<T>) + Send>;
pub type ErrorHook = Box<dyn FnOnce(&StoreError) + Send>;

struct ListState<T> {
    items: Vec<T>,
    phase: ListPhase,
}

/// A typed list bound to a live query.
///
/// Every delivery replaces the whole list, there is no diffing. Documents
/// that fail to decode are skipped with a warning instead of poisoning the
/// rest of the snapshot. An optional resort runs over each decoded
/// snapshot before it becomes visible, and must be stable so it only
/// reorders what it means to.
///
/// Dropping the list, or calling [LiveList::cancel], detaches the
/// underlying watcher. Both are idempotent.
pub struct LiveList<T> {
    state: Arc<Mutex<ListState<T>>>,
    version: watch::Receiver<u64>,
    handle: SubscriptionHandle,
}

impl<T: Send + 'static> LiveList<T> {
    /// Binds a list to a query, decoding every document with `decode`.
    pub fn bind<S: DocumentStore>(
        store: &S,
        query: Query,
        decode: impl Fn(&Document) -> Result<T, DecodeError> + Send + 'static,
    ) -> Self {
        Self::bind_with(store, query, decode, None, None)
    }

    /// Binds a list with an optional client-side resort and an optional
    /// error hook. The hook fires at most once, on the delivery that moves
    /// the list to [ListPhase::Failed].
    pub fn bind_with<S: DocumentStore>(
        store: &S,
        query: Query,
        decode: impl Fn(&Document) -> Result<T, DecodeError> + Send + 'static,
        resort: Option<ResortFn<T>>,
        on_error: Option<ErrorHook>,
    ) -> Self {
        let subscription = store.watch(&query);
        let handle = subscription.handle();

        let state = Arc::new(Mutex::new(ListState {
            items: vec![],
            phase: ListPhase::Loading,
        }));

        let (notify, version) = watch::channel(0u64);

        let pump_state = state.clone();
        let target = query.target_name().to_string();

        tokio::spawn(async move {
            let mut subscription = subscription;
            let mut on_error = on_error;

            while let Some(delivery) = subscription.next_result().await {
                let mut failed = false;

                match delivery {
                    Ok(snapshot) => {
                        let mut items = Vec::with_capacity(snapshot.len());

                        for document in &snapshot {
                            match decode(document) {
                                Ok(item) => items.push(item),
                                Err(error) => warn!("skipping document in {}: {}", target, error),
                            }
                        }

                        if let Some(resort) = &resort {
                            resort(&mut items);
                        }

                        let mut state = pump_state.lock();
                        state.items = items;
                        state.phase = ListPhase::Live;
                    }
                    Err(error) => {
                        warn!("live query on {} ended: {}", target, error);

                        if let Some(hook) = on_error.take() {
                            hook(&error);
                        }

                        let mut state = pump_state.lock();
                        state.items.clear();
                        state.phase = ListPhase::Failed;

                        failed = true;
                    }
                }

                notify.send_modify(|v| *v += 1);

                if failed {
                    break;
                }
            }
        });

        Self {
            state,
            version,
            handle,
        }
    }
}

impl<T> LiveList<T> {
    pub fn phase(&self) -> ListPhase {
        self.state.lock().phase
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Runs a closure over the current items without cloning them.
    pub fn read<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(&self.state.lock().items)
    }

    /// Detaches the watcher. Idempotent, and implied by dropping the list.
    pub fn cancel(&self) {
        self.handle.cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }

    /// Waits for the next delivery to land. Returns false once no further
    /// deliveries can arrive.
    pub async fn changed(&mut self) -> bool {
        self.version.changed().await.is_ok()
    }

    /// Waits until the list satisfies a predicate, observing every
    /// delivery in between. Returns false when the binding ends without
    /// the predicate holding.
    pub async fn wait_until(&mut self, predicate: impl Fn(&[T], ListPhase) -> bool) -> bool {
        loop {
            {
                let state = self.state.lock();

                if predicate(&state.items, state.phase) {
                    return true;
                }
            }

            if self.version.changed().await.is_err() {
                let state = self.state.lock();
                return predicate(&state.items, state.phase);
            }
        }
    }
}

impl<T: Clone> LiveList<T> {
    pub fn items(&self) -> Vec<T> {
        self.state.lock().items.clone()
    }
}

impl<T> Drop for LiveList<T> {
    fn drop(&mut self) {
        self.handle.cancel()
    }
}

#[cfg(test)]
mod test {
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::{DocumentRef, StoreResult, Subscription, SubscriptionSender, Update};

    /// Hands out one subscription and keeps the producer side around so
    /// tests can push deliveries by hand.
    struct ScriptedStore {
        sender: Mutex<Option<SubscriptionSender>>,
    }

    impl ScriptedStore {
        fn new() -> Self {
            Self {
                sender: Mutex::new(None),
            }
        }

        fn sender(&self) -> SubscriptionSender {
            self.sender.lock().take().expect("subscription was opened")
        }
    }

    #[async_trait]
    impl DocumentStore for ScriptedStore {
        async fn get(&self, _doc: &DocumentRef) -> StoreResult<Option<Document>> {
            unreachable!()
        }

        async fn set(&self, _doc: &DocumentRef, _fields: Value) -> StoreResult<()> {
            unreachable!()
        }

        async fn update(&self, _doc: &DocumentRef, _update: Update) -> StoreResult<()> {
            unreachable!()
        }

        async fn delete(&self, _doc: &DocumentRef) -> StoreResult<()> {
            unreachable!()
        }

        async fn fetch(&self, _query: &Query) -> StoreResult<Vec<Document>> {
            unreachable!()
        }

        fn watch(&self, _query: &Query) -> Subscription {
            let (sender, subscription) = Subscription::channel(|_| {});
            *self.sender.lock() = Some(sender);

            subscription
        }
    }

    fn titled(id: &str, title: &str) -> Document {
        let fields = match json!({ "title": title }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };

        Document::new(id, "items", fields)
    }

    fn title_of(doc: &Document) -> Result<String, DecodeError> {
        #[derive(serde::Deserialize)]
        struct Titled {
            title: String,
        }

        doc.decode::<Titled>().map(|t| t.title)
    }

    #[tokio::test]
    async fn snapshots_replace_the_whole_list() {
        let store = ScriptedStore::new();
        let mut list = LiveList::bind(&store, Query::collection("items"), title_of);
        let sender = store.sender();

        assert_eq!(list.phase(), ListPhase::Loading);

        sender.send(Ok(vec![titled("1", "first"), titled("2", "second")]));
        assert!(list.wait_until(|items, _| items.len() == 2).await);

        sender.send(Ok(vec![titled("3", "third")]));
        assert!(list.wait_until(|items, _| items == ["third"]).await);
        assert_eq!(list.phase(), ListPhase::Live);
    }

    #[tokio::test]
    async fn undecodable_documents_are_skipped() {
        let store = ScriptedStore::new();
        let mut list = LiveList::bind(&store, Query::collection("items"), title_of);
        let sender = store.sender();

        let broken = Document::new(
            "bad",
            "items",
            match json!({ "title": 42 }) {
                Value::Object(map) => map,
                _ => unreachable!(),
            },
        );

        sender.send(Ok(vec![titled("1", "kept"), broken]));

        assert!(list.wait_until(|items, _| items == ["kept"]).await);
    }

    #[tokio::test]
    async fn failure_empties_the_list_and_fires_the_hook_once() {
        let store = ScriptedStore::new();

        let (hook_tx, mut hook_rx) = tokio::sync::mpsc::unbounded_channel();

        let mut list = LiveList::bind_with(
            &store,
            Query::collection("items"),
            title_of,
            None,
            Some(Box::new(move |error: &StoreError| {
                hook_tx.send(error.to_string()).ok();
            })),
        );

        let sender = store.sender();

        sender.send(Ok(vec![titled("1", "first")]));
        assert!(list.wait_until(|items, _| items.len() == 1).await);

        sender.send(Err(StoreError::Subscription {
            target: "items".to_string(),
            reason: "permissions changed".to_string(),
        }));

        assert!(list.wait_until(|_, phase| phase == ListPhase::Failed).await);
        assert!(list.is_empty(), "failed lists are emptied");

        let message = hook_rx.recv().await.expect("hook fired");
        assert!(message.contains("permissions changed"));

        assert!(
            !sender.send(Ok(vec![titled("2", "late")])),
            "the watcher is gone after a failure"
        );
    }

    #[tokio::test]
    async fn resort_runs_over_every_snapshot() {
        let store = ScriptedStore::new();

        let mut list = LiveList::bind_with(
            &store,
            Query::collection("items"),
            title_of,
            Some(Box::new(|items: &mut Vec<String>| items.sort())),
            None,
        );

        let sender = store.sender();
        sender.send(Ok(vec![titled("1", "b"), titled("2", "a")]));

        assert!(list.wait_until(|items, _| items == ["a", "b"]).await);
    }
}
