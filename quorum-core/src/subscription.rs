use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, Waker};

use futures_util::{Stream, StreamExt};
use parking_lot::Mutex;

use crate::{Document, Id, StoreResult};

pub type WatcherId = Id<Subscription>;

/// One full result set of a live query.
pub type Snapshot = Vec<Document>;
pub type SnapshotResult = StoreResult<Snapshot>;

type DetachFn = Box<dyn FnOnce(WatcherId) + Send>;

struct Shared {
    id: WatcherId,
    pending: Mutex<VecDeque<SnapshotResult>>,
    waker: Mutex<Option<Waker>>,
    closed: AtomicBool,
    cancelled: AtomicBool,
    /// Runs once, on the first cancellation.
    detach: Mutex<Option<DetachFn>>,
}

impl Shared {
    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(detach) = self.detach.lock().take() {
            detach(self.id);
        }

        self.close();
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.wake();
    }

    fn wake(&self) {
        if let Some(waker) = self.waker.lock().take() {
            waker.wake()
        }
    }
}

/// The producer side of a subscription, held by the store.
pub struct SubscriptionSender {
    shared: Weak<Shared>,
}

impl SubscriptionSender {
    /// Queues a delivery. Returns false when the consumer is gone or has
    /// cancelled, in which case the producer should discard its watcher.
    pub fn send(&self, result: SnapshotResult) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };

        if shared.cancelled.load(Ordering::SeqCst) || shared.closed.load(Ordering::SeqCst) {
            return false;
        }

        shared.pending.lock().push_back(result);
        shared.wake();

        true
    }

    /// Ends the stream from the producer side. Pending deliveries still
    /// drain before the stream terminates.
    pub fn close(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.close()
        }
    }
}

/// A handle to a live query.
///
/// Snapshots arrive in commit order through the [Stream] implementation.
/// Dropping the subscription, or cancelling it through any of its
/// handles, detaches the watcher from the store exactly once. Cancelling
/// more than once is a no-op.
pub struct Subscription {
    shared: Arc<Shared>,
}

/// A cheap clonable handle that can tear a subscription down from
/// somewhere other than where the stream is being consumed.
#[derive(Clone)]
pub struct SubscriptionHandle {
    shared: Arc<Shared>,
}

impl Subscription {
    /// Creates a connected producer/consumer pair. `detach` runs once when
    /// the subscription is cancelled or dropped, so the producer can
    /// discard its side.
    pub fn channel(detach: impl FnOnce(WatcherId) + Send + 'static) -> (SubscriptionSender, Self) {
        let shared = Arc::new(Shared {
            id: WatcherId::new(),
            pending: Default::default(),
            waker: Default::default(),
            closed: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            detach: Mutex::new(Some(Box::new(detach))),
        });

        let sender = SubscriptionSender {
            shared: Arc::downgrade(&shared),
        };

        (sender, Self { shared })
    }

    pub fn id(&self) -> WatcherId {
        self.shared.id
    }

    pub fn handle(&self) -> SubscriptionHandle {
        SubscriptionHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn cancel(&self) {
        self.shared.cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
    }

    /// Waits for the next delivery. `None` means the stream has ended.
    pub async fn next_result(&mut self) -> Option<SnapshotResult> {
        self.next().await
    }
}

impl SubscriptionHandle {
    pub fn cancel(&self) {
        self.shared.cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
    }
}

impl Stream for Subscription {
    type Item = SnapshotResult;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut pending = self.shared.pending.lock();

        if let Some(result) = pending.pop_front() {
            return Poll::Ready(Some(result));
        }

        if self.shared.closed.load(Ordering::SeqCst) || self.shared.cancelled.load(Ordering::SeqCst)
        {
            return Poll::Ready(None);
        }

        *self.shared.waker.lock() = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.shared.cancel()
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn counting_channel() -> (Arc<AtomicUsize>, SubscriptionSender, Subscription) {
        let detached = Arc::new(AtomicUsize::new(0));
        let counter = detached.clone();

        let (sender, subscription) = Subscription::channel(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        (detached, sender, subscription)
    }

    #[tokio::test]
    async fn deliveries_arrive_in_order() {
        let (_, sender, mut subscription) = counting_channel();

        assert!(sender.send(Ok(vec![])));
        assert!(sender.send(Err(crate::StoreError::Transport("offline".to_string()))));

        let first = subscription.next_result().await.expect("first delivery");
        let second = subscription.next_result().await.expect("second delivery");

        assert!(first.is_ok());
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn cancelling_detaches_once() {
        let (detached, sender, subscription) = counting_channel();

        subscription.cancel();
        subscription.cancel();
        subscription.handle().cancel();

        assert_eq!(detached.load(Ordering::SeqCst), 1);
        assert!(!sender.send(Ok(vec![])), "sends after cancel are refused");
    }

    #[tokio::test]
    async fn dropping_detaches() {
        let (detached, _sender, subscription) = counting_channel();
        let handle = subscription.handle();

        drop(subscription);

        assert_eq!(detached.load(Ordering::SeqCst), 1);
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn close_drains_pending_deliveries() {
        let (_, sender, mut subscription) = counting_channel();

        sender.send(Ok(vec![]));
        sender.close();

        assert!(subscription.next_result().await.is_some());
        assert!(subscription.next_result().await.is_none());
    }

    #[tokio::test]
    async fn cancelled_stream_ends() {
        let (_, _sender, mut subscription) = counting_channel();

        subscription.cancel();

        assert!(subscription.next_result().await.is_none());
    }
}
