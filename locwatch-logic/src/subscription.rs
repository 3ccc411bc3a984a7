use std::{
    collections::HashMap,
    pin::Pin,
    sync::{Arc, Mutex, PoisonError, Weak},
    task::{Context as TaskContext, Poll},
};

use futures::Stream;
use log::debug;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::location::Fix;

pub type SubscriptionId = Uuid;

/// Callback run once for every published [Fix]
pub type Listener = Arc<dyn Fn(Fix) + Send + Sync>;

/// Fan-out of fixes to an explicit set of listeners.
///
/// Listeners only see fixes published after they subscribed, nothing is buffered for late
/// subscribers.
#[derive(Default)]
pub struct FixBroadcaster {
    listeners: Mutex<HashMap<SubscriptionId, Listener>>,
}

impl FixBroadcaster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a listener, it stays registered until the returned [Subscription] is dropped
    pub fn subscribe(self: &Arc<Self>, listener: Listener) -> Subscription {
        let id = Uuid::new_v4();
        self.lock().insert(id, listener);
        debug!("Subscription {id} registered");
        Subscription {
            id,
            broadcaster: Arc::downgrade(self),
        }
    }

    /// Hand `fix` to every current listener, returns how many listeners there were
    pub fn publish(&self, fix: Fix) -> usize {
        // Listeners run without the lock held so they're free to (un)subscribe
        let listeners = self.lock().values().cloned().collect::<Vec<_>>();
        for listener in listeners.iter() {
            listener(fix);
        }
        listeners.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn remove(&self, id: SubscriptionId) {
        if self.lock().remove(&id).is_some() {
            debug!("Subscription {id} released");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SubscriptionId, Listener>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A live registration with a [FixBroadcaster], dropping it unregisters the listener
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    broadcaster: Weak<FixBroadcaster>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Explicitly end this subscription, same as dropping it
    pub fn cancel(self) {}

    /// Whether the provider this subscription belongs to is still around
    pub fn is_live(&self) -> bool {
        self.broadcaster
            .upgrade()
            .is_some_and(|b| b.lock().contains_key(&self.id))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(broadcaster) = self.broadcaster.upgrade() {
            broadcaster.remove(self.id);
        }
    }
}

/// Live [Stream] of fixes from a provider. Never errors, only ends once the provider is gone.
pub struct FixStream {
    rx: mpsc::UnboundedReceiver<Fix>,
    _subscription: Subscription,
}

impl FixStream {
    pub(crate) fn new(subscribe: impl FnOnce(Listener) -> Subscription) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = subscribe(Arc::new(move |fix: Fix| {
            tx.send(fix).ok();
        }));
        Self {
            rx,
            _subscription: subscription,
        }
    }

    /// Wait for the next fix
    pub async fn next_fix(&mut self) -> Option<Fix> {
        self.rx.recv().await
    }

    /// Get the next fix if one was already published, without waiting
    pub fn try_next_fix(&mut self) -> Option<Fix> {
        self.rx.try_recv().ok()
    }
}

impl Stream for FixStream {
    type Item = Fix;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counting_listener() -> (Arc<AtomicUsize>, Listener) {
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let listener: Listener = Arc::new(move |_: Fix| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        (count, listener)
    }

    #[test]
    fn test_publish_fans_out() {
        let broadcaster = FixBroadcaster::new();
        let (a, la) = counting_listener();
        let (b, lb) = counting_listener();
        let _sa = broadcaster.subscribe(la);
        let _sb = broadcaster.subscribe(lb);

        assert_eq!(broadcaster.publish(Fix::new(1.0, 2.0)), 2);
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let broadcaster = FixBroadcaster::new();
        let (count, listener) = counting_listener();
        let sub = broadcaster.subscribe(listener);
        assert!(sub.is_live());
        sub.cancel();

        assert_eq!(broadcaster.subscriber_count(), 0);
        assert_eq!(broadcaster.publish(Fix::new(1.0, 2.0)), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_subscription_outlives_broadcaster() {
        let broadcaster = FixBroadcaster::new();
        let (_, listener) = counting_listener();
        let sub = broadcaster.subscribe(listener);
        drop(broadcaster);
        assert!(!sub.is_live());
        drop(sub);
    }

    #[tokio::test]
    async fn test_stream_ends_with_broadcaster() {
        let broadcaster = FixBroadcaster::new();
        let mut stream = FixStream::new(|l| broadcaster.subscribe(l));

        broadcaster.publish(Fix::new(5.0, 6.0));
        assert_eq!(stream.next_fix().await, Some(Fix::new(5.0, 6.0)));

        drop(broadcaster);
        assert_eq!(stream.next_fix().await, None);
    }
}
