use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;
use tokio_util::sync::CancellationToken;

use crate::{
    location::Fix, provider::LocationProvider, scheduler::Scheduler, subscription::Subscription,
};

struct ActiveSubscription {
    _subscription: Subscription,
    cancel: CancellationToken,
}

/// The plumbing every [LocationObserver] carries: where fixes come from, where handlers run, and
/// the subscription that's currently active (if any).
pub struct Observation {
    provider: Arc<dyn LocationProvider>,
    scheduler: Arc<dyn Scheduler>,
    active: Mutex<Option<ActiveSubscription>>,
}

impl Observation {
    pub fn new(provider: Arc<dyn LocationProvider>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            provider,
            scheduler,
            active: Mutex::new(None),
        }
    }

    pub fn provider(&self) -> &Arc<dyn LocationProvider> {
        &self.provider
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    pub fn is_active(&self) -> bool {
        self.lock().is_some()
    }

    fn replace(&self, subscription: Subscription, cancel: CancellationToken) {
        let prev = self.lock().replace(ActiveSubscription {
            _subscription: subscription,
            cancel,
        });
        if let Some(prev) = prev {
            debug!("Replacing existing location subscription");
            prev.cancel.cancel();
        }
    }

    fn release(&self) -> bool {
        let prev = self.lock().take();
        if let Some(prev) = prev {
            prev.cancel.cancel();
            true
        } else {
            false
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActiveSubscription>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Observation {
    fn drop(&mut self) {
        self.release();
    }
}

/// Something that reacts to new location fixes.
///
/// Implementors provide [LocationObserver::handle_location_update] and access to their
/// [Observation], subscribing and unsubscribing is handled here.
pub trait LocationObserver: Send + Sync + 'static {
    fn observation(&self) -> &Observation;

    /// React to a new fix
    fn handle_location_update(&self, fix: Fix) -> impl Future<Output = ()> + Send;

    /// Subscribe to the provider, every fix published from now on is passed to
    /// [LocationObserver::handle_location_update] on the observation's scheduler, one at a time
    /// and in publish order. Calling this again replaces the previous subscription.
    fn start_observing(self: &Arc<Self>) {
        let observation = self.observation();
        let observer = Arc::downgrade(self);
        let scheduler = observation.scheduler().serial();
        let cancel = CancellationToken::new();

        let listener_cancel = cancel.clone();
        let subscription = observation.provider().subscribe(Arc::new(move |fix: Fix| {
            if listener_cancel.is_cancelled() {
                return;
            }
            // Observer is gone, the subscription goes with it
            let Some(observer) = observer.upgrade() else {
                return;
            };
            let cancel = listener_cancel.clone();
            scheduler.schedule(Box::pin(async move {
                if !cancel.is_cancelled() {
                    observer.handle_location_update(fix).await;
                }
            }));
        }));

        observation.replace(subscription, cancel);
    }

    /// Cancel the active subscription, returns whether there was one
    fn stop_observing(&self) -> bool {
        self.observation().release()
    }

    fn is_observing(&self) -> bool {
        self.observation().is_active()
    }

    /// Pass the provider's latest fix to [LocationObserver::handle_location_update], does nothing
    /// if there isn't one yet.
    fn request_current_fix(&self) -> impl Future<Output = ()> + Send {
        let current = self.observation().provider().current_fix();
        async move {
            if let Some(fix) = current {
                self.handle_location_update(fix).await;
            }
        }
    }
}
