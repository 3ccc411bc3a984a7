use crate::{
    location::Fix,
    subscription::{FixStream, Listener, Subscription},
};

/// Something that owns a source of location fixes and fans them out to subscribers.
pub trait LocationProvider: Send + Sync {
    /// The most recent fix, if any have arrived yet
    fn current_fix(&self) -> Option<Fix>;
    /// Register `listener` to be called once for every fix published from now on
    fn subscribe(&self, listener: Listener) -> Subscription;
    /// Ask for permission to use the location, and start updates once we have it. Safe to call
    /// repeatedly.
    fn request_permission(&self);
    /// Get a live stream of fixes published from now on
    fn fix_stream(&self) -> FixStream {
        FixStream::new(|listener| self.subscribe(listener))
    }
}
