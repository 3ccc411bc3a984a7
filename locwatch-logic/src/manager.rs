use std::sync::{Arc, Mutex, PoisonError, RwLock};

use log::{debug, error, info, warn};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{
    authorization::AuthorizationState,
    location::Fix,
    platform::{LocationPlatform, PlatformEvent, PlatformEventRx},
    prelude::*,
    provider::LocationProvider,
    settings::ProviderSettings,
    subscription::{FixBroadcaster, Listener, Subscription},
};

#[derive(Default)]
struct ManagerState {
    current: Option<Fix>,
    updating: bool,
    permission_requested: bool,
}

/// [LocationProvider] backed by a [LocationPlatform].
///
/// Platform callbacks arrive as [PlatformEvent]s, either fed directly through
/// [LocationManager::handle_platform_event] or drained from a channel by
/// [LocationManager::main_loop]. Either way all publishing happens on the caller's context.
pub struct LocationManager<P: LocationPlatform> {
    platform: P,
    settings: ProviderSettings,
    state: RwLock<ManagerState>,
    broadcaster: Arc<FixBroadcaster>,
    authorization: watch::Sender<AuthorizationState>,
    cancel: Mutex<CancellationToken>,
}

impl<P: LocationPlatform> LocationManager<P> {
    /// Create a new manager, if the platform already has permission, updates start right away
    pub fn new(platform: P, settings: ProviderSettings) -> Self {
        let initial = platform.authorization_state();
        let (authorization, _) = watch::channel(initial);

        let manager = Self {
            platform,
            settings,
            state: RwLock::new(ManagerState::default()),
            broadcaster: FixBroadcaster::new(),
            authorization,
            cancel: Mutex::new(CancellationToken::new()),
        };

        debug!("Location manager created with authorization {initial:?}");

        if initial.is_authorized() {
            manager.start_updates_if_needed();
        }

        manager
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    pub fn authorization_state(&self) -> AuthorizationState {
        *self.authorization.borrow()
    }

    /// Watch authorization changes, this is how a caller finds out the user denied access
    pub fn authorization_changes(&self) -> watch::Receiver<AuthorizationState> {
        self.authorization.subscribe()
    }

    /// Whether we've asked the platform to start delivering fixes
    pub fn is_updating(&self) -> bool {
        self.read_state().updating
    }

    pub fn subscriber_count(&self) -> usize {
        self.broadcaster.subscriber_count()
    }

    /// Handle one callback from the platform
    pub fn handle_platform_event(&self, event: PlatformEvent) {
        match event {
            PlatformEvent::Locations(batch) => self.handle_locations(batch),
            PlatformEvent::AuthorizationChanged(state) => self.handle_authorization_change(state),
        }
    }

    fn handle_locations(&self, batch: Vec<Fix>) {
        let batch_len = batch.len();
        let fixes = self.settings.batch_policy.select(batch);

        if fixes.is_empty() {
            debug!("Ignoring empty location batch");
            return;
        }

        if batch_len > fixes.len() {
            debug!(
                "Dropped {} of {batch_len} fixes in batch",
                batch_len - fixes.len()
            );
        }

        for fix in fixes {
            self.write_state().current = Some(fix);
            let delivered = self.broadcaster.publish(fix);
            debug!(
                "Published fix ({}, {}) to {delivered} subscriber(s)",
                fix.lat, fix.long
            );
        }
    }

    fn handle_authorization_change(&self, state: AuthorizationState) {
        info!(
            "Location authorization changed from {:?} to {state:?}",
            self.authorization_state()
        );

        if state.is_authorized() {
            self.start_updates_if_needed();
        } else if state.is_refused() {
            // Nothing is stopped or retried, callers can react via authorization_changes
            warn!("Location access is {state:?}, no fixes will be delivered");
        }

        // Watchers only hear about a grant once updates are running
        self.authorization.send_replace(state);
    }

    fn start_updates_if_needed(&self) {
        let mut state = self.write_state();
        if state.updating {
            return;
        }
        match self.platform.start_updates() {
            Ok(()) => {
                state.updating = true;
                info!("Started location updates");
            }
            Err(why) => error!("Failed to start location updates: {why:?}"),
        }
    }

    fn stop_updates_if_running(&self) {
        let mut state = self.write_state();
        if !state.updating {
            return;
        }
        state.updating = false;
        if let Err(why) = self.platform.stop_updates() {
            error!("Failed to stop location updates: {why:?}");
        } else {
            info!("Stopped location updates");
        }
    }

    /// Stop [LocationManager::main_loop], if it isn't running yet it stops as soon as it starts
    pub fn shutdown(&self) {
        self.cancel_token().cancel();
    }

    fn cancel_token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drain platform events until [LocationManager::shutdown] is called or every sender is gone.
    /// Updates are stopped on the way out, and the loop can be started again afterwards.
    pub async fn main_loop(&self, mut events: PlatformEventRx) -> Result {
        let cancel = self.cancel_token();

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("Location manager shutting down");
                    break;
                }

                event = events.recv() => {
                    match event {
                        Some(event) => self.handle_platform_event(event),
                        None => {
                            debug!("Platform event channel closed");
                            break;
                        }
                    }
                }
            }
        }

        self.stop_updates_if_running();

        {
            let mut current = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
            if current.is_cancelled() {
                *current = CancellationToken::new();
            }
        }

        Ok(())
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, ManagerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, ManagerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<P: LocationPlatform> LocationProvider for LocationManager<P> {
    fn current_fix(&self) -> Option<Fix> {
        self.read_state().current
    }

    fn subscribe(&self, listener: Listener) -> Subscription {
        self.broadcaster.subscribe(listener)
    }

    fn request_permission(&self) {
        let auth = self.authorization_state();
        match auth {
            AuthorizationState::NotDetermined => {
                let mut state = self.write_state();
                if state.permission_requested {
                    debug!("Location permission already requested, waiting on answer");
                    return;
                }
                match self.platform.request_foreground_authorization() {
                    Ok(()) => {
                        state.permission_requested = true;
                        info!("Requested foreground location permission");
                    }
                    Err(why) => error!("Failed to request location permission: {why:?}"),
                }
            }
            auth if auth.is_authorized() => self.start_updates_if_needed(),
            _ => {
                debug!("Not requesting location permission, access is {auth:?}");
            }
        }
    }
}
