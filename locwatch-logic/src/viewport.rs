use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{
    location::{Coordinate, Fix, LocationComponent},
    observer::{LocationObserver, Observation},
    provider::LocationProvider,
    scheduler::Scheduler,
};

pub trait StateUpdateSender {
    fn send_update(&self);
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
/// How much of the map is visible, in degrees
pub struct Span {
    pub lat_delta: LocationComponent,
    pub long_delta: LocationComponent,
}

impl Span {
    pub const fn new(lat_delta: LocationComponent, long_delta: LocationComponent) -> Self {
        Self {
            lat_delta,
            long_delta,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
/// The region of the map being displayed
pub struct Viewport {
    pub center: Coordinate,
    pub span: Span,
}

impl Viewport {
    pub const DEFAULT_CENTER: Coordinate = Coordinate::new(37.3327, -122.0053);
    pub const DEFAULT_SPAN: Span = Span::new(0.05, 0.05);
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            center: Self::DEFAULT_CENTER,
            span: Self::DEFAULT_SPAN,
        }
    }
}

/// Observer that keeps a [Viewport] centered on the latest fix, and tells the UI whenever it
/// moves.
pub struct ViewportObserver<S: StateUpdateSender> {
    observation: Observation,
    viewport: RwLock<Viewport>,
    state_updates: S,
}

impl<S: StateUpdateSender + Send + Sync + 'static> ViewportObserver<S> {
    /// Create an observer with the default viewport and start observing right away
    pub fn new(
        provider: Arc<dyn LocationProvider>,
        scheduler: Arc<dyn Scheduler>,
        state_updates: S,
    ) -> Arc<Self> {
        Self::with_viewport(provider, scheduler, state_updates, Viewport::default())
    }

    pub fn with_viewport(
        provider: Arc<dyn LocationProvider>,
        scheduler: Arc<dyn Scheduler>,
        state_updates: S,
        viewport: Viewport,
    ) -> Arc<Self> {
        let observer = Arc::new(Self {
            observation: Observation::new(provider, scheduler),
            viewport: RwLock::new(viewport),
            state_updates,
        });
        observer.start_observing();
        observer
    }

    pub async fn viewport(&self) -> Viewport {
        *self.viewport.read().await
    }
}

impl<S: StateUpdateSender + Send + Sync + 'static> LocationObserver for ViewportObserver<S> {
    fn observation(&self) -> &Observation {
        &self.observation
    }

    async fn handle_location_update(&self, fix: Fix) {
        let mut viewport = self.viewport.write().await;
        viewport.center = fix.coordinate();
        debug!(
            "Viewport centered on ({}, {})",
            viewport.center.lat, viewport.center.long
        );
        drop(viewport);
        self.state_updates.send_update();
    }
}
