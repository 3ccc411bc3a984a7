use tokio::sync::mpsc;

use crate::{authorization::AuthorizationState, location::Fix, prelude::*};

/// A raw delivery from the platform's location service
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformEvent {
    /// One batch of fixes, oldest first. Platforms may coalesce several fixes into a batch
    Locations(Vec<Fix>),
    /// The user or the system changed what we're allowed to do
    AuthorizationChanged(AuthorizationState),
}

pub type PlatformEventTx = mpsc::UnboundedSender<PlatformEvent>;
pub type PlatformEventRx = mpsc::UnboundedReceiver<PlatformEvent>;

/// Create the channel a platform uses to hand its callbacks over to a
/// [crate::LocationManager]. The platform keeps the sender, the manager's main loop drains the
/// receiver.
pub fn platform_channel() -> (PlatformEventTx, PlatformEventRx) {
    mpsc::unbounded_channel()
}

/// The platform's location service. Calls into here are requests, the results (new fixes,
/// permission answers) come back later as [PlatformEvent]s.
pub trait LocationPlatform: Send + Sync {
    /// Get the authorization state as the platform currently sees it
    fn authorization_state(&self) -> AuthorizationState;
    /// Ask the user for permission to use their location while the app is in the foreground
    fn request_foreground_authorization(&self) -> Result;
    /// Begin delivering [PlatformEvent::Locations]
    fn start_updates(&self) -> Result;
    /// Stop delivering [PlatformEvent::Locations]
    fn stop_updates(&self) -> Result {
        Ok(())
    }
}
