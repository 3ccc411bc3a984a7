mod authorization;
mod location;
mod manager;
mod observer;
mod platform;
mod provider;
mod scheduler;
mod settings;
mod subscription;
mod viewport;

pub use authorization::AuthorizationState;
pub use location::{Coordinate, Fix, LocationComponent, UtcDT};
pub use manager::LocationManager;
pub use observer::{LocationObserver, Observation};
pub use platform::{
    LocationPlatform, PlatformEvent, PlatformEventRx, PlatformEventTx, platform_channel,
};
pub use provider::LocationProvider;
pub use scheduler::{InlineScheduler, Scheduler, SerialScheduler, Task, TokioScheduler};
pub use settings::{BatchPolicy, ProviderSettings};
pub use subscription::{FixBroadcaster, FixStream, Listener, Subscription, SubscriptionId};
pub use viewport::{Span, StateUpdateSender, Viewport, ViewportObserver};

pub mod prelude {
    use anyhow::Error as AnyhowError;
    use std::result::Result as StdResult;
    pub type Result<T = (), E = AnyhowError> = StdResult<T, E>;
    pub use anyhow::Context;
}
