use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
/// What the platform currently allows us to do with the user's location
pub enum AuthorizationState {
    /// The user hasn't been asked yet
    #[default]
    NotDetermined,
    /// The user said no
    Denied,
    /// Something other than the user (parental controls, device policy) said no
    Restricted,
    /// Location may be used while the app is in the foreground
    AuthorizedForeground,
    /// Location may be used at any time
    AuthorizedAlways,
}

impl AuthorizationState {
    /// Whether updates may be started in this state
    pub fn is_authorized(self) -> bool {
        matches!(self, Self::AuthorizedForeground | Self::AuthorizedAlways)
    }

    /// Whether access was refused, either by the user or by policy
    pub fn is_refused(self) -> bool {
        matches!(self, Self::Denied | Self::Restricted)
    }
}
