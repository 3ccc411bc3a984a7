use serde::{Deserialize, Serialize};

use crate::location::Fix;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
/// What to do when the platform hands over more than one fix at once
pub enum BatchPolicy {
    /// Publish only the first fix of the batch
    #[default]
    First,
    /// Publish only the last (newest) fix of the batch
    Last,
    /// Publish every fix in the batch, in order
    All,
}

impl BatchPolicy {
    /// Pick the fixes of `batch` that should be published
    pub fn select(self, batch: Vec<Fix>) -> Vec<Fix> {
        match self {
            BatchPolicy::First => batch.into_iter().take(1).collect(),
            BatchPolicy::Last => batch.into_iter().last().into_iter().collect(),
            BatchPolicy::All => batch,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// Settings for a [crate::LocationManager]
pub struct ProviderSettings {
    /// How to reduce a batch of fixes from the platform
    #[serde(default)]
    pub batch_policy: BatchPolicy,
}
