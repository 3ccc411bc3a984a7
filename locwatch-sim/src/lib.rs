mod platform;
mod script;

pub use platform::{PlaybackStats, ScriptedPlatform};
pub use script::{Script, ScriptStep};

pub mod prelude {
    pub use anyhow::{Context, anyhow, bail};
    pub type Result<T = (), E = anyhow::Error> = std::result::Result<T, E>;
}

pub use prelude::*;
