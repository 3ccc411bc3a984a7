use std::{path::Path, time::Duration};

use locwatch_logic::{AuthorizationState, Fix};
use serde::{Deserialize, Serialize};

use crate::prelude::*;

/// One thing the simulated platform does
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ScriptStep {
    /// Deliver a batch of fixes, oldest first
    Fixes(Vec<Fix>),
    /// The user (or device policy) changes the location permission
    Authorize(AuthorizationState),
    /// Pause playback
    Wait { millis: u64 },
}

fn default_interval_ms() -> u64 {
    500
}

/// What the simulated platform will do, in order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Script {
    /// Pause after every batch of fixes
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    pub steps: Vec<ScriptStep>,
}

impl Script {
    pub fn from_json(raw: &str) -> Result<Self> {
        let script: Self = serde_json::from_str(raw).context("Failed to parse script")?;
        script.validate()?;
        Ok(script)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("Invalid script {}", path.display()))
    }

    /// Make sure every fix is somewhere on Earth
    pub fn validate(&self) -> Result {
        if self.steps.is_empty() {
            bail!("Script has no steps");
        }

        for (i, step) in self.steps.iter().enumerate() {
            if let ScriptStep::Fixes(batch) = step {
                for fix in batch.iter() {
                    if !(-90.0..=90.0).contains(&fix.lat) || !(-180.0..=180.0).contains(&fix.long)
                    {
                        bail!(
                            "Step {i} has an out of range fix ({}, {})",
                            fix.lat,
                            fix.long
                        );
                    }
                }
            }
        }

        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn batch_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, ScriptStep::Fixes(_)))
            .count()
    }
}

impl Default for Script {
    /// A short walk heading south-west from the default viewport center
    fn default() -> Self {
        let walk = [
            (37.3327, -122.0053),
            (37.3321, -122.0061),
            (37.3314, -122.0070),
            (37.3308, -122.0082),
        ];

        let mut steps = walk
            .iter()
            .map(|&(lat, long)| ScriptStep::Fixes(vec![Fix::new(lat, long)]))
            .collect::<Vec<_>>();

        // Platforms coalesce fixes sometimes, exercises the batch policy
        steps.push(ScriptStep::Fixes(vec![
            Fix::new(37.3300, -122.0095),
            Fix::new(37.3297, -122.0101),
        ]));

        Self {
            interval_ms: default_interval_ms(),
            steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let script = Script::default();
        script.validate().expect("Default script is invalid");
        assert_eq!(script.batch_count(), 5);
    }

    #[test]
    fn test_from_json() {
        let raw = r#"{
            "steps": [
                { "Authorize": "AuthorizedForeground" },
                { "Fixes": [{ "lat": 37.33, "long": -122.01 }] },
                { "Wait": { "millis": 20 } }
            ]
        }"#;

        let script = Script::from_json(raw).expect("Failed to parse");

        assert_eq!(script.interval_ms, 500);
        assert_eq!(
            script.steps,
            vec![
                ScriptStep::Authorize(AuthorizationState::AuthorizedForeground),
                ScriptStep::Fixes(vec![Fix::new(37.33, -122.01)]),
                ScriptStep::Wait { millis: 20 },
            ]
        );
    }

    #[test]
    fn test_rejects_out_of_range() {
        let raw = r#"{ "steps": [{ "Fixes": [{ "lat": 91.0, "long": 0.0 }] }] }"#;
        assert!(Script::from_json(raw).is_err());
    }

    #[test]
    fn test_rejects_empty() {
        assert!(Script::from_json(r#"{ "steps": [] }"#).is_err());
    }
}
