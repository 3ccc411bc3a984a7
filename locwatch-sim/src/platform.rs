use std::sync::{
    Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use chrono::Utc;
use locwatch_logic::{AuthorizationState, Fix, LocationPlatform, PlatformEvent, PlatformEventTx};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    prelude::*,
    script::{Script, ScriptStep},
};

/// What happened while playing a [Script]
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaybackStats {
    /// Batches handed to the location manager
    pub batches_sent: usize,
    /// Batches thrown away because updates weren't started or access was revoked
    pub batches_dropped: usize,
}

/// [LocationPlatform] that plays fixes and permission changes from a [Script]
pub struct ScriptedPlatform {
    events: Mutex<Option<PlatformEventTx>>,
    answer: AuthorizationState,
    authorization: Mutex<AuthorizationState>,
    updating: AtomicBool,
    jitter: Option<f64>,
}

impl ScriptedPlatform {
    /// `answer` is what the simulated user picks when asked for permission
    pub fn new(
        events: PlatformEventTx,
        initial: AuthorizationState,
        answer: AuthorizationState,
    ) -> Self {
        Self {
            events: Mutex::new(Some(events)),
            answer,
            authorization: Mutex::new(initial),
            updating: AtomicBool::new(false),
            jitter: None,
        }
    }

    /// Randomly nudge every played fix by up to `degrees` on each axis
    pub fn with_jitter(mut self, degrees: f64) -> Self {
        self.jitter = Some(degrees.abs());
        self
    }

    pub fn is_updating(&self) -> bool {
        self.updating.load(Ordering::SeqCst)
    }

    /// Whether fixes would reach the manager right now
    pub fn is_delivering(&self) -> bool {
        self.is_updating() && self.authorization_state().is_authorized()
    }

    /// Close the event channel, the manager's main loop ends once it has handled everything
    /// sent before this
    pub fn finish(&self) {
        if self
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
        {
            debug!("Closed platform event channel");
        }
    }

    fn send(&self, event: PlatformEvent) -> Result {
        let guard = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(events) = guard.as_ref() else {
            bail!("Platform already finished");
        };
        events
            .send(event)
            .map_err(|_| anyhow!("Location manager stopped listening"))
    }

    fn set_authorization(&self, state: AuthorizationState) -> Result {
        *self
            .authorization
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = state;
        self.send(PlatformEvent::AuthorizationChanged(state))
    }

    fn prepare(&self, fix: Fix) -> Fix {
        let mut fix = match self.jitter {
            Some(j) if j > 0.0 => Fix {
                lat: (fix.lat + rand::random_range(-j..=j)).clamp(-90.0, 90.0),
                long: (fix.long + rand::random_range(-j..=j)).clamp(-180.0, 180.0),
                ..fix
            },
            _ => fix,
        };
        if fix.timestamp.is_none() {
            fix = fix.with_timestamp(Utc::now());
        }
        fix
    }

    /// Play every step of `script` in order
    pub async fn play(&self, script: &Script) -> Result<PlaybackStats> {
        let mut stats = PlaybackStats::default();

        for step in script.steps.iter() {
            match step {
                ScriptStep::Fixes(batch) => {
                    if self.is_delivering() {
                        let batch = batch.iter().map(|f| self.prepare(*f)).collect::<Vec<_>>();
                        debug!("Delivering batch of {} fix(es)", batch.len());
                        self.send(PlatformEvent::Locations(batch))?;
                        stats.batches_sent += 1;
                    } else {
                        warn!(
                            "Not delivering (access {:?}, updating {}), dropping {} fix(es)",
                            self.authorization_state(),
                            self.is_updating(),
                            batch.len()
                        );
                        stats.batches_dropped += 1;
                    }
                    tokio::time::sleep(script.interval()).await;
                }
                ScriptStep::Authorize(state) => {
                    info!("Platform authorization is now {state:?}");
                    self.set_authorization(*state)?;
                }
                ScriptStep::Wait { millis } => {
                    tokio::time::sleep(std::time::Duration::from_millis(*millis)).await;
                }
            }
        }

        Ok(stats)
    }
}

impl LocationPlatform for ScriptedPlatform {
    fn authorization_state(&self) -> AuthorizationState {
        *self
            .authorization
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn request_foreground_authorization(&self) -> Result {
        if self.authorization_state() != AuthorizationState::NotDetermined {
            return Ok(());
        }
        info!("Simulated user answered the permission prompt with {:?}", self.answer);
        self.set_authorization(self.answer)
    }

    fn start_updates(&self) -> Result {
        self.updating.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop_updates(&self) -> Result {
        self.updating.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use locwatch_logic::{PlatformEventRx, platform_channel};

    use super::*;

    fn mk_platform(answer: AuthorizationState) -> (ScriptedPlatform, PlatformEventRx) {
        let (tx, rx) = platform_channel();
        let platform = ScriptedPlatform::new(tx, AuthorizationState::NotDetermined, answer);
        (platform, rx)
    }

    /// Platform that has been granted access and started, with the grant already received
    fn mk_started_platform() -> (ScriptedPlatform, PlatformEventRx) {
        let (platform, mut rx) = mk_platform(AuthorizationState::AuthorizedForeground);
        platform
            .request_foreground_authorization()
            .expect("Failed to request");
        platform.start_updates().expect("Failed to start");
        assert_eq!(
            rx.try_recv().ok(),
            Some(PlatformEvent::AuthorizationChanged(
                AuthorizationState::AuthorizedForeground
            ))
        );
        (platform, rx)
    }

    fn batch_script() -> Script {
        Script {
            interval_ms: 100,
            steps: vec![
                ScriptStep::Fixes(vec![Fix::new(1.0, 2.0)]),
                ScriptStep::Fixes(vec![Fix::new(3.0, 4.0)]),
            ],
        }
    }

    #[test]
    fn test_permission_prompt_answered() {
        let (platform, mut rx) = mk_platform(AuthorizationState::Denied);

        platform
            .request_foreground_authorization()
            .expect("Failed to request");

        assert_eq!(platform.authorization_state(), AuthorizationState::Denied);
        assert_eq!(
            rx.try_recv().ok(),
            Some(PlatformEvent::AuthorizationChanged(AuthorizationState::Denied))
        );

        // Already answered, asking again does nothing
        platform
            .request_foreground_authorization()
            .expect("Failed to request");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drops_batches_until_started() {
        let (platform, mut rx) = mk_platform(AuthorizationState::AuthorizedForeground);

        let stats = platform.play(&batch_script()).await.expect("Failed to play");
        assert_eq!(
            stats,
            PlaybackStats {
                batches_sent: 0,
                batches_dropped: 2
            }
        );
        assert!(rx.try_recv().is_err());

        platform.start_updates().expect("Failed to start");
        let stats = platform.play(&batch_script()).await.expect("Failed to play");
        assert_eq!(stats.batches_dropped, 2, "Delivered without access");

        platform
            .request_foreground_authorization()
            .expect("Failed to request");
        rx.try_recv().expect("No grant event");
        let stats = platform.play(&batch_script()).await.expect("Failed to play");
        assert_eq!(stats.batches_sent, 2);

        match rx.try_recv() {
            Ok(PlatformEvent::Locations(batch)) => {
                assert_eq!(batch.len(), 1);
                assert_eq!(batch[0].coordinate(), Fix::new(1.0, 2.0).coordinate());
                assert!(batch[0].timestamp.is_some(), "Fix wasn't timestamped");
            }
            other => panic!("Expected a batch, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_jitter_stays_close() {
        let (platform, mut rx) = mk_started_platform();
        let platform = platform.with_jitter(0.001);

        platform.play(&batch_script()).await.expect("Failed to play");

        while let Ok(PlatformEvent::Locations(batch)) = rx.try_recv() {
            for fix in batch {
                let lat_ok = (fix.lat - 1.0).abs() <= 0.001 || (fix.lat - 3.0).abs() <= 0.001;
                assert!(lat_ok, "Jittered too far: {fix:?}");
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_errors_without_manager() {
        let (platform, rx) = mk_started_platform();
        drop(rx);
        assert!(platform.play(&batch_script()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drops_batches_while_refused() {
        let (platform, mut rx) = mk_started_platform();

        let script = Script {
            interval_ms: 100,
            steps: vec![
                ScriptStep::Authorize(AuthorizationState::Denied),
                ScriptStep::Fixes(vec![Fix::new(1.0, 2.0)]),
                ScriptStep::Authorize(AuthorizationState::AuthorizedForeground),
                ScriptStep::Fixes(vec![Fix::new(3.0, 4.0)]),
            ],
        };

        let stats = platform.play(&script).await.expect("Failed to play");
        assert_eq!(
            stats,
            PlaybackStats {
                batches_sent: 1,
                batches_dropped: 1
            }
        );

        assert_eq!(
            rx.try_recv().ok(),
            Some(PlatformEvent::AuthorizationChanged(AuthorizationState::Denied))
        );
        assert_eq!(
            rx.try_recv().ok(),
            Some(PlatformEvent::AuthorizationChanged(
                AuthorizationState::AuthorizedForeground
            ))
        );
        match rx.try_recv() {
            Ok(PlatformEvent::Locations(batch)) => {
                assert_eq!(batch[0].coordinate(), Fix::new(3.0, 4.0).coordinate());
            }
            other => panic!("Expected the second batch, got {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_closes_channel() {
        let (platform, mut rx) = mk_started_platform();
        platform.play(&batch_script()).await.expect("Failed to play");

        platform.finish();
        platform.finish();

        let mut received = 0;
        while let Some(event) = rx.recv().await {
            if matches!(event, PlatformEvent::Locations(_)) {
                received += 1;
            }
        }
        assert_eq!(received, 2, "Events sent before finishing were lost");
        assert!(platform.play(&batch_script()).await.is_err());
    }
}
