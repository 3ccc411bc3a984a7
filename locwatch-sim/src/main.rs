use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{Parser, ValueEnum};
use locwatch_logic::{
    AuthorizationState, BatchPolicy, Fix, LocationManager, LocationProvider, ProviderSettings,
    StateUpdateSender, TokioScheduler, Viewport, ViewportObserver, platform_channel,
};
use locwatch_sim::{PlaybackStats, Script, ScriptedPlatform, prelude::*};
use log::{LevelFilter, info, warn};
use serde::Serialize;
use tokio::sync::{mpsc, watch};

#[derive(Parser)]
#[command(version, about)]
/// Drive a location manager and a viewport observer from a scripted platform
struct Cli {
    /// JSON script to play, a short walk is played when not given
    #[arg(long)]
    script: Option<PathBuf>,

    /// How the simulated user answers the permission prompt
    #[arg(long, value_enum, default_value_t = Answer::Granted)]
    answer: Answer,

    /// What to do with batches of more than one fix
    #[arg(long, value_enum, default_value_t = BatchPolicyValue::First)]
    batch_policy: BatchPolicyValue,

    /// Pause between batches, overrides the script's value
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Randomly nudge fixes by up to this many degrees
    #[arg(long)]
    jitter: Option<f64>,

    /// How much to log
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum Answer {
    /// Allow while using the app
    Granted,
    /// Allow always
    Always,
    Denied,
    Restricted,
}

impl From<Answer> for AuthorizationState {
    fn from(value: Answer) -> Self {
        match value {
            Answer::Granted => AuthorizationState::AuthorizedForeground,
            Answer::Always => AuthorizationState::AuthorizedAlways,
            Answer::Denied => AuthorizationState::Denied,
            Answer::Restricted => AuthorizationState::Restricted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum BatchPolicyValue {
    First,
    Last,
    All,
}

impl From<BatchPolicyValue> for BatchPolicy {
    fn from(value: BatchPolicyValue) -> Self {
        match value {
            BatchPolicyValue::First => BatchPolicy::First,
            BatchPolicyValue::Last => BatchPolicy::Last,
            BatchPolicyValue::All => BatchPolicy::All,
        }
    }
}

const PERMISSION_TIMEOUT: Duration = Duration::from_secs(5);
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

struct UpdateSender(mpsc::Sender<()>);

impl StateUpdateSender for UpdateSender {
    fn send_update(&self) {
        // A full queue already means "go re-read the viewport"
        self.0.try_send(()).ok();
    }
}

#[derive(Serialize)]
struct Report {
    viewport: Viewport,
    authorization: AuthorizationState,
    last_fix: Option<Fix>,
    playback: PlaybackStats,
}

async fn watch_authorization(mut changes: watch::Receiver<AuthorizationState>) {
    while changes.changed().await.is_ok() {
        let state = *changes.borrow_and_update();
        if state.is_refused() {
            warn!("Location access is {state:?}, the viewport won't follow you");
        }
    }
}

#[tokio::main]
async fn main() -> Result {
    let cli = Cli::parse();

    let mut logger = colog::default_builder();
    logger.filter_level(cli.log_level.into());
    logger.init();

    let mut script = match cli.script.as_deref() {
        Some(path) => Script::load(path)?,
        None => Script::default(),
    };

    if let Some(interval_ms) = cli.interval_ms {
        script.interval_ms = interval_ms;
    }

    if cli.jitter.is_some_and(|j| !j.is_finite()) {
        bail!("Jitter must be a finite number of degrees");
    }

    let settings = ProviderSettings {
        batch_policy: cli.batch_policy.into(),
    };

    let (events_tx, events_rx) = platform_channel();
    let mut platform =
        ScriptedPlatform::new(events_tx, AuthorizationState::NotDetermined, cli.answer.into());
    if let Some(jitter) = cli.jitter {
        platform = platform.with_jitter(jitter);
    }

    let manager = Arc::new(LocationManager::new(platform, settings));
    let scheduler = Arc::new(TokioScheduler::current()?);
    let (update_tx, mut update_rx) = mpsc::channel(1);
    let observer = ViewportObserver::new(manager.clone(), scheduler, UpdateSender(update_tx));

    let main_loop = tokio::spawn({
        let manager = manager.clone();
        async move { manager.main_loop(events_rx).await }
    });
    let auth_watch = tokio::spawn(watch_authorization(manager.authorization_changes()));

    info!(
        "Playing {} batch(es) with {:?} batch policy",
        script.batch_count(),
        manager.settings().batch_policy
    );

    let mut changes = manager.authorization_changes();
    manager.request_permission();
    tokio::time::timeout(
        PERMISSION_TIMEOUT,
        changes.wait_for(|state| *state != AuthorizationState::NotDetermined),
    )
    .await
    .context("Timed out waiting for the permission prompt")?
    .context("Location manager stopped")?;

    let playback = manager.platform().play(&script);
    tokio::pin!(playback);

    let stats = loop {
        tokio::select! {
            res = &mut playback => break res.context("Playback failed")?,
            Some(()) = update_rx.recv() => {
                let viewport = observer.viewport().await;
                info!(
                    "Viewport centered on ({:.5}, {:.5})",
                    viewport.center.lat, viewport.center.long
                );
            }
        }
    };

    // Main loop ends once it has handled every event played
    manager.platform().finish();
    main_loop
        .await
        .context("Location manager panicked")?
        .context("Location manager failed")?;
    auth_watch.abort();

    // The observer handles fixes in order, it's done once it's on the last one
    if let Some(last) = manager.current_fix().map(|fix| fix.coordinate()) {
        tokio::time::timeout(SETTLE_TIMEOUT, async {
            while observer.viewport().await.center != last {
                if update_rx.recv().await.is_none() {
                    break;
                }
            }
        })
        .await
        .context("Timed out waiting for the viewport to catch up")?;
    }

    let report = Report {
        viewport: observer.viewport().await,
        authorization: manager.authorization_state(),
        last_fix: manager.current_fix(),
        playback: stats,
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to encode report")?
    );

    Ok(())
}
