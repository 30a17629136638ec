use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::{DvrSettings, FrontendSettings, SessionConfig, SourceConfig, TunerConfig};
use crate::pipeline::{MediaBlockPool, ProbeDecoderFactory};
use crate::report::Reporter;
use crate::session::{TunerFactory, TunerSession, TvInputSession};
use crate::setup::ChannelScanner;
use crate::stats::{PipelineSnapshot, PipelineStats};
use crate::tuner::{SoftwareTuner, Tuner};
use crate::types::{ChannelIdentity, SessionEvent, Surface, VideoInfo};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ScanOptions {
    pub tuner:   TunerConfig,
    pub timeout: Duration,
}

pub struct PlayOptions {
    pub tuner:        TunerConfig,
    pub session:      SessionConfig,
    pub refresh_secs: u64,
    /// Stop after this long even if the stream continues.
    pub duration:     Option<Duration>,
}

/// Scans the source for a channel identity and prints the JSON outcome.
pub async fn run_scan(opts: ScanOptions) -> anyhow::Result<Option<ChannelIdentity>> {
    let mut tuner = SoftwareTuner::new(opts.tuner, Handle::current());
    let scanner = ChannelScanner::new(DvrSettings::default(), FrontendSettings::default(), opts.timeout);
    let outcome = scanner.scan(&mut tuner).await?;
    println!("{}", Reporter::to_json(&Reporter::scan(&outcome))?);
    Ok(outcome.channel)
}

/// Plays the source through a session until the stream ends, `duration`
/// passes or Ctrl-C. Prints a JSON snapshot every `refresh_secs`.
pub async fn run_play(opts: PlayOptions) -> anyhow::Result<PipelineSnapshot> {
    let pool_slot: Arc<Mutex<Option<MediaBlockPool>>> = Arc::new(Mutex::new(None));
    let tuners: TunerFactory = {
        let config = opts.tuner.clone();
        let handle = Handle::current();
        let pool_slot = Arc::clone(&pool_slot);
        Box::new(move || {
            let tuner = SoftwareTuner::new(config.clone(), handle.clone());
            *pool_slot.lock() = Some(tuner.pool());
            Ok(Box::new(tuner) as Box<dyn Tuner>)
        })
    };

    let mut session = TunerSession::new(opts.session, tuners, Arc::new(ProbeDecoderFactory));
    let mut events = session.take_events().context("session events already taken")?;
    session.on_set_surface(Some(Surface(1)));

    let uri = match &opts.tuner.source {
        SourceConfig::File(path) => format!("file://{}", path.display()),
        SourceConfig::Udp(addr) => format!("udp://{addr}"),
    };
    let (mut session, tuned) = tokio::task::spawn_blocking(move || {
        let ok = session.on_tune(&uri);
        (session, ok)
    })
    .await?;
    if !tuned {
        anyhow::bail!("failed to tune");
    }

    let stats = session.stats();
    let mut channel: Option<ChannelIdentity> = None;
    let mut video: Option<VideoInfo> = None;
    let mut ticker = tokio::time::interval(Duration::from_secs(opts.refresh_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;
    let deadline = opts.duration.map(|d| tokio::time::Instant::now() + d);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            ev = events.recv() => match ev {
                Some(SessionEvent::ChannelIdentified(c)) => {
                    if channel.as_ref() != Some(&c) {
                        info!(channel = %c, "now playing");
                        channel = Some(c);
                    }
                }
                Some(SessionEvent::FormatChanged(info)) => video = Some(info),
                Some(SessionEvent::VideoUnavailable(reason)) => debug!(?reason, "video unavailable"),
                Some(SessionEvent::VideoAvailable) => {}
                Some(SessionEvent::StreamEnded) | None => {
                    info!("stream ended");
                    wait_for_drain(&stats).await;
                    break;
                }
            },
            _ = ticker.tick() => {
                let pool = pool_slot.lock().clone();
                let report = Reporter::playback(
                    session.state(),
                    channel.as_ref(),
                    video.as_ref(),
                    stats.snapshot(),
                    pool.as_ref(),
                );
                println!("{}", Reporter::to_json(&report)?);
            },
            _ = sleep_until(deadline) => {
                info!("playback duration reached");
                break;
            },
            res = &mut ctrl_c => {
                if let Err(e) = res {
                    warn!(error = %e, "ctrl-c handler failed");
                }
                info!("interrupted");
                break;
            },
        }
    }

    let session = tokio::task::spawn_blocking(move || {
        session.on_release();
        session
    })
    .await?;

    let snapshot = stats.snapshot();
    let pool = pool_slot.lock().clone();
    let report = Reporter::playback(session.state(), channel.as_ref(), video.as_ref(), snapshot, pool.as_ref());
    println!("{}", Reporter::to_json(&report)?);
    Ok(snapshot)
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Gives the decode loop time to consume what the pump queued before the end.
async fn wait_for_drain(stats: &PipelineStats) {
    let started = Instant::now();
    while stats.snapshot().pending() > 0 {
        if started.elapsed() > DRAIN_TIMEOUT {
            warn!(pending = stats.snapshot().pending(), "decode queue did not drain");
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
