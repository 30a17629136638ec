//! Playback session: owns the tuner, the decoder and the two pipeline
//! threads for one tuned channel.

use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{SessionError, TunerError};
use crate::pipeline::{DecodeLoop, DecoderFactory, FilterPump, MediaEventQueue, VideoDecoder};
use crate::stats::PipelineStats;
use crate::tuner::{FilterType, Tuner};
use crate::types::{SessionEvent, SessionState, Surface, UnavailableReason};

/// Capabilities a TV input host calls on a session.
pub trait TvInputSession {
    /// Starts playback of `channel_uri`. `false` if resources could not be
    /// acquired; the session is then released.
    fn on_tune(&mut self, channel_uri: &str) -> bool;

    /// Frees every resource. Safe to call more than once.
    fn on_release(&mut self);

    fn on_set_surface(&mut self, surface: Option<Surface>) -> bool;

    fn on_set_stream_volume(&mut self, volume: f32);

    fn on_set_caption_enabled(&mut self, enabled: bool);
}

/// Opens a fresh tuner for each tune.
pub type TunerFactory = Box<dyn FnMut() -> Result<Box<dyn Tuner>, TunerError> + Send>;

pub struct TunerSession {
    config:   SessionConfig,
    tuners:   TunerFactory,
    decoders: Arc<dyn DecoderFactory>,
    state:    SessionState,
    surface:  Option<Surface>,
    volume:   f32,
    captions: bool,
    stats:    Arc<PipelineStats>,
    notify:   UnboundedSender<SessionEvent>,
    events:   Option<UnboundedReceiver<SessionEvent>>,

    tuner:    Option<Box<dyn Tuner>>,
    decoder:  Option<Box<dyn VideoDecoder>>,
    queue:    Option<Arc<MediaEventQueue>>,
    pump:     Option<FilterPump>,
    decode:   Option<DecodeLoop>,
}

impl TunerSession {
    pub fn new(config: SessionConfig, tuners: TunerFactory, decoders: Arc<dyn DecoderFactory>) -> Self {
        let (notify, events) = mpsc::unbounded_channel();
        Self {
            config,
            tuners,
            decoders,
            state: SessionState::Idle,
            surface: None,
            volume: 1.0,
            captions: false,
            stats: Arc::new(PipelineStats::new()),
            notify,
            events: Some(events),
            tuner: None,
            decoder: None,
            queue: None,
            pump: None,
            decode: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn captions_enabled(&self) -> bool {
        self.captions
    }

    /// Hands out the host notification stream. Only the first call gets it.
    pub fn take_events(&mut self) -> Option<UnboundedReceiver<SessionEvent>> {
        self.events.take()
    }

    fn notify_unavailable(&self, reason: UnavailableReason) {
        let _ = self.notify.send(SessionEvent::VideoUnavailable(reason));
    }

    fn start(&mut self) -> Result<(), SessionError> {
        let format = &self.config.format;
        let mut decoder = self.decoders.create_decoder(&format.mime)?;
        let configured = decoder.configure(format, self.surface);
        self.decoder = Some(decoder);
        configured?;

        let mut tuner = (self.tuners)()?;
        let queue = Arc::new(MediaEventQueue::new(&self.config.pipeline));
        let (tx, rx) = mpsc::unbounded_channel();
        let opened = [FilterType::Audio, FilterType::Video, FilterType::Section]
            .into_iter()
            .try_for_each(|filter| tuner.open_filter(filter, tx.clone()))
            .and_then(|()| tuner.open_dvr_playback(&self.config.dvr));
        drop(tx);
        self.tuner = Some(tuner);
        self.queue = Some(Arc::clone(&queue));
        opened?;

        self.pump = Some(FilterPump::spawn(rx, Arc::clone(&queue), self.stats(), self.notify.clone())?);

        if let Some(tuner) = self.tuner.as_mut() {
            tuner.tune(&self.config.frontend)?;
        }
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.start()?;
        }
        let Some(decoder) = self.decoder.take() else {
            return Err(SessionError::InvalidState(self.state));
        };
        self.decode =
            Some(DecodeLoop::spawn(decoder, queue, self.config.pipeline.clone(), self.stats(), self.notify.clone())?);
        Ok(())
    }

    /// Releases decoder, filters, DVR and tuner, in that order.
    fn teardown(&mut self) {
        if let Some(mut decode) = self.decode.take() {
            if let Some(mut decoder) = decode.shutdown() {
                decoder.release();
            }
        }
        if let Some(mut decoder) = self.decoder.take() {
            decoder.release();
        }
        if let Some(queue) = self.queue.take() {
            queue.close();
        }
        if let Some(mut tuner) = self.tuner.take() {
            tuner.close();
        }
        if let Some(mut pump) = self.pump.take() {
            pump.join();
        }
    }
}

impl TvInputSession for TunerSession {
    fn on_tune(&mut self, channel_uri: &str) -> bool {
        info!(channel_uri, "tune");
        match self.state {
            SessionState::Released => {
                warn!("tune on released session");
                return false;
            }
            SessionState::Tuning | SessionState::Streaming => self.teardown(),
            SessionState::Idle => {}
        }

        self.state = SessionState::Tuning;
        self.notify_unavailable(UnavailableReason::Tuning);
        match self.start() {
            Ok(()) => {
                self.state = SessionState::Streaming;
                true
            }
            Err(e) => {
                warn!(error = %e, "tune failed");
                self.notify_unavailable(UnavailableReason::Unknown);
                self.on_release();
                false
            }
        }
    }

    fn on_release(&mut self) {
        if self.state == SessionState::Released {
            return;
        }
        debug!(state = ?self.state, "release");
        self.teardown();
        self.state = SessionState::Released;
    }

    fn on_set_surface(&mut self, surface: Option<Surface>) -> bool {
        debug!(?surface, "set surface");
        self.surface = surface;
        true
    }

    fn on_set_stream_volume(&mut self, volume: f32) {
        debug!(volume, "set stream volume");
        self.volume = volume.clamp(0.0, 1.0);
    }

    fn on_set_caption_enabled(&mut self, enabled: bool) {
        debug!(enabled, "set caption enabled");
        self.captions = enabled;
    }
}

impl Drop for TunerSession {
    fn drop(&mut self) {
        self.on_release();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::{Duration, Instant};

    use bytes::Bytes;
    use parking_lot::Mutex;

    use super::*;
    use crate::config::{DvrSettings, FrontendSettings, PipelineConfig};
    use crate::pipeline::mock::{MockBehavior, MockFactory};
    use crate::pipeline::{MediaBlockPool, MediaEvent};
    use crate::tuner::{FilterCallback, FilterEvent, FilterSink, FilterStatus};

    /// Delivers `frames` video events on tune and keeps its sinks until closed.
    struct ScriptedTuner {
        frames: u64,
        fail_tune: bool,
        pool: MediaBlockPool,
        sinks: Vec<(FilterType, FilterSink)>,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Tuner for ScriptedTuner {
        fn open_filter(&mut self, filter: FilterType, sink: FilterSink) -> Result<(), TunerError> {
            self.calls.lock().push("open_filter");
            self.sinks.push((filter, sink));
            Ok(())
        }

        fn open_dvr_playback(&mut self, _settings: &DvrSettings) -> Result<(), TunerError> {
            self.calls.lock().push("open_dvr");
            Ok(())
        }

        fn tune(&mut self, _settings: &FrontendSettings) -> Result<(), TunerError> {
            self.calls.lock().push("tune");
            if self.fail_tune {
                return Err(TunerError::InvalidSource("no signal".into()));
            }
            let Some((_, sink)) = self.sinks.iter().find(|(f, _)| *f == FilterType::Video) else {
                return Err(TunerError::NoFilter(FilterType::Video));
            };
            let events = (0..self.frames)
                .map(|pts| {
                    let block = self.pool.try_lease(Bytes::from_static(b"\x00\x00\x01\x65"));
                    FilterEvent::Media(MediaEvent::new(block, 4, 0, pts * 3003))
                })
                .collect();
            let _ = sink.send(FilterCallback::Events { filter: FilterType::Video, events });
            let _ = sink.send(FilterCallback::Status { filter: FilterType::Video, status: FilterStatus::DataReady });
            Ok(())
        }

        fn close(&mut self) {
            self.calls.lock().push("close");
            self.sinks.clear();
        }
    }

    fn session(
        frames: u64,
        fail_tune: bool,
        behavior: MockBehavior,
    ) -> (TunerSession, MediaBlockPool, Arc<Mutex<Vec<&'static str>>>, crate::pipeline::mock::MockLog) {
        let pool = MediaBlockPool::new(16);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let tuners: TunerFactory = {
            let pool = pool.clone();
            let calls = Arc::clone(&calls);
            Box::new(move || {
                Ok(Box::new(ScriptedTuner {
                    frames,
                    fail_tune,
                    pool: pool.clone(),
                    sinks: Vec::new(),
                    calls: Arc::clone(&calls),
                }) as Box<dyn Tuner>)
            })
        };
        let (factory, log) = MockFactory::new(behavior);
        let config = SessionConfig {
            pipeline: PipelineConfig { poll_interval: Duration::from_millis(5), ..PipelineConfig::default() },
            ..SessionConfig::default()
        };
        (TunerSession::new(config, tuners, Arc::new(factory)), pool, calls, log)
    }

    #[test]
    fn test_tune_streams_and_release_is_idempotent() {
        let (mut session, pool, calls, log) = session(5, false, MockBehavior::default());
        let mut events = session.take_events().unwrap();
        assert!(session.take_events().is_none());

        assert!(session.on_set_surface(Some(Surface(7))));
        assert!(session.on_tune("tv://channel/9-1"));
        assert_eq!(session.state(), SessionState::Streaming);
        assert!(log.started());

        let deadline = Instant::now() + Duration::from_secs(5);
        while session.stats().snapshot().frames_rendered < 5 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(session.stats().snapshot().frames_rendered, 5);

        session.on_release();
        session.on_release();
        assert_eq!(session.state(), SessionState::Released);
        assert_eq!(log.released(), 1);
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(calls.lock().iter().filter(|c| **c == "close").count(), 1);
        assert!(!session.on_tune("tv://channel/9-1"));

        assert_eq!(events.try_recv().unwrap(), SessionEvent::VideoUnavailable(UnavailableReason::Tuning));
        let mut available = 0;
        let mut ended = false;
        while let Ok(ev) = events.try_recv() {
            match ev {
                SessionEvent::VideoAvailable => available += 1,
                SessionEvent::StreamEnded => ended = true,
                _ => {}
            }
        }
        assert_eq!(available, 5);
        assert!(ended);
    }

    #[test]
    fn test_release_without_tune() {
        let (mut session, _pool, calls, log) = session(0, false, MockBehavior::default());
        session.on_release();
        session.on_release();
        assert_eq!(session.state(), SessionState::Released);
        assert!(calls.lock().is_empty());
        assert_eq!(log.released(), 0);
    }

    #[test]
    fn test_tune_failure_releases_everything() {
        let (mut session, _pool, calls, log) = session(0, true, MockBehavior::default());
        let mut events = session.take_events().unwrap();
        assert!(!session.on_tune("tv://channel/1-1"));
        assert_eq!(session.state(), SessionState::Released);
        assert_eq!(log.released(), 1, "configured decoder released");
        assert_eq!(calls.lock().last(), Some(&"close"));

        assert_eq!(events.try_recv().unwrap(), SessionEvent::VideoUnavailable(UnavailableReason::Tuning));
        assert_eq!(events.try_recv().unwrap(), SessionEvent::VideoUnavailable(UnavailableReason::Unknown));
    }

    #[test]
    fn test_no_decoder() {
        let (mut session, _pool, calls, _log) = session(0, false, MockBehavior::default());
        // the mock factory hands out a single decoder
        assert!(session.decoders.create_decoder("video/avc").is_ok());
        assert!(!session.on_tune("tv://channel/1-1"));
        assert!(calls.lock().is_empty(), "tuner never opened");
    }

    #[test]
    fn test_host_settings() {
        let (mut session, ..) = session(0, false, MockBehavior::default());
        session.on_set_stream_volume(1.5);
        session.on_set_caption_enabled(true);
        assert_eq!(session.volume(), 1.0);
        assert!(session.captions_enabled());
        assert!(session.on_set_surface(None));
    }
}
