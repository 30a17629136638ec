//! Channel setup: plays the stream until a TVCT section identifies the channel.

use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::config::{DvrSettings, FrontendSettings};
use crate::constants::TABLE_ID_TVCT;
use crate::error::TunerError;
use crate::psi::parse_tvct;
use crate::tuner::{FilterCallback, FilterEvent, FilterSink, FilterType, Tuner};
use crate::types::ChannelIdentity;

#[derive(Debug, Clone, Serialize)]
pub struct ScanOutcome {
    pub channel:         Option<ChannelIdentity>,
    pub sections_seen:   u64,
    pub sections_failed: u64,
    pub elapsed_ms:      u64,
}

pub struct ChannelScanner {
    dvr:      DvrSettings,
    frontend: FrontendSettings,
    timeout:  Duration,
}

impl ChannelScanner {
    pub fn new(dvr: DvrSettings, frontend: FrontendSettings, timeout: Duration) -> Self {
        Self { dvr, frontend, timeout }
    }

    /// Returns the first channel that parses. Malformed sections are
    /// skipped; `channel` is `None` when the stream ends or `timeout`
    /// passes first. The tuner is closed on return.
    pub async fn scan(&self, tuner: &mut dyn Tuner) -> Result<ScanOutcome, TunerError> {
        let started = Instant::now();
        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Err(e) = self.start(tuner, tx) {
            tuner.close();
            return Err(e);
        }

        let mut seen = 0u64;
        let mut failed = 0u64;
        let search = async {
            while let Some(callback) = rx.recv().await {
                let FilterCallback::Events { events, .. } = callback else { continue };
                for event in events {
                    let FilterEvent::Section(section) = event else { continue };
                    if section.first() != Some(&TABLE_ID_TVCT) {
                        trace!("skipping non-TVCT section");
                        continue;
                    }
                    seen += 1;
                    match parse_tvct(&section) {
                        Ok(channel) => return Some(channel),
                        Err(e) => {
                            failed += 1;
                            debug!(error = %e, "skipping malformed TVCT section");
                        }
                    }
                }
            }
            None
        };
        let channel = tokio::time::timeout(self.timeout, search).await.unwrap_or_else(|_| {
            info!(timeout = ?self.timeout, "scan timed out");
            None
        });
        tuner.close();

        if let Some(channel) = &channel {
            info!(name = %channel.name, number = %channel.display_number(), "found channel");
        }
        Ok(ScanOutcome {
            channel,
            sections_seen: seen,
            sections_failed: failed,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn start(&self, tuner: &mut dyn Tuner, sink: FilterSink) -> Result<(), TunerError> {
        tuner.open_filter(FilterType::Section, sink)?;
        tuner.open_dvr_playback(&self.dvr)?;
        tuner.tune(&self.frontend)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::psi::tvct::fixture::tvct_section;

    struct SectionTuner {
        sections: Vec<Vec<u8>>,
        hold_open: bool,
        sink: Option<FilterSink>,
        fail_filter: bool,
        closed: bool,
    }

    impl SectionTuner {
        fn new(sections: Vec<Vec<u8>>, hold_open: bool) -> Self {
            Self { sections, hold_open, sink: None, fail_filter: false, closed: false }
        }
    }

    impl Tuner for SectionTuner {
        fn open_filter(&mut self, filter: FilterType, sink: FilterSink) -> Result<(), TunerError> {
            if self.fail_filter {
                return Err(TunerError::NoFilter(filter));
            }
            self.sink = Some(sink);
            Ok(())
        }

        fn open_dvr_playback(&mut self, _settings: &DvrSettings) -> Result<(), TunerError> {
            Ok(())
        }

        fn tune(&mut self, _settings: &FrontendSettings) -> Result<(), TunerError> {
            let sink = self.sink.take().ok_or(TunerError::NoFilter(FilterType::Section))?;
            for section in self.sections.drain(..) {
                let events = vec![FilterEvent::Section(Bytes::from(section))];
                let _ = sink.send(FilterCallback::Events { filter: FilterType::Section, events });
            }
            if self.hold_open {
                self.sink = Some(sink);
            }
            Ok(())
        }

        fn close(&mut self) {
            self.closed = true;
            self.sink = None;
        }
    }

    fn scanner(timeout_ms: u64) -> ChannelScanner {
        ChannelScanner::new(DvrSettings::default(), FrontendSettings::default(), Duration::from_millis(timeout_ms))
    }

    #[tokio::test]
    async fn test_skips_malformed_sections() {
        let mut wrong_count = tvct_section("BAD", 1, 1, &[]);
        wrong_count[9] = 2;
        let mut tuner = SectionTuner::new(
            vec![
                vec![0xC8, 0xF0, 0x01, 0x00],
                vec![0x00, 0xB0, 0x0D, 0, 1, 0xC1, 0, 0, 0, 0, 0, 0, 0],
                wrong_count,
                tvct_section("KQED", 9, 1, &[]),
                tvct_section("LATER", 2, 2, &[]),
            ],
            false,
        );
        let outcome = scanner(5_000).scan(&mut tuner).await.unwrap();
        let channel = outcome.channel.unwrap();
        assert_eq!(channel.display_number(), "9-1");
        assert_eq!(channel.name, "KQED");
        assert_eq!(outcome.sections_seen, 3);
        assert_eq!(outcome.sections_failed, 2);
        assert!(tuner.closed);
    }

    #[tokio::test]
    async fn test_stream_end_without_channel() {
        let mut tuner = SectionTuner::new(vec![vec![0xC8]], false);
        let outcome = scanner(5_000).scan(&mut tuner).await.unwrap();
        assert!(outcome.channel.is_none());
        assert_eq!(outcome.sections_failed, 1);
    }

    #[tokio::test]
    async fn test_timeout() {
        let mut tuner = SectionTuner::new(Vec::new(), true);
        let outcome = scanner(50).scan(&mut tuner).await.unwrap();
        assert!(outcome.channel.is_none());
        assert!(outcome.elapsed_ms >= 50);
        assert!(tuner.closed);
    }

    #[tokio::test]
    async fn test_filter_error_closes_tuner() {
        let mut tuner = SectionTuner::new(Vec::new(), false);
        tuner.fail_filter = true;
        assert!(matches!(scanner(50).scan(&mut tuner).await, Err(TunerError::NoFilter(FilterType::Section))));
        assert!(tuner.closed);
    }
}
