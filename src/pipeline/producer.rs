//! Producer side: drains tuner filter callbacks into the media queue.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, trace, warn};

use super::{MediaEventQueue, PushOutcome};
use crate::constants::TABLE_ID_TVCT;
use crate::error::SessionError;
use crate::psi::parse_tvct;
use crate::stats::PipelineStats;
use crate::tuner::{FilterCallback, FilterEvent, FilterStatus, FilterType};
use crate::types::SessionEvent;

/// Callback thread for one session's filters.
///
/// Exits when every sender of the filter channel has been dropped, which
/// happens when the tuner closes.
pub struct FilterPump {
    thread: Option<JoinHandle<()>>,
}

impl FilterPump {
    pub fn spawn(
        rx: UnboundedReceiver<FilterCallback>,
        queue: Arc<MediaEventQueue>,
        stats: Arc<PipelineStats>,
        notify: UnboundedSender<SessionEvent>,
    ) -> Result<Self, SessionError> {
        let thread = thread::Builder::new()
            .name("tuner-filter".to_string())
            .spawn(move || pump(rx, &queue, &stats, &notify))
            .map_err(|source| SessionError::Spawn { name: "filter", source })?;
        Ok(Self { thread: Some(thread) })
    }

    /// Waits for the callback thread to drain. Call after the tuner is closed.
    pub fn join(&mut self) {
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!("filter thread panicked");
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

fn pump(
    mut rx: UnboundedReceiver<FilterCallback>,
    queue: &MediaEventQueue,
    stats: &PipelineStats,
    notify: &UnboundedSender<SessionEvent>,
) {
    while let Some(callback) = rx.blocking_recv() {
        match callback {
            FilterCallback::Events { filter, events } => {
                for event in events {
                    on_filter_event(filter, event, queue, stats, notify);
                }
            }
            FilterCallback::Status { filter: FilterType::Video, status: FilterStatus::DataReady } => {
                if !queue.is_data_ready() {
                    debug!("video filter data ready");
                }
                queue.set_data_ready();
            }
            FilterCallback::Status { filter, status } => trace!(?filter, ?status, "filter status"),
        }
    }
    debug!("filter channel closed");
    let _ = notify.send(SessionEvent::StreamEnded);
}

fn on_filter_event(
    filter: FilterType,
    event: FilterEvent,
    queue: &MediaEventQueue,
    stats: &PipelineStats,
    notify: &UnboundedSender<SessionEvent>,
) {
    match (filter, event) {
        (FilterType::Video, FilterEvent::Media(media)) => match queue.push(media) {
            PushOutcome::Queued => stats.record_queued(),
            PushOutcome::Evicted => {
                stats.record_queued();
                stats.record_evicted();
            }
            PushOutcome::Closed => trace!("queue closed, dropping media event"),
        },
        (FilterType::Section, FilterEvent::Section(section)) => on_section(&section, stats, notify),
        (filter, FilterEvent::Media(media)) => {
            // audio is not decoded
            trace!(?filter, pts = media.pts(), "releasing media event");
            media.release();
        }
        (filter, FilterEvent::Section(_)) => trace!(?filter, "ignoring section on non-section filter"),
    }
}

fn on_section(section: &[u8], stats: &PipelineStats, notify: &UnboundedSender<SessionEvent>) {
    if section.first() != Some(&TABLE_ID_TVCT) {
        trace!(table_id = section.first().copied(), "ignoring non-TVCT section");
        return;
    }
    match parse_tvct(section) {
        Ok(channel) => {
            stats.record_section_parsed();
            info!(name = %channel.name, number = %channel.display_number(), "channel identified");
            let _ = notify.send(SessionEvent::ChannelIdentified(channel));
        }
        Err(e) => {
            stats.record_section_failed();
            debug!(error = %e, "dropping TVCT section");
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tokio::sync::mpsc;

    use super::*;
    use crate::config::PipelineConfig;
    use crate::pipeline::{MediaBlockPool, MediaEvent, QueuePoll};
    use crate::psi::tvct::fixture::tvct_section;
    use crate::types::ChannelIdentity;

    #[test]
    fn test_pump_routes_filter_output() {
        let pool = MediaBlockPool::new(8);
        let queue = Arc::new(MediaEventQueue::new(&PipelineConfig::default()));
        let stats = Arc::new(PipelineStats::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let (notify, mut events) = mpsc::unbounded_channel();
        let mut pump = FilterPump::spawn(rx, Arc::clone(&queue), Arc::clone(&stats), notify).unwrap();

        let media = |pts| MediaEvent::new(pool.try_lease(Bytes::from_static(b"au")), 2, 0, pts);
        tx.send(FilterCallback::Events {
            filter: FilterType::Section,
            events: vec![
                FilterEvent::Section(Bytes::from(tvct_section("KQED", 9, 1, &[]))),
                FilterEvent::Section(Bytes::from_static(&[0xC8, 0x00])),
                FilterEvent::Section(Bytes::from_static(&[0x00, 0xB0, 0x0D])),
            ],
        })
        .unwrap();
        tx.send(FilterCallback::Events { filter: FilterType::Video, events: vec![FilterEvent::Media(media(1))] })
            .unwrap();
        tx.send(FilterCallback::Events { filter: FilterType::Audio, events: vec![FilterEvent::Media(media(2))] })
            .unwrap();
        tx.send(FilterCallback::Status { filter: FilterType::Audio, status: FilterStatus::DataReady }).unwrap();
        drop(tx);
        pump.join();
        assert!(pump.is_finished());

        assert!(matches!(queue.poll(), QueuePoll::NotReady));
        assert_eq!(queue.len(), 1);
        assert_eq!(pool.outstanding(), 1, "audio event released");

        let snap = stats.snapshot();
        assert_eq!((snap.sections_parsed, snap.sections_failed, snap.queued), (1, 1, 1));

        let expected = ChannelIdentity { name: "KQED".into(), major_number: 9, minor_number: 1 };
        assert_eq!(events.try_recv().unwrap(), SessionEvent::ChannelIdentified(expected));
        assert_eq!(events.try_recv().unwrap(), SessionEvent::StreamEnded);
    }

    #[test]
    fn test_video_data_ready() {
        let queue = Arc::new(MediaEventQueue::new(&PipelineConfig::default()));
        let (tx, rx) = mpsc::unbounded_channel();
        let (notify, _events) = mpsc::unbounded_channel();
        let mut pump = FilterPump::spawn(rx, Arc::clone(&queue), Arc::new(PipelineStats::new()), notify).unwrap();
        tx.send(FilterCallback::Status { filter: FilterType::Video, status: FilterStatus::DataReady }).unwrap();
        drop(tx);
        pump.join();
        assert!(queue.is_data_ready());
    }
}
