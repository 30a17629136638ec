//! Decode loop on a dedicated thread.
//!
//! Polls the [`MediaEventQueue`], copies each event's payload into a
//! decoder input buffer, drains at most one output buffer per event and
//! then releases the event, whether or not decoding succeeded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, trace, warn};

use super::decoder::{OutputBuffer, VideoDecoder};
use super::{MediaEvent, MediaEventQueue, QueuePoll};
use crate::config::PipelineConfig;
use crate::error::{DecodeError, SessionError};
use crate::stats::PipelineStats;
use crate::types::{SessionEvent, UnavailableReason};

/// Handle to the running decode thread.
///
/// The thread owns the decoder while it runs and hands it back from
/// [`DecodeLoop::shutdown`], so the owner can release it.
pub struct DecodeLoop {
    thread:    Option<JoinHandle<Box<dyn VideoDecoder>>>,
    interrupt: Arc<AtomicBool>,
}

impl DecodeLoop {
    pub fn spawn(
        decoder: Box<dyn VideoDecoder>,
        queue: Arc<MediaEventQueue>,
        config: PipelineConfig,
        stats: Arc<PipelineStats>,
        notify: UnboundedSender<SessionEvent>,
    ) -> Result<Self, SessionError> {
        let interrupt = Arc::new(AtomicBool::new(false));
        let worker = Worker {
            decoder,
            queue,
            config,
            stats,
            notify,
            interrupt: Arc::clone(&interrupt),
        };
        let thread = thread::Builder::new()
            .name("tuner-decoder".to_string())
            .spawn(move || worker.run())
            .map_err(|source| SessionError::Spawn { name: "decoder", source })?;

        Ok(Self { thread: Some(thread), interrupt })
    }

    /// Asks the loop to stop at its next iteration boundary.
    pub fn interrupt(&self) {
        self.interrupt.store(true, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Interrupts and joins the thread, returning the decoder.
    ///
    /// `None` if already shut down or the thread panicked.
    pub fn shutdown(&mut self) -> Option<Box<dyn VideoDecoder>> {
        self.interrupt();
        let handle = self.thread.take()?;
        match handle.join() {
            Ok(decoder) => Some(decoder),
            Err(_) => {
                warn!("decode thread panicked");
                None
            }
        }
    }
}

impl Drop for DecodeLoop {
    fn drop(&mut self) {
        if let Some(mut decoder) = self.shutdown() {
            decoder.release();
        }
    }
}

struct Worker {
    decoder:   Box<dyn VideoDecoder>,
    queue:     Arc<MediaEventQueue>,
    config:    PipelineConfig,
    stats:     Arc<PipelineStats>,
    notify:    UnboundedSender<SessionEvent>,
    interrupt: Arc<AtomicBool>,
}

impl Worker {
    fn run(mut self) -> Box<dyn VideoDecoder> {
        debug!("decode loop started");
        while !self.interrupt.load(Ordering::Acquire) {
            match self.queue.poll() {
                QueuePoll::Event(event) => self.handle_event(event),
                QueuePoll::NotReady | QueuePoll::Empty => thread::sleep(self.config.poll_interval),
            }
        }
        debug!("decode loop interrupted");
        self.decoder
    }

    fn handle_event(&mut self, event: MediaEvent) {
        if event.block().is_none() {
            trace!("media event without a block");
            self.stats.record_empty_event();
            event.release();
            return;
        }

        match self.queue_input(&event) {
            Ok(true) => {
                self.stats.record_submitted();
                self.drain_output();
            }
            Ok(false) => {
                trace!(pts = event.pts(), "no input buffer within budget, dropping access unit");
                self.stats.record_rejected();
            }
            Err(e) => {
                warn!(error = %e, "failed to queue decoder input");
                self.stats.record_rejected();
                self.report_unavailable();
            }
        }
        event.release();
    }

    /// `Ok(false)` when no input buffer freed up within the wait budget.
    fn queue_input(&mut self, event: &MediaEvent) -> Result<bool, DecodeError> {
        let Some(mut buffer) = self.decoder.dequeue_input_buffer(self.config.input_timeout)? else {
            return Ok(false);
        };
        let payload = event.payload();
        let copied = buffer.fill(payload);
        trace!(
            sample_size = event.data_length(),
            offset = event.offset(),
            copied,
            pts = event.pts(),
            "send data to decoder"
        );
        self.decoder.queue_input_buffer(buffer, event.pts_us())?;
        Ok(true)
    }

    fn drain_output(&mut self) {
        match self.decoder.dequeue_output_buffer(self.config.output_timeout) {
            Ok(OutputBuffer::Frame { index, pts_us }) => {
                match self.decoder.release_output_buffer(index, true) {
                    Ok(()) => {
                        trace!(pts_us, "frame rendered");
                        self.stats.record_frame_rendered();
                        let _ = self.notify.send(SessionEvent::VideoAvailable);
                    }
                    Err(e) => warn!(error = %e, "failed to release output buffer"),
                }
            }
            Ok(OutputBuffer::FormatChanged(info)) => {
                info!(codec = %info.codec, width = info.width, height = info.height, "output format changed");
                self.stats.record_format_change();
                let _ = self.notify.send(SessionEvent::FormatChanged(info));
            }
            Ok(OutputBuffer::TryAgainLater) => trace!("no output within budget"),
            Err(e) => {
                warn!(error = %e, "failed to dequeue decoder output");
                self.report_unavailable();
            }
        }
    }

    fn report_unavailable(&self) {
        let _ = self.notify.send(SessionEvent::VideoUnavailable(UnavailableReason::Unknown));
    }
}
