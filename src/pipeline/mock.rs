//! Scripted decoder for pipeline tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use super::decoder::{DecoderFactory, InputBuffer, OutputBuffer, VideoDecoder};
use crate::config::DecoderFormat;
use crate::error::DecodeError;
use crate::types::Surface;

/// Zero-based input dequeue attempts that time out (`reject`) or error (`fail`).
#[derive(Debug, Clone, Default)]
pub struct MockBehavior {
    pub reject: Vec<usize>,
    pub fail:   Vec<usize>,
}

#[derive(Debug, Default)]
struct Recorded {
    attempts:   usize,
    queued:     Vec<(u64, Bytes)>,
    configured: Option<DecoderFormat>,
    started:    bool,
    released:   usize,
}

/// Shared view of what a [`MockDecoder`] saw.
#[derive(Debug, Clone, Default)]
pub struct MockLog(Arc<Mutex<Recorded>>);

impl MockLog {
    pub fn attempts(&self) -> usize {
        self.0.lock().attempts
    }

    pub fn queued_pts(&self) -> Vec<u64> {
        self.0.lock().queued.iter().map(|(pts, _)| *pts).collect()
    }

    pub fn queued_data(&self) -> Vec<Bytes> {
        self.0.lock().queued.iter().map(|(_, data)| data.clone()).collect()
    }

    pub fn configured(&self) -> Option<DecoderFormat> {
        self.0.lock().configured.clone()
    }

    pub fn started(&self) -> bool {
        self.0.lock().started
    }

    pub fn released(&self) -> usize {
        self.0.lock().released
    }
}

pub struct MockDecoder {
    behavior: MockBehavior,
    log:      MockLog,
    pending:  VecDeque<u64>,
    next_idx: usize,
}

impl MockDecoder {
    pub fn new(behavior: MockBehavior) -> (Self, MockLog) {
        let log = MockLog::default();
        let decoder = Self { behavior, log: log.clone(), pending: VecDeque::new(), next_idx: 0 };
        (decoder, log)
    }
}

impl VideoDecoder for MockDecoder {
    fn configure(&mut self, format: &DecoderFormat, _surface: Option<Surface>) -> Result<(), DecodeError> {
        self.log.0.lock().configured = Some(format.clone());
        Ok(())
    }

    fn start(&mut self) -> Result<(), DecodeError> {
        self.log.0.lock().started = true;
        Ok(())
    }

    fn dequeue_input_buffer(&mut self, _timeout: Duration) -> Result<Option<InputBuffer>, DecodeError> {
        let attempt = {
            let mut rec = self.log.0.lock();
            rec.attempts += 1;
            rec.attempts - 1
        };
        if self.behavior.fail.contains(&attempt) {
            return Err(DecodeError::Backend(format!("scripted failure on attempt {attempt}")));
        }
        if self.behavior.reject.contains(&attempt) {
            return Ok(None);
        }
        let idx = self.next_idx;
        self.next_idx += 1;
        Ok(Some(InputBuffer::new(idx, 64)))
    }

    fn queue_input_buffer(&mut self, buffer: InputBuffer, pts_us: u64) -> Result<(), DecodeError> {
        self.log.0.lock().queued.push((pts_us, buffer.data.freeze()));
        self.pending.push_back(pts_us);
        Ok(())
    }

    fn dequeue_output_buffer(&mut self, _timeout: Duration) -> Result<OutputBuffer, DecodeError> {
        Ok(match self.pending.pop_front() {
            Some(pts_us) => OutputBuffer::Frame { index: 0, pts_us },
            None => OutputBuffer::TryAgainLater,
        })
    }

    fn release_output_buffer(&mut self, _index: usize, _render: bool) -> Result<(), DecodeError> {
        Ok(())
    }

    fn release(&mut self) {
        self.log.0.lock().released += 1;
    }
}

/// Hands out a single [`MockDecoder`]; later calls fail.
pub struct MockFactory {
    decoder: Mutex<Option<MockDecoder>>,
}

impl MockFactory {
    pub fn new(behavior: MockBehavior) -> (Self, MockLog) {
        let (decoder, log) = MockDecoder::new(behavior);
        (Self { decoder: Mutex::new(Some(decoder)) }, log)
    }
}

impl DecoderFactory for MockFactory {
    fn create_decoder(&self, mime: &str) -> Result<Box<dyn VideoDecoder>, DecodeError> {
        match self.decoder.lock().take() {
            Some(decoder) => Ok(Box::new(decoder)),
            None => Err(DecodeError::UnsupportedFormat(mime.to_string())),
        }
    }
}
