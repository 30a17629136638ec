//! Video decoder collaborator interface.

use std::time::Duration;

use bytes::BytesMut;

use crate::config::DecoderFormat;
use crate::error::DecodeError;
use crate::types::{Surface, VideoInfo};

/// Decoder input slot handed out by [`VideoDecoder::dequeue_input_buffer`].
#[derive(Debug)]
pub struct InputBuffer {
    pub index: usize,
    pub data: BytesMut,
    /// Bytes the slot can hold.
    pub capacity: usize,
}

impl InputBuffer {
    pub fn new(index: usize, capacity: usize) -> Self {
        Self { index, data: BytesMut::with_capacity(capacity), capacity }
    }

    /// Copies as much of `src` as fits; returns the number of bytes copied.
    pub fn fill(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.capacity.saturating_sub(self.data.len()));
        self.data.extend_from_slice(&src[..n]);
        n
    }
}

/// Result of [`VideoDecoder::dequeue_output_buffer`].
#[derive(Debug, Clone, PartialEq)]
pub enum OutputBuffer {
    Frame { index: usize, pts_us: u64 },
    FormatChanged(VideoInfo),
    /// Nothing within the wait budget.
    TryAgainLater,
}

/// Buffer-queue decoder. Timeouts are wait budgets; running out of one is
/// not an error (`Ok(None)` / `TryAgainLater`).
pub trait VideoDecoder: Send {
    fn configure(&mut self, format: &DecoderFormat, surface: Option<Surface>) -> Result<(), DecodeError>;

    fn start(&mut self) -> Result<(), DecodeError>;

    fn dequeue_input_buffer(&mut self, timeout: Duration) -> Result<Option<InputBuffer>, DecodeError>;

    fn queue_input_buffer(&mut self, buffer: InputBuffer, pts_us: u64) -> Result<(), DecodeError>;

    fn dequeue_output_buffer(&mut self, timeout: Duration) -> Result<OutputBuffer, DecodeError>;

    /// Returns an output buffer, rendering it to the surface if `render`.
    fn release_output_buffer(&mut self, index: usize, render: bool) -> Result<(), DecodeError>;

    /// Frees decoder resources. Safe to call more than once.
    fn release(&mut self);
}

/// Creates decoders by MIME type.
pub trait DecoderFactory: Send + Sync {
    fn create_decoder(&self, mime: &str) -> Result<Box<dyn VideoDecoder>, DecodeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_bounded_by_capacity() {
        let mut buf = InputBuffer::new(0, 4);
        assert_eq!(buf.fill(&[1, 2, 3]), 3);
        assert_eq!(buf.fill(&[4, 5, 6]), 1);
        assert_eq!(&buf.data[..], &[1, 2, 3, 4]);
    }
}
