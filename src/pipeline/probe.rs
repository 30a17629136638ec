//! Software stand-in for a hardware video decoder.
//!
//! Does not decode pixels. It tracks the H.264 SPS of the stream, reports
//! geometry changes as [`OutputBuffer::FormatChanged`] and produces one
//! output frame per submitted access unit.

use std::collections::VecDeque;
use std::time::Duration;

use tracing::{debug, trace};

use super::decoder::{DecoderFactory, InputBuffer, OutputBuffer, VideoDecoder};
use crate::config::DecoderFormat;
use crate::constants::MIME_VIDEO_AVC;
use crate::error::DecodeError;
use crate::parsers::parse_h264_sps;
use crate::types::{Surface, VideoInfo};

const INPUT_SLOTS: usize = 4;
const INPUT_CAPACITY: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Configured,
    Started,
    Released,
}

pub struct ProbeDecoder {
    phase:       Phase,
    surface:     Option<Surface>,
    format:      Option<VideoInfo>,
    free_inputs: VecDeque<usize>,
    /// Output slots handed out and not yet released.
    held:        Vec<usize>,
    outputs:     VecDeque<OutputBuffer>,
    next_output: usize,
    frames:      u64,
}

impl ProbeDecoder {
    pub fn new() -> Self {
        Self {
            phase:       Phase::Created,
            surface:     None,
            format:      None,
            free_inputs: (0..INPUT_SLOTS).collect(),
            held:        Vec::new(),
            outputs:     VecDeque::new(),
            next_output: 0,
            frames:      0,
        }
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    fn ensure_started(&self) -> Result<(), DecodeError> {
        match self.phase {
            Phase::Started => Ok(()),
            _ => Err(DecodeError::NotStarted),
        }
    }

    fn observe_sps(&mut self, data: &[u8]) {
        let Some(info) = parse_h264_sps(data) else { return };
        if self.format.as_ref() != Some(&info) {
            debug!(width = info.width, height = info.height, fps = info.fps, "new SPS");
            self.format = Some(info.clone());
            self.outputs.push_back(OutputBuffer::FormatChanged(info));
        }
    }
}

impl Default for ProbeDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoDecoder for ProbeDecoder {
    fn configure(&mut self, format: &DecoderFormat, surface: Option<Surface>) -> Result<(), DecodeError> {
        if format.mime != MIME_VIDEO_AVC {
            return Err(DecodeError::UnsupportedFormat(format.mime.clone()));
        }
        if self.phase == Phase::Released {
            return Err(DecodeError::NotStarted);
        }
        self.surface = surface;
        for csd in &format.csd {
            self.observe_sps(csd);
        }
        self.phase = Phase::Configured;
        Ok(())
    }

    fn start(&mut self) -> Result<(), DecodeError> {
        match self.phase {
            Phase::Configured | Phase::Started => {
                self.phase = Phase::Started;
                Ok(())
            }
            _ => Err(DecodeError::NotStarted),
        }
    }

    fn dequeue_input_buffer(&mut self, _timeout: Duration) -> Result<Option<InputBuffer>, DecodeError> {
        self.ensure_started()?;
        Ok(self.free_inputs.pop_front().map(|index| InputBuffer::new(index, INPUT_CAPACITY)))
    }

    fn queue_input_buffer(&mut self, buffer: InputBuffer, pts_us: u64) -> Result<(), DecodeError> {
        self.ensure_started()?;
        if buffer.index >= INPUT_SLOTS || self.free_inputs.contains(&buffer.index) {
            return Err(DecodeError::InvalidIndex(buffer.index));
        }
        self.observe_sps(&buffer.data);
        let index = self.next_output;
        self.next_output += 1;
        self.outputs.push_back(OutputBuffer::Frame { index, pts_us });
        self.free_inputs.push_back(buffer.index);
        Ok(())
    }

    fn dequeue_output_buffer(&mut self, _timeout: Duration) -> Result<OutputBuffer, DecodeError> {
        self.ensure_started()?;
        let out = self.outputs.pop_front().unwrap_or(OutputBuffer::TryAgainLater);
        if let OutputBuffer::Frame { index, .. } = out {
            self.held.push(index);
        }
        Ok(out)
    }

    fn release_output_buffer(&mut self, index: usize, render: bool) -> Result<(), DecodeError> {
        let pos = self.held.iter().position(|&i| i == index).ok_or(DecodeError::InvalidIndex(index))?;
        self.held.swap_remove(pos);
        if render && self.surface.is_some() {
            self.frames += 1;
            trace!(index, "frame presented");
        }
        Ok(())
    }

    fn release(&mut self) {
        if self.phase != Phase::Released {
            debug!(frames = self.frames, "probe decoder released");
        }
        self.phase = Phase::Released;
        self.outputs.clear();
        self.held.clear();
    }
}

/// Creates [`ProbeDecoder`]s for `video/avc`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProbeDecoderFactory;

impl DecoderFactory for ProbeDecoderFactory {
    fn create_decoder(&self, mime: &str) -> Result<Box<dyn VideoDecoder>, DecodeError> {
        if mime != MIME_VIDEO_AVC {
            return Err(DecodeError::UnsupportedFormat(mime.to_string()));
        }
        Ok(Box::new(ProbeDecoder::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> ProbeDecoder {
        let mut dec = ProbeDecoder::new();
        dec.configure(&DecoderFormat::default(), Some(Surface(1))).unwrap();
        dec.start().unwrap();
        dec
    }

    #[test]
    fn test_format_change_from_csd() {
        let mut dec = started();
        match dec.dequeue_output_buffer(Duration::ZERO).unwrap() {
            OutputBuffer::FormatChanged(info) => assert_eq!((info.width, info.height), (320, 240)),
            other => panic!("expected format change, got {other:?}"),
        }
        assert_eq!(dec.dequeue_output_buffer(Duration::ZERO).unwrap(), OutputBuffer::TryAgainLater);
    }

    #[test]
    fn test_frame_per_input() {
        let mut dec = started();
        dec.dequeue_output_buffer(Duration::ZERO).unwrap();

        let mut buf = dec.dequeue_input_buffer(Duration::ZERO).unwrap().unwrap();
        buf.fill(&[0, 0, 1, 0x65, 0x88]);
        dec.queue_input_buffer(buf, 1000).unwrap();

        let out = dec.dequeue_output_buffer(Duration::ZERO).unwrap();
        assert_eq!(out, OutputBuffer::Frame { index: 0, pts_us: 1000 });
        dec.release_output_buffer(0, true).unwrap();
        assert_eq!(dec.frames_rendered(), 1);
        assert!(matches!(dec.release_output_buffer(0, true), Err(DecodeError::InvalidIndex(0))));
    }

    #[test]
    fn test_oversized_in_band_sps_still_yields_frame() {
        let mut dec = started();
        dec.dequeue_output_buffer(Duration::ZERO).unwrap();

        // pic_width_in_mbs_minus1 = 2^32 - 2
        let mut buf = dec.dequeue_input_buffer(Duration::ZERO).unwrap().unwrap();
        buf.fill(&[0, 0, 0, 1, 0x67, 0x42, 0xC0, 0x14, 0xF8, 0, 0, 0, 0x07, 0xFF, 0xFF, 0xFF, 0xFF, 0x20]);
        dec.queue_input_buffer(buf, 2000).unwrap();

        assert_eq!(dec.dequeue_output_buffer(Duration::ZERO).unwrap(), OutputBuffer::Frame { index: 0, pts_us: 2000 });
        assert_eq!(dec.dequeue_output_buffer(Duration::ZERO).unwrap(), OutputBuffer::TryAgainLater);
    }

    #[test]
    fn test_unconfigured_and_unsupported() {
        let mut dec = ProbeDecoder::new();
        assert!(matches!(dec.dequeue_input_buffer(Duration::ZERO), Err(DecodeError::NotStarted)));
        assert!(matches!(dec.start(), Err(DecodeError::NotStarted)));

        let format = DecoderFormat { mime: "video/hevc".into(), ..DecoderFormat::default() };
        assert!(matches!(dec.configure(&format, None), Err(DecodeError::UnsupportedFormat(_))));
        assert!(ProbeDecoderFactory.create_decoder("video/mpeg2").is_err());
        assert!(ProbeDecoderFactory.create_decoder(MIME_VIDEO_AVC).is_ok());
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut dec = started();
        dec.release();
        dec.release();
        assert!(matches!(dec.dequeue_output_buffer(Duration::ZERO), Err(DecodeError::NotStarted)));
    }
}
