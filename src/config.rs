//! Explicit configuration values passed into pipeline, decoder and tuner
//! construction.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;

use crate::constants::{MIME_VIDEO_AVC, TS_PACKET_SIZE};

/// What the queue does when the producer outruns the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Evict (and release) the oldest queued event.
    #[default]
    DropOldest,
    /// Make the producer wait for space.
    BlockProducer,
}

/// Decode pipeline tuning.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Sleep between polls while no data is ready.
    pub poll_interval: Duration,
    /// Wait budget for a decoder input buffer.
    pub input_timeout: Duration,
    /// Wait budget for a decoder output buffer.
    pub output_timeout: Duration,
    pub queue_capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            input_timeout: Duration::from_millis(100),
            output_timeout: Duration::from_millis(100),
            queue_capacity: 256,
            overflow: OverflowPolicy::DropOldest,
        }
    }
}

/// Decoder input format.
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderFormat {
    pub mime: String,
    pub width: u16,
    pub height: u16,
    pub track_id: u32,
    pub duration_us: u64,
    pub level: u32,
    pub profile: u32,
    /// Codec specific data (SPS, PPS for AVC).
    pub csd: Vec<Bytes>,
}

impl Default for DecoderFormat {
    /// AVC 320x240 sample stream.
    fn default() -> Self {
        Self {
            mime: MIME_VIDEO_AVC.to_string(),
            width: 320,
            height: 240,
            track_id: 1,
            duration_us: 9_933_333,
            level: 32,
            profile: 65_536,
            csd: vec![
                Bytes::from_static(&[
                    0, 0, 0, 1, 103, 66, 192, 20, 218, 5, 7, 232, 64, 0, 0, 3, 0, 64, 0, 0, 15, 35, 197,
                    10, 168,
                ]),
                Bytes::from_static(&[0, 0, 0, 1, 104, 206, 60, 128]),
            ],
        }
    }
}

/// DVR playback settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DvrSettings {
    pub status_mask: u8,
    pub low_threshold: usize,
    pub high_threshold: usize,
    pub buffer_size: usize,
    pub packet_size: usize,
    /// Bytes read from the source per read call.
    pub read_size: usize,
}

impl Default for DvrSettings {
    fn default() -> Self {
        Self {
            status_mask: 0x0F,
            low_threshold: 0x1000,
            high_threshold: 0x07FFF,
            buffer_size: 4_000_000,
            packet_size: TS_PACKET_SIZE,
            read_size: 700_000,
        }
    }
}

/// Frontend settings passed to `Tuner::tune`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontendSettings {
    pub frequency_khz: u64,
    pub bandwidth_mhz: u8,
}

impl Default for FrontendSettings {
    fn default() -> Self {
        Self { frequency_khz: 578_000, bandwidth_mhz: 8 }
    }
}

/// PID overrides. `None` means "learn it from the PMT".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSelection {
    pub video_pid: Option<u16>,
    pub audio_pid: Option<u16>,
}

/// Where the software tuner reads the transport stream from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceConfig {
    File(PathBuf),
    /// UDP unicast or multicast (IPv4).
    Udp(SocketAddr),
}

/// Configuration for the software tuner.
#[derive(Debug, Clone)]
pub struct TunerConfig {
    pub source: SourceConfig,
    pub selection: StreamSelection,
    /// Number of media blocks that may be outstanding at once.
    pub block_pool_size: usize,
    /// Stop reading a UDP source after this long without data.
    pub idle_timeout: Duration,
}

impl TunerConfig {
    pub fn new(source: SourceConfig) -> Self {
        Self {
            source,
            selection: StreamSelection::default(),
            block_pool_size: 64,
            idle_timeout: Duration::from_secs(30),
        }
    }
}

/// Everything a tuner session needs besides its collaborators.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub pipeline: PipelineConfig,
    pub format:   DecoderFormat,
    pub dvr:      DvrSettings,
    pub frontend: FrontendSettings,
}
