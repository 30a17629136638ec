//! Tuner/demux collaborator interface.
//!
//! A tuner delivers filter output asynchronously, as [`FilterCallback`]
//! messages on the channel passed to [`Tuner::open_filter`]. The channel
//! closes when the tuner stops producing.

pub mod software;

use bytes::Bytes;
use tokio::sync::mpsc::UnboundedSender;

use crate::config::{DvrSettings, FrontendSettings};
use crate::error::TunerError;
use crate::pipeline::MediaEvent;

pub use software::SoftwareTuner;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterType {
    /// PSIP sections on the base PID.
    Section,
    Video,
    Audio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStatus {
    DataReady,
    LowWater,
    HighWater,
    Overflow,
}

#[derive(Debug)]
pub enum FilterEvent {
    /// One complete section, pointer field and stuffing removed.
    Section(Bytes),
    Media(MediaEvent),
}

#[derive(Debug)]
pub enum FilterCallback {
    Events { filter: FilterType, events: Vec<FilterEvent> },
    Status { filter: FilterType, status: FilterStatus },
}

pub type FilterSink = UnboundedSender<FilterCallback>;

pub trait Tuner: Send {
    /// Routes output of a filter to `sink`. At most one filter per type.
    fn open_filter(&mut self, filter: FilterType, sink: FilterSink) -> Result<(), TunerError>;

    fn open_dvr_playback(&mut self, settings: &DvrSettings) -> Result<(), TunerError>;

    /// Starts delivering filter output.
    fn tune(&mut self, settings: &FrontendSettings) -> Result<(), TunerError>;

    /// Stops delivery and closes all filters. Idempotent.
    fn close(&mut self);
}
