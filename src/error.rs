//! Error types for section parsing, decoding and session management.

use thiserror::Error;

/// Section-level parse failures.
///
/// All of these are local and recoverable: PSIP tables repeat on the
/// stream, so the caller drops the section and waits for the next copy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SectionError {
    /// Buffer ended before a required field.
    #[error("section too short")]
    TooShort,

    /// Section starts with a 0xFF stuffing byte.
    #[error("unexpected stuffing byte at section start")]
    UnexpectedStuffing,

    /// Declared section_length does not cover the buffer.
    #[error("section length mismatch: declared {declared} bytes, got {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// section_number is past last_section_number.
    #[error("section_number {section} > last_section_number {last}")]
    SectionNumberOutOfOrder { section: u8, last: u8 },

    /// The section does not describe exactly one channel.
    #[error("expected 1 channel in TVCT section, found {0}")]
    UnexpectedChannelCount(u8),

    /// Multiple string structure declares zero strings.
    #[error("multiple string structure has no strings")]
    NoStrings,

    /// No segment uses a supported compression type and mode.
    #[error("no supported string segment")]
    NoSupportedSegment,
}

/// Decoder collaborator failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// No decoder is available for the requested MIME type.
    #[error("no decoder for {0}")]
    UnsupportedFormat(String),

    /// Decoder was used before `configure`/`start`.
    #[error("decoder not started")]
    NotStarted,

    /// Input or output buffer index is not owned by the caller.
    #[error("invalid buffer index {0}")]
    InvalidIndex(usize),

    /// Backend reported an error.
    #[error("decoder error: {0}")]
    Backend(String),
}

/// Tuner/demux collaborator failures.
#[derive(Error, Debug)]
pub enum TunerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No more filters of this kind can be opened.
    #[error("no filter available for {0:?}")]
    NoFilter(crate::tuner::FilterType),

    /// Operation needs a DVR playback that was not opened.
    #[error("DVR playback not opened")]
    NoDvr,

    /// Tuner has been closed.
    #[error("tuner closed")]
    Closed,

    /// Source address could not be parsed or bound.
    #[error("invalid source: {0}")]
    InvalidSource(String),
}

/// Session lifecycle failures.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Tuner(#[from] TunerError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Worker thread could not be spawned.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Operation not allowed in the current state.
    #[error("invalid session state: {0:?}")]
    InvalidState(crate::types::SessionState),
}
