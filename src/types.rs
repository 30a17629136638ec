use std::fmt;

use serde::Serialize;

/// Channel identity carried by a one-channel TVCT section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelIdentity {
    pub name: String,
    /// 10-bit major channel number (0-1023)
    pub major_number: u16,
    /// 10-bit minor channel number (0-1023)
    pub minor_number: u16,
}

impl ChannelIdentity {
    /// "major-minor", as shown to viewers.
    pub fn display_number(&self) -> String {
        format!("{}-{}", self.major_number, self.minor_number)
    }
}

impl fmt::Display for ChannelIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.display_number())
    }
}

/// Video codec information
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoInfo {
    pub codec: String,
    pub width: u16,
    pub height: u16,
    pub fps: f32,
    pub chroma: String,
}

/// Opaque handle to the host's output surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Surface(pub u64);

/// Session lifecycle. `Released` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    Tuning,
    Streaming,
    Released,
}

/// Why video cannot be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnavailableReason {
    Unknown,
    Tuning,
    WeakSignal,
}

/// Notifications from a session to its host.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A decoded frame was released to the surface.
    VideoAvailable,
    VideoUnavailable(UnavailableReason),
    /// Decoder output format changed.
    FormatChanged(VideoInfo),
    /// A TVCT section was parsed on the section filter.
    ChannelIdentified(ChannelIdentity),
    /// The tuner stopped delivering filter events.
    StreamEnded,
}
