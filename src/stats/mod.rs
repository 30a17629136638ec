//! Counters for the media pipeline

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Shared pipeline counters, updated by the producer and consumer threads.
#[derive(Debug, Default)]
pub struct PipelineStats {
    queued:          AtomicU64,
    evicted:         AtomicU64,
    submitted:       AtomicU64,
    rejected:        AtomicU64,
    empty_events:    AtomicU64,
    frames_rendered: AtomicU64,
    format_changes:  AtomicU64,
    sections_parsed: AtomicU64,
    sections_failed: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineSnapshot {
    pub queued:          u64,
    pub evicted:         u64,
    pub submitted:       u64,
    pub rejected:        u64,
    pub empty_events:    u64,
    pub frames_rendered: u64,
    pub format_changes:  u64,
    pub sections_parsed: u64,
    pub sections_failed: u64,
}

impl PipelineSnapshot {
    /// Events queued but not yet taken by the decode loop.
    pub fn pending(&self) -> u64 {
        let consumed = self.submitted + self.rejected + self.empty_events + self.evicted;
        self.queued.saturating_sub(consumed)
    }
}

macro_rules! counter {
    ($($inc:ident => $field:ident),* $(,)?) => {
        $(
            pub fn $inc(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    counter! {
        record_queued => queued,
        record_evicted => evicted,
        record_submitted => submitted,
        record_rejected => rejected,
        record_empty_event => empty_events,
        record_frame_rendered => frames_rendered,
        record_format_change => format_changes,
        record_section_parsed => sections_parsed,
        record_section_failed => sections_failed,
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            queued:          self.queued.load(Ordering::Relaxed),
            evicted:         self.evicted.load(Ordering::Relaxed),
            submitted:       self.submitted.load(Ordering::Relaxed),
            rejected:        self.rejected.load(Ordering::Relaxed),
            empty_events:    self.empty_events.load(Ordering::Relaxed),
            frames_rendered: self.frames_rendered.load(Ordering::Relaxed),
            format_changes:  self.format_changes.load(Ordering::Relaxed),
            sections_parsed: self.sections_parsed.load(Ordering::Relaxed),
            sections_failed: self.sections_failed.load(Ordering::Relaxed),
        }
    }
}
