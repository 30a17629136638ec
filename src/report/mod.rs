//! JSON reports for scan results and playback progress

use serde::Serialize;

use crate::pipeline::MediaBlockPool;
use crate::setup::ScanOutcome;
use crate::stats::PipelineSnapshot;
use crate::types::{ChannelIdentity, SessionState, VideoInfo};

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PoolReport {
    pub capacity:    usize,
    pub outstanding: usize,
    pub leased:      u64,
    pub released:    u64,
}

impl From<&MediaBlockPool> for PoolReport {
    fn from(pool: &MediaBlockPool) -> Self {
        Self {
            capacity:    pool.capacity(),
            outstanding: pool.outstanding(),
            leased:      pool.leased(),
            released:    pool.released(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PlaybackReport<'a> {
    pub timestamp: String,
    pub state:     SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel:   Option<&'a ChannelIdentity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video:     Option<&'a VideoInfo>,
    pub pipeline:  PipelineSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool:      Option<PoolReport>,
}

#[derive(Debug, Serialize)]
pub struct ScanReport<'a> {
    pub timestamp: String,
    #[serde(flatten)]
    pub outcome:   &'a ScanOutcome,
}

/// Report builder
pub struct Reporter;

impl Reporter {
    pub fn playback<'a>(
        state: SessionState,
        channel: Option<&'a ChannelIdentity>,
        video: Option<&'a VideoInfo>,
        pipeline: PipelineSnapshot,
        pool: Option<&MediaBlockPool>,
    ) -> PlaybackReport<'a> {
        PlaybackReport { timestamp: now(), state, channel, video, pipeline, pool: pool.map(PoolReport::from) }
    }

    pub fn scan(outcome: &ScanOutcome) -> ScanReport<'_> {
        ScanReport { timestamp: now(), outcome }
    }

    /// Pretty-printed JSON for CLI output
    pub fn to_json<T: Serialize>(report: &T) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(report)?)
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}
