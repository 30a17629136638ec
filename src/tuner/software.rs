//! Tuner backed by a transport stream file or UDP socket.
//!
//! `tune` starts a tokio task that reads the source, runs the software
//! demultiplexer and delivers filter callbacks. The task owns the filter
//! sinks, so the callback channel closes when the stream ends or the
//! tuner is closed.

use std::collections::HashMap;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::{FilterCallback, FilterEvent, FilterSink, FilterStatus, FilterType, Tuner};
use crate::config::{DvrSettings, FrontendSettings, SourceConfig, TunerConfig};
use crate::constants::TS_SYNC_BYTE;
use crate::error::TunerError;
use crate::network;
use crate::pipeline::{MediaBlockPool, MediaEvent};
use crate::processor::{DemuxOutput, PacketProcessor, StreamKind};

const STATUS_DATA_READY: u8 = 0x1;
const STATUS_LOW_WATER: u8 = 0x2;
const STATUS_HIGH_WATER: u8 = 0x4;
const STATUS_OVERFLOW: u8 = 0x8;

const MAX_DATAGRAM: usize = 65_536;

pub struct SoftwareTuner {
    config:  TunerConfig,
    runtime: Handle,
    pool:    MediaBlockPool,
    sinks:   HashMap<FilterType, FilterSink>,
    dvr:     Option<DvrSettings>,
    task:    Option<JoinHandle<()>>,
    closed:  bool,
}

impl SoftwareTuner {
    /// The reader task is spawned on `runtime`.
    pub fn new(config: TunerConfig, runtime: Handle) -> Self {
        let pool = MediaBlockPool::new(config.block_pool_size);
        Self { config, runtime, pool, sinks: HashMap::new(), dvr: None, task: None, closed: false }
    }

    /// Pool backing the media events this tuner delivers.
    pub fn pool(&self) -> MediaBlockPool {
        self.pool.clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn open_source(&self, dvr: &DvrSettings) -> Result<Source, TunerError> {
        let _guard = self.runtime.enter();
        match &self.config.source {
            SourceConfig::File(path) => {
                let file = std::fs::File::open(path)?;
                Ok(Source::File { file: tokio::fs::File::from_std(file), read_size: dvr.read_size.max(dvr.packet_size) })
            }
            SourceConfig::Udp(addr) => {
                Ok(Source::Udp { socket: network::bind_udp(*addr)?, idle_timeout: self.config.idle_timeout })
            }
        }
    }
}

impl Tuner for SoftwareTuner {
    fn open_filter(&mut self, filter: FilterType, sink: FilterSink) -> Result<(), TunerError> {
        if self.closed {
            return Err(TunerError::Closed);
        }
        if self.sinks.contains_key(&filter) {
            return Err(TunerError::NoFilter(filter));
        }
        debug!(?filter, "filter opened");
        self.sinks.insert(filter, sink);
        Ok(())
    }

    fn open_dvr_playback(&mut self, settings: &DvrSettings) -> Result<(), TunerError> {
        if self.closed {
            return Err(TunerError::Closed);
        }
        self.dvr = Some(settings.clone());
        Ok(())
    }

    fn tune(&mut self, settings: &FrontendSettings) -> Result<(), TunerError> {
        if self.closed {
            return Err(TunerError::Closed);
        }
        if self.task.is_some() {
            debug!("already tuned");
            return Ok(());
        }
        let dvr = match (&self.config.source, &self.dvr) {
            (_, Some(dvr)) => dvr.clone(),
            (SourceConfig::File(_), None) => return Err(TunerError::NoDvr),
            (SourceConfig::Udp(_), None) => DvrSettings::default(),
        };
        let source = self.open_source(&dvr)?;
        info!(frequency_khz = settings.frequency_khz, source = ?self.config.source, "tuning");

        let demux = Demux {
            processor: PacketProcessor::new(self.config.selection),
            pool:      self.pool.clone(),
            sinks:     std::mem::take(&mut self.sinks),
            carry:     BytesMut::with_capacity(dvr.buffer_size.min(1 << 22)),
            dvr,
        };
        self.task = Some(self.runtime.spawn(source.run(demux)));
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.sinks.clear();
        debug!("tuner closed");
    }
}

impl Drop for SoftwareTuner {
    fn drop(&mut self) {
        self.close();
    }
}

enum Source {
    File { file: tokio::fs::File, read_size: usize },
    Udp { socket: UdpSocket, idle_timeout: Duration },
}

impl Source {
    async fn run(self, mut demux: Demux) {
        match self {
            Source::File { mut file, read_size } => {
                let mut buf = vec![0u8; read_size];
                loop {
                    match file.read(&mut buf).await {
                        Ok(0) => break,
                        Ok(n) => demux.feed(&buf[..n]),
                        Err(e) => {
                            warn!(error = %e, "read failed");
                            break;
                        }
                    }
                    if demux.sinks.is_empty() {
                        break;
                    }
                }
            }
            Source::Udp { socket, idle_timeout } => {
                let mut buf = vec![0u8; MAX_DATAGRAM];
                loop {
                    match tokio::time::timeout(idle_timeout, socket.recv_from(&mut buf)).await {
                        Ok(Ok((n, _))) => demux.feed(&buf[..n]),
                        Ok(Err(e)) => {
                            warn!(error = %e, "receive failed");
                            break;
                        }
                        Err(_) => {
                            info!(?idle_timeout, "no data, stopping");
                            break;
                        }
                    }
                    if demux.sinks.is_empty() {
                        break;
                    }
                }
            }
        }
        demux.finish();
    }
}

/// Packet alignment, demultiplexing and callback delivery.
struct Demux {
    processor: PacketProcessor,
    pool:      MediaBlockPool,
    sinks:     HashMap<FilterType, FilterSink>,
    dvr:       DvrSettings,
    carry:     BytesMut,
}

#[derive(Default)]
struct Batch {
    events:  Vec<FilterEvent>,
    bytes:   usize,
    dropped: usize,
}

impl Demux {
    fn feed(&mut self, data: &[u8]) {
        self.carry.extend_from_slice(data);
        let packet_size = self.dvr.packet_size;
        let mut outputs = Vec::new();

        while self.carry.len() >= packet_size {
            if self.carry[0] != TS_SYNC_BYTE {
                let skip = self.carry.iter().position(|&b| b == TS_SYNC_BYTE).unwrap_or(self.carry.len());
                trace!(skip, "resync");
                let _ = self.carry.split_to(skip);
                continue;
            }
            let packet = self.carry.split_to(packet_size);
            self.processor.process_packet(&packet, &mut outputs);
        }
        self.dispatch(outputs);
    }

    fn finish(mut self) {
        let mut outputs = Vec::new();
        self.processor.flush(&mut outputs);
        self.dispatch(outputs);
        let counters = self.processor.counters();
        info!(
            packets = counters.packets,
            invalid = counters.invalid_packets,
            discontinuities = counters.discontinuities,
            access_units = counters.access_units,
            "end of stream"
        );
    }

    fn dispatch(&mut self, outputs: Vec<DemuxOutput>) {
        if outputs.is_empty() {
            return;
        }
        let mut batches: HashMap<FilterType, Batch> = HashMap::new();

        for output in outputs {
            let (filter, event, bytes) = match output {
                DemuxOutput::Section(section) => {
                    let len = section.len();
                    (FilterType::Section, Some(FilterEvent::Section(section)), len)
                }
                DemuxOutput::AccessUnit { kind, unit } => {
                    let filter = match kind {
                        StreamKind::Video => FilterType::Video,
                        StreamKind::Audio => FilterType::Audio,
                    };
                    if !self.sinks.contains_key(&filter) {
                        continue;
                    }
                    let len = unit.data_length;
                    let event = self.pool.try_lease(unit.data).map(|block| {
                        MediaEvent::new(Some(block), unit.data_length as u64, unit.offset as u64, unit.pts)
                    });
                    (filter, event.map(FilterEvent::Media), len)
                }
            };
            if !self.sinks.contains_key(&filter) {
                continue;
            }
            let batch = batches.entry(filter).or_default();
            match event {
                Some(event) => {
                    batch.events.push(event);
                    batch.bytes += bytes;
                }
                None => batch.dropped += 1,
            }
        }

        for (filter, batch) in batches {
            if batch.dropped > 0 {
                warn!(?filter, dropped = batch.dropped, outstanding = self.pool.outstanding(), "block pool exhausted");
            }
            let statuses = self.statuses(filter, &batch);
            if !batch.events.is_empty() {
                self.send(filter, FilterCallback::Events { filter, events: batch.events });
            }
            for status in statuses {
                self.send(filter, FilterCallback::Status { filter, status });
            }
        }
    }

    fn statuses(&self, filter: FilterType, batch: &Batch) -> Vec<FilterStatus> {
        let mask = self.dvr.status_mask;
        let mut out = Vec::new();
        if filter == FilterType::Section {
            return out;
        }
        if !batch.events.is_empty() && mask & STATUS_DATA_READY != 0 {
            out.push(FilterStatus::DataReady);
        }
        if batch.bytes >= self.dvr.high_threshold && mask & STATUS_HIGH_WATER != 0 {
            out.push(FilterStatus::HighWater);
        } else if batch.bytes <= self.dvr.low_threshold && mask & STATUS_LOW_WATER != 0 {
            out.push(FilterStatus::LowWater);
        }
        if batch.dropped > 0 && mask & STATUS_OVERFLOW != 0 {
            out.push(FilterStatus::Overflow);
        }
        out
    }

    fn send(&mut self, filter: FilterType, callback: FilterCallback) {
        let Some(sink) = self.sinks.get(&filter) else { return };
        if sink.send(callback).is_err() {
            debug!(?filter, "filter receiver gone");
            self.sinks.remove(&filter);
        }
    }
}
