//! Media event pipeline between filter callbacks and the decode thread.
//!
//! ```text
//! tuner filter ─► FilterPump ─► MediaEventQueue ─► DecodeLoop ─► VideoDecoder
//!   (callback)     (producer)    (mutex + flag)     (consumer)
//! ```

pub mod decode_loop;
pub mod decoder;
pub mod probe;
pub mod producer;
#[cfg(test)]
pub(crate) mod mock;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};

use crate::config::{OverflowPolicy, PipelineConfig};

pub use decode_loop::DecodeLoop;
pub use decoder::{DecoderFactory, InputBuffer, OutputBuffer, VideoDecoder};
pub use probe::{ProbeDecoder, ProbeDecoderFactory};
pub use producer::FilterPump;

/* ─────────── block pool ─────────── */

#[derive(Debug)]
struct PoolInner {
    capacity:    usize,
    outstanding: AtomicUsize,
    leased:      AtomicU64,
    released:    AtomicU64,
}

/// Bounded pool of media blocks, standing in for hardware-backed memory.
///
/// A lease fails once `capacity` blocks are outstanding; a block goes back
/// to the pool when it is dropped.
#[derive(Debug, Clone)]
pub struct MediaBlockPool {
    inner: Arc<PoolInner>,
}

impl MediaBlockPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                capacity,
                outstanding: AtomicUsize::new(0),
                leased: AtomicU64::new(0),
                released: AtomicU64::new(0),
            }),
        }
    }

    /// Wraps `data` in a pooled block, or `None` if the pool is exhausted.
    pub fn try_lease(&self, data: Bytes) -> Option<MediaBlock> {
        let inner = &self.inner;
        inner
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < inner.capacity).then_some(n + 1))
            .ok()?;
        inner.leased.fetch_add(1, Ordering::Relaxed);
        Some(MediaBlock { data, pool: Arc::clone(inner) })
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    pub fn leased(&self) -> u64 {
        self.inner.leased.load(Ordering::Relaxed)
    }

    pub fn released(&self) -> u64 {
        self.inner.released.load(Ordering::Relaxed)
    }
}

/// Reference-counted linear memory block leased from a [`MediaBlockPool`].
#[derive(Debug)]
pub struct MediaBlock {
    data: Bytes,
    pool: Arc<PoolInner>,
}

impl MediaBlock {
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Drop for MediaBlock {
    fn drop(&mut self) {
        self.pool.outstanding.fetch_sub(1, Ordering::AcqRel);
        self.pool.released.fetch_add(1, Ordering::Relaxed);
    }
}

/* ─────────── media event ─────────── */

/// One demultiplexed access unit.
///
/// The block is returned to its pool exactly once: by [`MediaEvent::release`]
/// or, failing that, when the event is dropped.
#[derive(Debug)]
pub struct MediaEvent {
    block:       Option<MediaBlock>,
    data_length: u64,
    offset:      u64,
    pts:         u64,
}

impl MediaEvent {
    /// `pts` is in 90 kHz ticks.
    pub fn new(block: Option<MediaBlock>, data_length: u64, offset: u64, pts: u64) -> Self {
        Self { block, data_length, offset, pts }
    }

    pub fn block(&self) -> Option<&MediaBlock> {
        self.block.as_ref()
    }

    pub fn data_length(&self) -> u64 {
        self.data_length
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn pts(&self) -> u64 {
        self.pts
    }

    /// Presentation time in microseconds.
    pub fn pts_us(&self) -> u64 {
        self.pts * 100 / 9
    }

    /// Payload bytes: starts at `offset` when it lies inside the block,
    /// spans `min(data_length, available)` bytes.
    pub fn payload(&self) -> &[u8] {
        let Some(block) = &self.block else { return &[] };
        let data = block.as_bytes();
        let start = match usize::try_from(self.offset) {
            Ok(off) if off > 0 && off < data.len() => off,
            _ => 0,
        };
        let available = &data[start..];
        let size = usize::try_from(self.data_length).map_or(available.len(), |n| n.min(available.len()));
        &available[..size]
    }

    /// Returns the backing block to its pool.
    pub fn release(self) {
        drop(self);
    }
}

/* ─────────── queue ─────────── */

struct PipelineState {
    data_ready: bool,
    closed:     bool,
    queue:      VecDeque<MediaEvent>,
}

/// Result of [`MediaEventQueue::poll`].
#[derive(Debug)]
pub enum QueuePoll {
    /// The filter has not signalled data ready yet.
    NotReady,
    Empty,
    Event(MediaEvent),
}

/// Result of [`MediaEventQueue::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queued after evicting (and releasing) the oldest event.
    Evicted,
    /// Queue closed; the event was released.
    Closed,
}

/// Bounded FIFO of media events plus the data-ready flag, guarded together.
pub struct MediaEventQueue {
    state:    Mutex<PipelineState>,
    space:    Condvar,
    capacity: usize,
    policy:   OverflowPolicy,
}

impl MediaEventQueue {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            state: Mutex::new(PipelineState {
                data_ready: false,
                closed: false,
                queue: VecDeque::with_capacity(config.queue_capacity.min(1024)),
            }),
            space: Condvar::new(),
            capacity: config.queue_capacity.max(1),
            policy: config.overflow,
        }
    }

    /// Appends at the tail, applying the overflow policy when full.
    pub fn push(&self, event: MediaEvent) -> PushOutcome {
        let mut state = self.state.lock();
        if self.policy == OverflowPolicy::BlockProducer {
            while state.queue.len() >= self.capacity && !state.closed {
                self.space.wait(&mut state);
            }
        }
        if state.closed {
            return PushOutcome::Closed;
        }
        let mut outcome = PushOutcome::Queued;
        if state.queue.len() >= self.capacity {
            state.queue.pop_front();
            outcome = PushOutcome::Evicted;
        }
        state.queue.push_back(event);
        outcome
    }

    pub fn set_data_ready(&self) {
        self.state.lock().data_ready = true;
    }

    pub fn is_data_ready(&self) -> bool {
        self.state.lock().data_ready
    }

    /// Pops the head once data is ready.
    pub fn poll(&self) -> QueuePoll {
        let mut state = self.state.lock();
        if !state.data_ready {
            return QueuePoll::NotReady;
        }
        match state.queue.pop_front() {
            Some(event) => {
                self.space.notify_one();
                QueuePoll::Event(event)
            }
            None => QueuePoll::Empty,
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Releases every queued event and rejects further pushes. Idempotent.
    pub fn close(&self) {
        let drained: Vec<MediaEvent> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.queue.drain(..).collect()
        };
        self.space.notify_all();
        drained.into_iter().for_each(MediaEvent::release);
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}
