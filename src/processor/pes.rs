//! PES reassembly into access units.

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::constants::PES_START_CODE;

/// One reassembled PES packet. `data` holds the whole packet; the
/// elementary stream payload starts at `offset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    pub data:        Bytes,
    pub offset:      usize,
    pub data_length: usize,
    /// 90 kHz ticks; 0 when the header carries no PTS.
    pub pts:         u64,
}

impl AccessUnit {
    pub fn payload(&self) -> &[u8] {
        &self.data[self.offset..self.offset + self.data_length]
    }
}

#[derive(Debug, Default)]
pub struct PesAssembler {
    buf:     BytesMut,
    started: bool,
}

impl PesAssembler {
    pub fn push(&mut self, payload: &[u8], unit_start: bool, out: &mut Vec<AccessUnit>) {
        if unit_start {
            self.flush(out);
            self.started = true;
        } else if !self.started {
            return;
        }
        self.buf.extend_from_slice(payload);

        if let Some(total) = self.declared_len() {
            if self.buf.len() >= total {
                self.flush(out);
            }
        }
    }

    /// Emits the packet in progress, if it has a valid header.
    pub fn flush(&mut self, out: &mut Vec<AccessUnit>) {
        self.started = false;
        if self.buf.is_empty() {
            return;
        }
        let data = self.buf.split().freeze();
        match parse_pes(data) {
            Some(unit) => out.push(unit),
            None => debug!("dropping PES with malformed header"),
        }
    }

    /// Drops a partially assembled packet (continuity error).
    pub fn discard(&mut self) {
        self.buf.clear();
        self.started = false;
    }

    fn declared_len(&self) -> Option<usize> {
        if self.buf.len() < 6 {
            return None;
        }
        let len = u16::from_be_bytes([self.buf[4], self.buf[5]]) as usize;
        (len != 0).then_some(6 + len)
    }
}

fn parse_pes(data: Bytes) -> Option<AccessUnit> {
    if data.len() < 9 || data[..3] != PES_START_CODE {
        return None;
    }
    let header_len = 9 + data[8] as usize;
    if header_len > data.len() {
        return None;
    }

    let pts = if data[7] & 0x80 != 0 && data.len() >= 14 { read_timestamp(&data[9..14]) } else { 0 };

    let declared = u16::from_be_bytes([data[4], data[5]]) as usize;
    let end = if declared == 0 { data.len() } else { (6 + declared).min(data.len()) };
    Some(AccessUnit { offset: header_len, data_length: end.saturating_sub(header_len), pts, data })
}

/// 33-bit PTS/DTS from its 5-byte marker-interleaved encoding.
pub fn read_timestamp(p: &[u8]) -> u64 {
    ((p[0] as u64 & 0x0E) << 29)
        | ((p[1] as u64) << 22)
        | (((p[2] as u64 & 0xFE) >> 1) << 15)
        | ((p[3] as u64) << 7)
        | ((p[4] as u64) >> 1)
}
