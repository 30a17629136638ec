//! Software demultiplexer
//!
//! Splits a transport stream into PSIP sections and video/audio access
//! units. PAT and PMT are followed to find the elementary stream PIDs
//! unless a [`StreamSelection`] pins them.

mod pes;
mod section;

use std::collections::HashMap;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::StreamSelection;
use crate::constants::*;
use crate::psi::{parse_pat, parse_pmt, PmtSection};

pub use pes::{read_timestamp, AccessUnit, PesAssembler};
pub use section::SectionAssembler;

#[cfg(test)]
pub(crate) use pes::fixture::pes_packet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DemuxOutput {
    /// A complete section from the PSIP base PID.
    Section(Bytes),
    AccessUnit { kind: StreamKind, unit: AccessUnit },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DemuxCounters {
    pub packets:         u64,
    pub invalid_packets: u64,
    pub discontinuities: u64,
    pub psip_sections:   u64,
    pub access_units:    u64,
}

pub struct PacketProcessor {
    selection:  StreamSelection,
    sections:   HashMap<u16, SectionAssembler>,
    pes:        HashMap<u16, PesAssembler>,
    continuity: HashMap<u16, u8>,
    pmt_pid:    Option<u16>,
    pmt:        Option<PmtSection>,
    video_pid:  Option<u16>,
    audio_pid:  Option<u16>,
    counters:   DemuxCounters,
}

impl PacketProcessor {
    pub fn new(selection: StreamSelection) -> Self {
        Self {
            selection,
            sections: HashMap::new(),
            pes: HashMap::new(),
            continuity: HashMap::new(),
            pmt_pid: None,
            pmt: None,
            video_pid: selection.video_pid,
            audio_pid: selection.audio_pid,
            counters: DemuxCounters::default(),
        }
    }

    pub fn video_pid(&self) -> Option<u16> {
        self.video_pid
    }

    pub fn audio_pid(&self) -> Option<u16> {
        self.audio_pid
    }

    pub fn pmt_pid(&self) -> Option<u16> {
        self.pmt_pid
    }

    pub fn counters(&self) -> DemuxCounters {
        self.counters
    }

    /// Process a single TS packet
    pub fn process_packet(&mut self, chunk: &[u8], out: &mut Vec<DemuxOutput>) {
        if chunk.len() < TS_PACKET_SIZE || chunk[0] != TS_SYNC_BYTE {
            self.counters.invalid_packets += 1;
            return;
        }
        self.counters.packets += 1;

        let pid = (((chunk[1] & 0x1F) as u16) << 8) | (chunk[2] as u16);
        let payload_unit_start = chunk[1] & 0x40 != 0;
        let adaptation_field_ctrl = (chunk[3] & 0x30) >> 4;
        let continuity_counter = chunk[3] & 0x0F;

        // no payload
        if pid == NULL_PID || adaptation_field_ctrl & 0x01 == 0 {
            return;
        }

        let mut payload_offset = 4usize;
        if adaptation_field_ctrl == 3 {
            payload_offset += 1 + chunk[4] as usize;
            if payload_offset >= TS_PACKET_SIZE {
                return;
            }
        }
        let payload = &chunk[payload_offset..TS_PACKET_SIZE];

        let continuous = self.check_continuity(pid, continuity_counter);

        if pid == PAT_PID || pid == PSIP_BASE_PID || Some(pid) == self.pmt_pid {
            let asm = self.sections.entry(pid).or_default();
            if !continuous {
                asm.reset();
            }
            let mut sections = Vec::new();
            asm.push(payload, payload_unit_start, &mut sections);
            for section in sections {
                self.on_section(pid, section, out);
            }
        } else if let Some(kind) = self.stream_kind(pid) {
            let asm = self.pes.entry(pid).or_default();
            if !continuous {
                asm.discard();
            }
            let mut units = Vec::new();
            asm.push(payload, payload_unit_start, &mut units);
            self.emit_units(kind, units, out);
        }
    }

    /// Emits access units still being assembled. Call at end of stream.
    pub fn flush(&mut self, out: &mut Vec<DemuxOutput>) {
        let mut pending = Vec::new();
        for (&pid, asm) in &mut self.pes {
            let mut units = Vec::new();
            asm.flush(&mut units);
            pending.push((pid, units));
        }
        for (pid, units) in pending {
            if let Some(kind) = self.stream_kind(pid) {
                self.emit_units(kind, units, out);
            }
        }
    }

    fn emit_units(&mut self, kind: StreamKind, units: Vec<AccessUnit>, out: &mut Vec<DemuxOutput>) {
        self.counters.access_units += units.len() as u64;
        out.extend(units.into_iter().map(|unit| DemuxOutput::AccessUnit { kind, unit }));
    }

    fn stream_kind(&self, pid: u16) -> Option<StreamKind> {
        if Some(pid) == self.video_pid {
            Some(StreamKind::Video)
        } else if Some(pid) == self.audio_pid {
            Some(StreamKind::Audio)
        } else {
            None
        }
    }

    /// `false` on a counter jump. Duplicates count as continuous.
    fn check_continuity(&mut self, pid: u16, cc: u8) -> bool {
        match self.continuity.insert(pid, cc) {
            Some(prev) if cc != prev && cc != (prev + 1) & 0x0F => {
                self.counters.discontinuities += 1;
                debug!(pid, expected = (prev + 1) & 0x0F, got = cc, "continuity error");
                false
            }
            _ => true,
        }
    }

    fn on_section(&mut self, pid: u16, section: Bytes, out: &mut Vec<DemuxOutput>) {
        if pid == PSIP_BASE_PID {
            self.counters.psip_sections += 1;
            out.push(DemuxOutput::Section(section));
            return;
        }

        if pid == PAT_PID {
            match parse_pat(&section) {
                Ok(Some(pat)) => {
                    let Some(program) = pat.programs.first() else { return };
                    if self.pmt_pid != Some(program.pmt_pid) {
                        info!(program = program.program_number, pmt_pid = program.pmt_pid, "PAT");
                        self.pmt_pid = Some(program.pmt_pid);
                        self.pmt = None;
                    }
                }
                Ok(None) => {}
                Err(e) => debug!(error = %e, "dropping PAT section"),
            }
            return;
        }

        match parse_pmt(&section) {
            Ok(Some(pmt)) => {
                let changed = self.pmt.as_ref().is_none_or(|p| p.version != pmt.version);
                if changed {
                    self.apply_pmt(&pmt);
                    self.pmt = Some(pmt);
                }
            }
            Ok(None) => {}
            Err(e) => debug!(error = %e, "dropping PMT section"),
        }
    }

    fn apply_pmt(&mut self, pmt: &PmtSection) {
        let find = |types: &[u8]| {
            pmt.streams.iter().find(|s| types.contains(&s.stream_type)).map(|s| s.elementary_pid)
        };
        let video = self.selection.video_pid.or_else(|| find(&[STREAM_TYPE_AVC, STREAM_TYPE_MPEG2_VIDEO]));
        let audio = self.selection.audio_pid.or_else(|| {
            find(&[STREAM_TYPE_MPEG1_AUDIO, STREAM_TYPE_MPEG2_AUDIO, STREAM_TYPE_AAC_ADTS, STREAM_TYPE_AC3])
        });

        info!(
            program = pmt.program_number,
            version = pmt.version,
            video_pid = ?video,
            audio_pid = ?audio,
            "PMT"
        );
        for (old, new) in [(self.video_pid, video), (self.audio_pid, audio)] {
            if let Some(old) = old.filter(|&pid| Some(pid) != new) {
                self.pes.remove(&old);
            }
        }
        self.video_pid = video;
        self.audio_pid = audio;
    }
}


#[cfg(test)]
mod tests {
    use super::fixture::packetize;
    use super::*;
    use crate::psi::pmt::fixture::pmt_section;
    use crate::psi::tvct::fixture::tvct_section;

    fn pat_section(program: u16, pmt_pid: u16) -> Vec<u8> {
        let mut s = vec![0x00, 0xB0, 0, 0x00, 0x01, 0xC1, 0, 0];
        s.extend(program.to_be_bytes());
        s.extend([0xE0 | (pmt_pid >> 8) as u8, pmt_pid as u8]);
        s.extend([0, 0, 0, 0]);
        s[2] = (s.len() - 3) as u8;
        s
    }

    fn run(proc: &mut PacketProcessor, ts: &[u8]) -> Vec<DemuxOutput> {
        let mut out = Vec::new();
        for chunk in ts.chunks(TS_PACKET_SIZE) {
            proc.process_packet(chunk, &mut out);
        }
        proc.flush(&mut out);
        out
    }

    #[test]
    fn test_discovers_pids_and_demuxes() {
        let mut cc = [0u8; 4];
        let mut ts = packetize(PAT_PID, &pat_section(3, 0x30), true, &mut cc[0]);
        ts.extend(packetize(0x30, &pmt_section(3, 0x31, &[(0x1B, 0x31), (0x81, 0x34)]), true, &mut cc[1]));
        ts.extend(packetize(PSIP_BASE_PID, &tvct_section("KQED", 9, 1, &[]), true, &mut cc[2]));
        let big_es = vec![0xAB; 400];
        ts.extend(packetize(0x31, &pes_packet(3000, &big_es), false, &mut cc[3]));
        ts.extend(packetize(0x31, &pes_packet(6000, &[1, 2, 3]), false, &mut cc[3]));

        let mut proc = PacketProcessor::new(StreamSelection::default());
        let out = run(&mut proc, &ts);

        assert_eq!(proc.pmt_pid(), Some(0x30));
        assert_eq!(proc.video_pid(), Some(0x31));
        assert_eq!(proc.audio_pid(), Some(0x34));

        assert_eq!(out.len(), 3);
        assert_eq!(out[0], DemuxOutput::Section(Bytes::from(tvct_section("KQED", 9, 1, &[]))));
        match &out[1] {
            DemuxOutput::AccessUnit { kind: StreamKind::Video, unit } => {
                assert_eq!(unit.pts, 3000);
                assert_eq!(unit.payload(), &big_es[..]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(&out[2], DemuxOutput::AccessUnit { unit, .. } if unit.payload() == [1, 2, 3]));

        let counters = proc.counters();
        assert_eq!(counters.access_units, 2);
        assert_eq!(counters.psip_sections, 1);
        assert_eq!(counters.discontinuities, 0);
    }

    #[test]
    fn test_selection_overrides_pmt() {
        let mut cc = [0u8; 2];
        let mut ts = packetize(PAT_PID, &pat_section(1, 0x100), true, &mut cc[0]);
        ts.extend(packetize(0x100, &pmt_section(1, 0x101, &[(0x1B, 0x101), (0x1B, 0x102)]), true, &mut cc[1]));
        let selection = StreamSelection { video_pid: Some(0x102), audio_pid: None };
        let mut proc = PacketProcessor::new(selection);
        run(&mut proc, &ts);
        assert_eq!(proc.video_pid(), Some(0x102));
        assert_eq!(proc.audio_pid(), None);
    }

    #[test]
    fn test_invalid_and_discontinuous_packets() {
        let selection = StreamSelection { video_pid: Some(0x31), audio_pid: None };
        let mut proc = PacketProcessor::new(selection);
        let mut cc = 0u8;
        let ts = packetize(0x31, &pes_packet(90, &[5; 300]), false, &mut cc);
        let mut out = Vec::new();

        proc.process_packet(&ts[..100], &mut out);
        let mut bad = ts[..TS_PACKET_SIZE].to_vec();
        bad[0] = 0x00;
        proc.process_packet(&bad, &mut out);

        // drop the first packet: the continuation has no PES start
        proc.process_packet(&ts[..TS_PACKET_SIZE], &mut out);
        let mut skipped = ts[TS_PACKET_SIZE..].to_vec();
        skipped[3] = (skipped[3] & 0xF0) | 0x05;
        proc.process_packet(&skipped, &mut out);
        proc.flush(&mut out);

        assert!(out.is_empty());
        let counters = proc.counters();
        assert_eq!(counters.invalid_packets, 2);
        assert_eq!(counters.discontinuities, 1);
    }
}
