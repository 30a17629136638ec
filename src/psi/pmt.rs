use crate::constants::TABLE_ID_PMT;
use crate::error::SectionError;
use crate::psi::section::{validate_section, SectionHeader};

/// ─────────── PMT ───────────
#[derive(Debug, Clone)]
pub struct PmtSection {
    pub version:        u8,
    pub program_number: u16,
    pub pcr_pid:        u16,
    pub streams:        Vec<StreamInfo>,
}
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub stream_type:   u8,
    pub elementary_pid:u16,
}

/// Returns `None` for sections that are not a PMT.
pub fn parse_pmt(section: &[u8]) -> Result<Option<PmtSection>, SectionError> {
    validate_section(section)?;
    let sec = SectionHeader::read(section)?;
    if sec.table_id != TABLE_ID_PMT { return Ok(None); }
    let b = sec.body(section);
    if b.len() < 4 { return Err(SectionError::TooShort); }

    /* ── fixed header inside the body ── */
    let pcr_pid       = (((b[0] & 0x1F) as u16) << 8) | (b[1] as u16);
    let prog_info_len = (((b[2] & 0x0F) as usize) << 8) | (b[3] as usize);
    let mut idx       = 4 + prog_info_len;          // skip program descriptors

    /* ── ES loop ── */
    let mut streams = Vec::new();
    while idx + 5 <= b.len() {
        let stype = b[idx];
        let pid   = (((b[idx+1] & 0x1F) as u16) << 8) | (b[idx+2] as u16);
        let eslen = (((b[idx+3] & 0x0F) as usize) << 8) | (b[idx+4] as usize);
        streams.push(StreamInfo{ stream_type:stype, elementary_pid:pid });
        idx += 5 + eslen;                          // skip ES descriptors
    }

    Ok(Some(PmtSection{ version:sec.version,
                        program_number:sec.table_id_extension,
                        pcr_pid,
                        streams }))
}

#[cfg(test)]
pub(crate) mod fixture {
    /// PMT for `program` carrying the given (stream_type, pid) pairs.
    pub fn pmt_section(program: u16, pcr_pid: u16, streams: &[(u8, u16)]) -> Vec<u8> {
        let mut s = vec![0x02, 0xB0, 0];
        s.extend(program.to_be_bytes());
        s.extend([0xC1, 0, 0]);
        s.extend([0xE0 | (pcr_pid >> 8) as u8, pcr_pid as u8, 0xF0, 0]);
        for &(st, pid) in streams {
            s.extend([st, 0xE0 | (pid >> 8) as u8, pid as u8, 0xF0, 0]);
        }
        s.extend([0, 0, 0, 0]);
        s[2] = (s.len() - 3) as u8;
        s
    }
}

#[cfg(test)]
mod tests {
    use super::fixture::pmt_section;
    use super::*;

    #[test]
    fn test_parse_pmt() {
        let s = pmt_section(3, 0x31, &[(0x1B, 0x31), (0x81, 0x34)]);
        let pmt = parse_pmt(&s).unwrap().unwrap();
        assert_eq!(pmt.program_number, 3);
        assert_eq!(pmt.pcr_pid, 0x31);
        assert_eq!(pmt.streams.len(), 2);
        assert_eq!(pmt.streams[1], StreamInfo { stream_type: 0x81, elementary_pid: 0x34 });
    }
}
