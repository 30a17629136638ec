use crate::constants::TABLE_ID_PAT;
use crate::error::SectionError;
use crate::psi::section::{validate_section, SectionHeader};

/// ─────────── PAT ───────────
#[derive(Debug, Clone)]
pub struct PatSection {
    pub version:      u8,
    pub current_next: bool,
    pub programs:     Vec<PatEntry>,
}
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatEntry {
    pub program_number: u16,
    pub pmt_pid:        u16,
}

/// Returns `None` for sections that are not a PAT.
pub fn parse_pat(section: &[u8]) -> Result<Option<PatSection>, SectionError> {
    validate_section(section)?;
    let sec = SectionHeader::read(section)?;
    if sec.table_id != TABLE_ID_PAT { return Ok(None); }

    let body = sec.body(section);
    let programs = body
        .chunks_exact(4)
        .map(|e| PatEntry {
            program_number: u16::from_be_bytes([e[0], e[1]]),
            pmt_pid:        (((e[2] & 0x1F) as u16) << 8) | (e[3] as u16),
        })
        .filter(|e| e.program_number != 0)   // network PID entry
        .collect();
    Ok(Some(PatSection{ version:sec.version, current_next:sec.current_next, programs }))
}
