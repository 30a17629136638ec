// psi/section.rs
//! Generic PSI section header reader and structural validator.
//!
//! Sections reach this module already reassembled and with stuffing
//! stripped (no pointer field). CRC-32 is not checked here: callers get
//! structural well-formedness only, never integrity.

use crate::constants::{MIN_SECTION_LEN, SECTION_HEADER_LEN, STUFFING_BYTE};
use crate::error::SectionError;

/// Long-form section header fields. Returned by [`SectionHeader::read`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHeader {
    pub table_id:           u8,
    pub section_length:     usize,
    pub table_id_extension: u16,
    pub version:            u8,
    pub current_next:       bool,
    pub section_number:     u8,
    pub last_section:       u8,
}

impl SectionHeader {
    /// Reads the first 8 header bytes. Does not validate.
    pub fn read(data: &[u8]) -> Result<Self, SectionError> {
        if data.len() < 8 {
            return Err(SectionError::TooShort);
        }
        Ok(Self {
            table_id:           data[0],
            section_length:     section_length(data),
            table_id_extension: u16::from_be_bytes([data[3], data[4]]),
            version:            (data[5] & 0x3E) >> 1,
            current_next:       data[5] & 0x01 != 0,
            section_number:     data[6],
            last_section:       data[7],
        })
    }

    /// Bytes between the fixed 8-byte header and the trailing CRC.
    pub fn body<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        let end = (SECTION_HEADER_LEN + self.section_length).min(data.len());
        if end < 12 {
            return &[];
        }
        &data[8..end - 4]
    }
}

/// 12-bit section_length field (bytes 1-2).
fn section_length(data: &[u8]) -> usize {
    (((data[1] & 0x0F) as usize) << 8) | data[2] as usize
}

/// Structural sanity checks, short-circuiting on the first failure.
pub fn validate_section(data: &[u8]) -> Result<(), SectionError> {
    if data.len() < MIN_SECTION_LEN {
        return Err(SectionError::TooShort);
    }
    // stuffing must be stripped by the transport layer (H.222.0 2.4.4)
    if data[0] == STUFFING_BYTE {
        return Err(SectionError::UnexpectedStuffing);
    }
    let declared = section_length(data) + SECTION_HEADER_LEN;
    if declared != data.len() {
        return Err(SectionError::LengthMismatch { declared, actual: data.len() });
    }
    let (section, last) = (data[6], data[7]);
    if section > last {
        return Err(SectionError::SectionNumberOutOfOrder { section, last });
    }
    Ok(())
}
