// psi/tvct.rs
//! Terrestrial Virtual Channel Table (A/65 6.4), one channel per section.
//!
//! Field offsets below are fixed by the one-channel record layout:
//!
//! ```text
//!  0      table_id (0xC8)
//!  1..3   section_syntax / section_length
//!  3..8   transport_stream_id, version, section_number, last_section_number
//!  8      protocol_version
//!  9      num_channels_in_section
//! 10..24  short_name (7 x UTF-16)
//! 24..27  reserved(4) major_channel_number(10) minor_channel_number(10)
//! 27..40  modulation .. source_id
//! 40..42  reserved(6) descriptors_length(10)
//! 42..    descriptors
//! ```

use bitstream_io::{BigEndian, BitRead, BitReader};
use tracing::debug;

use super::descriptor::{scan_descriptors, Descriptor};
use super::mss::decode_utf16be;
use super::section::validate_section;
use crate::constants::*;
use crate::error::SectionError;
use crate::types::ChannelIdentity;

/// Parses a TVCT section describing exactly one channel.
///
/// The extended channel name, if present, replaces the short name.
pub fn parse_tvct(data: &[u8]) -> Result<ChannelIdentity, SectionError> {
    validate_section(data)?;

    let num_channels = data[TVCT_NUM_CHANNELS_OFFSET];
    if num_channels != 1 {
        return Err(SectionError::UnexpectedChannelCount(num_channels));
    }
    if data.len() < TVCT_MIN_LEN {
        return Err(SectionError::TooShort);
    }

    let short_name = &data[TVCT_SHORT_NAME_OFFSET..TVCT_SHORT_NAME_OFFSET + TVCT_SHORT_NAME_LEN];
    // 0x0000 pads the name out to 7 code units
    let name_len = short_name
        .chunks_exact(2)
        .position(|unit| unit == [0, 0])
        .map_or(TVCT_SHORT_NAME_LEN, |units| units * 2);
    let mut name = decode_utf16be(&short_name[..name_len]);

    let mut br = BitReader::endian(&data[TVCT_CHANNEL_NUMBER_OFFSET..TVCT_CHANNEL_NUMBER_OFFSET + 3], BigEndian);
    br.skip(4).map_err(|_| SectionError::TooShort)?;
    let major_number = br.read::<10, u16>().map_err(|_| SectionError::TooShort)?;
    let minor_number = br.read::<10, u16>().map_err(|_| SectionError::TooShort)?;
    debug!(short_name = %name, major_number, minor_number, "TVCT channel");

    let mut br = BitReader::endian(&data[TVCT_DESCRIPTORS_LENGTH_OFFSET..TVCT_DESCRIPTORS_OFFSET], BigEndian);
    br.skip(6).map_err(|_| SectionError::TooShort)?;
    let descriptors_length = br.read::<10, u16>().map_err(|_| SectionError::TooShort)? as usize;

    for descriptor in scan_descriptors(data, TVCT_DESCRIPTORS_OFFSET, TVCT_DESCRIPTORS_OFFSET + descriptors_length) {
        match descriptor {
            Descriptor::ExtendedChannelName { long_name } => {
                debug!(long_name = %long_name, "TVCT extended channel name");
                name = long_name;
            }
        }
    }

    Ok(ChannelIdentity { name, major_number, minor_number })
}
