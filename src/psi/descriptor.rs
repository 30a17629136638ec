// psi/descriptor.rs
//! Descriptor loop scanner (ISO/IEC 13818-1 2.6).
//!
//! Malformed descriptor loops degrade to fewer descriptors, never to an
//! error: the enclosing table is still usable without them.

use tracing::debug;

use super::mss::decode_multiple_string;
use crate::constants::DESCRIPTOR_TAG_EXTENDED_CHANNEL_NAME;

/// Descriptors this crate materializes. Unknown tags are skipped by length.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Descriptor {
    /// Extended channel name descriptor (A/65 6.9.4, tag 0xA0).
    ExtendedChannelName { long_name: String },
}

impl Descriptor {
    pub fn tag(&self) -> u8 {
        match self {
            Descriptor::ExtendedChannelName { .. } => DESCRIPTOR_TAG_EXTENDED_CHANNEL_NAME,
        }
    }
}

/// Scans `data[offset..limit]` as a tag-length-value loop.
///
/// Every iteration consumes at least the 2-byte tag/length header, so a
/// zero-length entry cannot stall the scan. A body running past `limit`
/// ends the scan with what was collected so far. A `limit` past the end of
/// `data` yields no descriptors.
pub fn scan_descriptors(data: &[u8], offset: usize, limit: usize) -> Vec<Descriptor> {
    let mut descriptors = Vec::new();
    if limit > data.len() {
        debug!(limit, len = data.len(), "descriptor loop runs past buffer");
        return descriptors;
    }
    let mut pos = offset;

    while pos + 2 <= limit {
        let tag = data[pos];
        let len = data[pos + 1] as usize;
        pos += 2;
        if len == 0 {
            continue;
        }
        if pos + len > limit {
            debug!(tag, len, remaining = limit - pos, "descriptor runs past loop end");
            break;
        }

        match tag {
            DESCRIPTOR_TAG_EXTENDED_CHANNEL_NAME => match decode_multiple_string(data, pos, pos + len) {
                Ok(long_name) => descriptors.push(Descriptor::ExtendedChannelName { long_name }),
                Err(e) => debug!(error = %e, "dropping extended channel name descriptor"),
            },
            _ => debug!("skipping descriptor 0x{tag:02X} ({len} bytes)"),
        }
        pos += len;
    }
    descriptors
}
