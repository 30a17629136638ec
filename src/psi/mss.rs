// psi/mss.rs
//! ATSC Multiple String Structure (A/65 6.10).
//!
//! ```text
//! number_strings                       8
//! for each string:
//!     ISO_639_language_code           24
//!     number_segments                  8
//!     for each segment:
//!         compression_type             8
//!         mode                         8
//!         number_bytes                 8
//!         compressed_string_byte[]
//! ```
//!
//! Only the first segment with no compression and UTF-16 mode is ever
//! needed as a display name, so decoding short-circuits on it.

use crate::constants::{COMPRESSION_TYPE_NO_COMPRESSION, MODE_UTF16, MSS_MIN_LEN};
use crate::error::SectionError;

/// One segment of one string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringSegment<'a> {
    pub compression_type: u8,
    pub mode:             u8,
    pub payload:          &'a [u8],
}

impl StringSegment<'_> {
    pub fn is_decodable(&self) -> bool {
        self.compression_type == COMPRESSION_TYPE_NO_COMPRESSION && self.mode == MODE_UTF16
    }
}

/// Iterator over `(language, segment)` pairs of every string in order.
///
/// Yields `Err(TooShort)` once and stops if a header or payload runs past
/// the limit.
pub struct Segments<'a> {
    data:          &'a [u8],
    pos:           usize,
    limit:         usize,
    strings_left:  u8,
    segments_left: u8,
    language:      [u8; 3],
    done:          bool,
}

impl<'a> Iterator for Segments<'a> {
    type Item = Result<([u8; 3], StringSegment<'a>), SectionError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            if self.segments_left == 0 {
                if self.strings_left == 0 {
                    self.done = true;
                    return None;
                }
                if self.pos + 4 > self.limit {
                    self.done = true;
                    return Some(Err(SectionError::TooShort));
                }
                let b = &self.data[self.pos..self.pos + 4];
                self.language = [b[0], b[1], b[2]];
                self.segments_left = b[3];
                self.strings_left -= 1;
                self.pos += 4;
                continue;
            }

            if self.pos + 3 > self.limit {
                self.done = true;
                return Some(Err(SectionError::TooShort));
            }
            let compression_type = self.data[self.pos];
            let mode = self.data[self.pos + 1];
            let n = self.data[self.pos + 2] as usize;
            self.pos += 3;
            if self.pos + n > self.limit {
                self.done = true;
                return Some(Err(SectionError::TooShort));
            }
            let payload = &self.data[self.pos..self.pos + n];
            self.pos += n;
            self.segments_left -= 1;
            return Some(Ok((self.language, StringSegment { compression_type, mode, payload })));
        }
        None
    }
}

/// Starts a traversal of the structure in `data[offset..limit]`.
pub fn segments(data: &[u8], offset: usize, limit: usize) -> Result<Segments<'_>, SectionError> {
    let limit = limit.min(data.len());
    if offset + MSS_MIN_LEN > limit {
        return Err(SectionError::TooShort);
    }
    let strings = data[offset];
    if strings == 0 {
        return Err(SectionError::NoStrings);
    }
    Ok(Segments {
        data,
        pos: offset + 1,
        limit,
        strings_left: strings,
        segments_left: 0,
        language: [0; 3],
        done: false,
    })
}

/// Returns the first UTF-16 / uncompressed segment across all strings.
pub fn decode_multiple_string(data: &[u8], offset: usize, limit: usize) -> Result<String, SectionError> {
    for item in segments(data, offset, limit)? {
        let (_, segment) = item?;
        if segment.is_decodable() {
            return Ok(decode_utf16be(segment.payload));
        }
    }
    Err(SectionError::NoSupportedSegment)
}

/// Lossy UTF-16BE decode; unpaired surrogates and a dangling odd byte
/// become U+FFFD.
pub(crate) fn decode_utf16be(bytes: &[u8]) -> String {
    let units = bytes.chunks_exact(2).map(|p| u16::from_be_bytes([p[0], p[1]]));
    let mut text: String = char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect();
    if bytes.len() % 2 == 1 {
        text.push(char::REPLACEMENT_CHARACTER);
    }
    text
}
