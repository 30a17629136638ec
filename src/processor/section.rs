//! PSI section reassembly across TS packets.

use bytes::{Bytes, BytesMut};

use crate::constants::{SECTION_HEADER_LEN, STUFFING_BYTE};

/// Per-PID section reassembler.
///
/// Emits each complete section without pointer field or stuffing. Data
/// before the first payload_unit_start packet is ignored.
#[derive(Debug, Default)]
pub struct SectionAssembler {
    buf: BytesMut,
}

impl SectionAssembler {
    pub fn push(&mut self, payload: &[u8], unit_start: bool, out: &mut Vec<Bytes>) {
        if !unit_start {
            if !self.buf.is_empty() {
                self.buf.extend_from_slice(payload);
                self.drain(out);
            }
            return;
        }

        let Some((&pointer, rest)) = payload.split_first() else { return };
        let pointer = pointer as usize;
        if pointer > rest.len() {
            self.buf.clear();
            return;
        }
        // tail of the section in progress
        if !self.buf.is_empty() {
            self.buf.extend_from_slice(&rest[..pointer]);
            self.drain(out);
            self.buf.clear();
        }
        self.buf.extend_from_slice(&rest[pointer..]);
        self.drain(out);
    }

    pub fn reset(&mut self) {
        self.buf.clear();
    }

    fn drain(&mut self, out: &mut Vec<Bytes>) {
        loop {
            match self.buf.first() {
                None => return,
                Some(&STUFFING_BYTE) => {
                    // rest of the packet is stuffing
                    self.buf.clear();
                    return;
                }
                Some(_) => {}
            }
            if self.buf.len() < SECTION_HEADER_LEN {
                return;
            }
            let total = SECTION_HEADER_LEN + ((((self.buf[1] & 0x0F) as usize) << 8) | self.buf[2] as usize);
            if self.buf.len() < total {
                return;
            }
            out.push(self.buf.split_to(total).freeze());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(table_id: u8, body_len: usize) -> Vec<u8> {
        let mut s = vec![table_id, 0xB0, body_len as u8];
        s.extend((0..body_len).map(|i| i as u8));
        s
    }

    #[test]
    fn test_single_packet_with_stuffing() {
        let mut asm = SectionAssembler::default();
        let mut payload = vec![0];
        payload.extend(section(0x00, 13));
        payload.extend([0xFF; 20]);
        let mut out = Vec::new();
        asm.push(&payload, true, &mut out);
        assert_eq!(out, vec![Bytes::from(section(0x00, 13))]);

        asm.push(&[1, 2, 3], false, &mut out);
        assert_eq!(out.len(), 1, "no section in progress");
    }

    #[test]
    fn test_spanning_and_back_to_back() {
        let a = section(0xC8, 200);
        let b = section(0xC7, 10);
        let c = section(0xC8, 30);
        let mut asm = SectionAssembler::default();
        let mut out = Vec::new();

        let mut p1 = vec![0];
        p1.extend(&a[..150]);
        asm.push(&p1, true, &mut out);
        assert!(out.is_empty());

        // pointer skips the tail of `a`, then `b` and `c` follow back to back
        let tail = &a[150..];
        let mut p2 = vec![tail.len() as u8];
        p2.extend(tail);
        p2.extend(&b);
        p2.extend(&c[..10]);
        asm.push(&p2, true, &mut out);
        asm.push(&c[10..], false, &mut out);

        assert_eq!(out, vec![Bytes::from(a), Bytes::from(b), Bytes::from(c)]);
    }

    #[test]
    fn test_bad_pointer_resets() {
        let mut asm = SectionAssembler::default();
        let mut out = Vec::new();
        asm.push(&[0, 0xC8, 0xB0, 0x40, 1, 2], true, &mut out);
        asm.push(&[50, 1, 2], true, &mut out);
        asm.push(&[0; 64], false, &mut out);
        assert!(out.is_empty());
    }
}
