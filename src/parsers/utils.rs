//! Exp-Golomb and RBSP helpers

use bitstream_io::{BigEndian, BitRead, BitReader};

/// Unsigned Exp-Golomb code.
pub fn ue<R: std::io::Read>(br: &mut BitReader<R, BigEndian>) -> Option<u32> {
    let mut zeros = 0u32;
    while br.read::<1, u8>().ok()? == 0 {
        zeros += 1;
        if zeros > 31 {
            return None;
        }
    }
    let mut val = 1u32;
    for _ in 0..zeros {
        val = (val << 1) | br.read::<1, u32>().ok()?;
    }
    Some(val - 1)
}

/// Signed Exp-Golomb code.
pub fn se<R: std::io::Read>(br: &mut BitReader<R, BigEndian>) -> Option<i32> {
    let k = i64::from(ue(br)?);
    let v = if k & 1 == 0 { -(k / 2) } else { (k + 1) / 2 };
    i32::try_from(v).ok()
}

/// Strips emulation prevention bytes (`00 00 03` → `00 00`).
pub fn remove_ep(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zeros = 0;
    for &b in data {
        if zeros >= 2 && b == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if b == 0 { zeros + 1 } else { 0 };
        out.push(b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_ep() {
        assert_eq!(remove_ep(&[0, 0, 3, 1, 0, 0, 3, 0, 0, 3]), vec![0, 0, 1, 0, 0, 0, 0]);
        assert_eq!(remove_ep(&[1, 0, 3]), vec![1, 0, 3]);
    }

    #[test]
    fn test_exp_golomb() {
        // 1 | 010 | 011 | 00100 → ue 0, 1, 2, 3
        let data = [0b1010_0110, 0b0100_0000];
        let mut br = BitReader::endian(&data[..], BigEndian);
        assert_eq!(ue(&mut br), Some(0));
        assert_eq!(ue(&mut br), Some(1));
        assert_eq!(ue(&mut br), Some(2));
        assert_eq!(ue(&mut br), Some(3));

        // 010 | 011 → se +1, -1
        let data = [0b0100_1100];
        let mut br = BitReader::endian(&data[..], BigEndian);
        assert_eq!(se(&mut br), Some(1));
        assert_eq!(se(&mut br), Some(-1));
    }
}
