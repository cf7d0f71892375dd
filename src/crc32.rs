//! C1: integrity check over received module bytes.
//!
//! Reversed CRC-32 (zlib / `ISO-HDLC`): seed `0xFFFFFFFF`, polynomial
//! `0xEDB88320` applied LSB-first, final bitwise complement. Deterministic,
//! stateless, pure, the same algorithm family the teacher used for its CRC-16
//! link check, just the zlib-compatible 32-bit variant this protocol needs.

use crc::{Crc, CRC_32_ISO_HDLC};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Computes the zlib-compatible CRC32 over `data`.
pub fn crc32(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input() {
        assert_eq!(crc32(b""), 0x0000_0000);
    }

    #[test]
    fn reference_vector() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn single_byte_flip_changes_crc() {
        let a = crc32(b"hello wasm");
        let mut flipped = b"hello wasm".to_vec();
        flipped[0] ^= 0x01;
        let b = crc32(&flipped);
        assert_ne!(a, b);
    }

    #[test]
    fn matches_manual_reference_implementation() {
        // Manual byte-at-a-time implementation per the spec's §4.1 description,
        // kept here only to cross-check the `crc` crate's table-driven one.
        fn manual(data: &[u8]) -> u32 {
            let mut crc: u32 = 0xFFFF_FFFF;
            for &byte in data {
                crc ^= byte as u32;
                for _ in 0..8 {
                    let mask = (crc & 1).wrapping_neg();
                    crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
                }
            }
            !crc
        }

        for sample in [&b""[..], b"123456789", b"the quick brown fox"] {
            assert_eq!(crc32(sample), manual(sample));
        }
    }
}
