//! Frame checksum.
//!
//! Bit-serial CRC-16 with polynomial 0x1021, seed 0, MSB first and no final
//! XOR. The controller firmware runs the same loop, so the result must match
//! bit for bit.

/// CRC-16 generator polynomial.
pub const POLYNOMIAL: u16 = 0x1021;

/// Compute the 16-bit CRC of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    // 17-bit working register; bit 16 is the carry out of the shift.
    let mut crc: u32 = 0;
    for &byte in data {
        crc ^= u32::from(byte) << 8;
        for _ in 0..8 {
            crc <<= 1;
            if crc & 0x1_0000 != 0 {
                crc = (crc ^ u32::from(POLYNOMIAL)) & 0xFFFF;
            }
        }
    }
    #[allow(clippy::cast_possible_truncation)] // register is masked to 16 bits
    let crc = crc as u16;
    crc
}

/// Compute the checksum of `data` in frame slot order: `[low, high]`.
pub fn checksum(data: &[u8]) -> [u8; 2] {
    crc16(data).to_le_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crc_any::CRCu16;

    #[test]
    fn test_checksum_zero_byte() {
        assert_eq!(checksum(&[0x00]), [0x00, 0x00]);
        assert_eq!(checksum(&[0u8; 64]), [0x00, 0x00]);
    }

    #[test]
    fn test_checksum_empty_is_seed() {
        assert_eq!(crc16(&[]), 0);
    }

    #[test]
    fn test_checksum_single_bit() {
        // 0x01 shifts out through bit 16 on the last round only.
        assert_eq!(crc16(&[0x01]), 0x1021);
        assert_eq!(checksum(&[0x01]), [0x21, 0x10]);
    }

    #[test]
    fn test_checksum_check_string() {
        assert_eq!(crc16(b"123456789"), 0x31C3);
        assert_eq!(checksum(b"123456789"), [0xC3, 0x31]);
    }

    #[test]
    fn test_checksum_deterministic() {
        let data: Vec<u8> = (0..=255).collect();
        assert_eq!(checksum(&data), checksum(&data));
    }

    #[test]
    fn test_matches_reference_xmodem() {
        let samples: [&[u8]; 4] = [
            b"kbdflash",
            &[0x03; 64],
            &[0xFF, 0x00, 0xFF, 0x00, 0x10, 0x21],
            &[0x01, 0x02, 0x00, 0x00, 0x00, 0x00, 0x28, 0x00],
        ];
        for sample in samples {
            let mut reference = CRCu16::crc16xmodem();
            reference.digest(sample);
            assert_eq!(crc16(sample), reference.get_crc(), "sample {sample:02x?}");
        }
    }
}
