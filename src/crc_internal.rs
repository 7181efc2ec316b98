//! Sensirion CRC-8 (polynomial 0x31, initial value 0xFF, no reflection).

use crc::{CRC_8_NRSC_5, Crc};

/// The checksum used by the SEN6X family for every transmitted word.
const SENSIRION_CRC: Crc<u8> = Crc::<u8>::new(&CRC_8_NRSC_5);

/// Generate the CRC for a single big-endian data word
pub(crate) fn generate_crc(data: &[u8; 2]) -> u8 {
    SENSIRION_CRC.checksum(data)
}

/// Check a `[msb, lsb, crc]` triple
pub(crate) fn is_valid(chunk: &[u8]) -> bool {
    chunk.len() == 3 && generate_crc(&[chunk[0], chunk[1]]) == chunk[2]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datasheet_example() {
        assert_eq!(generate_crc(&[0xBE, 0xEF]), 0x92);
    }

    #[test]
    fn test_is_valid() {
        assert!(is_valid(&[0xBE, 0xEF, 0x92]));
        assert!(!is_valid(&[0xBE, 0xEF, 0x93]));
        assert!(!is_valid(&[0xBE, 0xEF]));
    }
}
