mod crc8;
mod scrambler;
mod viterbi;

use itertools::Itertools;

pub use crc8::{new_crc8, Crc8};
pub use scrambler::{new_scrambler, AdditiveScrambler};
pub use viterbi::{
    new_conv_encoder, new_viterbi, ConvolutionalEncoder, ViterbiDecoder, CODE_RATE,
    CONSTRAINT_LENGTH,
};

/// Unpack bytes into 0/1 values, most significant bit first.
pub fn bytes_to_bits(bytes: &[u8]) -> Vec<u8> {
    let mut bits = Vec::with_capacity(bytes.len() * 8);

    for byte in bytes {
        for j in (0..8).rev() {
            bits.push((byte >> j) & 1);
        }
    }

    bits
}

/// Pack 0/1 values into bytes, most significant bit first.
pub fn bits_to_bytes(bits: &[u8]) -> Vec<u8> {
    assert!(bits.len().is_multiple_of(8));
    let mut bytes = Vec::with_capacity(bits.len() / 8);

    for chunk in &bits.iter().chunks(8) {
        bytes.push(chunk.fold(0u8, |acc, &bit| (acc << 1) | (bit & 1)));
    }

    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_roundtrip() {
        let bytes = [0x00, 0xff, 0xa5, 0x3c];
        let bits = bytes_to_bits(&bytes);
        assert_eq!(bits.len(), 32);
        assert_eq!(&bits[..8], &[0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&bits[8..16], &[1, 1, 1, 1, 1, 1, 1, 1]);
        assert_eq!(bits_to_bytes(&bits), bytes);
    }

    #[test]
    fn test_msb_first_order() {
        assert_eq!(bytes_to_bits(&[0x80])[0], 1);
        assert_eq!(bits_to_bytes(&[1, 0, 0, 0, 0, 0, 0, 0]), vec![0x80]);
    }
}
