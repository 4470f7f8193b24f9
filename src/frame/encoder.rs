use bitvec::prelude::*;
use num_complex::Complex32;

use crate::constellation::{new_constellation, SquareConstellation};
use crate::decode::{
    new_conv_encoder, new_crc8, new_scrambler, AdditiveScrambler, ConvolutionalEncoder, Crc8,
};
use crate::frame::{ConfigError, FrameConfig};

/// Builds the on-air symbol stream the synchroniser expects: the sync word
/// followed by the scrambled, convolutionally encoded block
/// `[length LE | payload | CRC-8 | zero tail]`, everything packed into
/// symbols MSB first.
pub struct FrameEncoder {
    constellation: SquareConstellation,
    scrambler: AdditiveScrambler,
    conv: ConvolutionalEncoder,
    crc8: Crc8,
    preamble_pattern: u32,
}

pub fn new_frame_encoder(config: &FrameConfig) -> Result<FrameEncoder, ConfigError> {
    config.validate()?;
    Ok(FrameEncoder {
        constellation: new_constellation(config.constellation_side),
        scrambler: new_scrambler(config.scrambler_seed),
        conv: new_conv_encoder(config.generator_polys),
        crc8: new_crc8(config.crc8_poly),
        preamble_pattern: config.preamble_pattern,
    })
}

impl FrameEncoder {
    /// Symbol stream for one payload.
    pub fn encode(&mut self, payload: &[u8]) -> Vec<Complex32> {
        let mut frame = Vec::with_capacity(payload.len() + 4);
        frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        frame.extend_from_slice(payload);
        frame.push(self.crc8.process(payload));
        // K-1 zero tail bits, padded out to a byte
        frame.push(0x00);

        self.encode_raw(&frame)
    }

    /// Symbol stream for an already assembled frame block. Lets tests forge
    /// frames with broken length fields or checksums.
    pub fn encode_raw(&mut self, frame: &[u8]) -> Vec<Complex32> {
        self.conv.reset();
        self.scrambler.reset();

        let coded = self.conv.encode(frame);

        let mut air: BitVec<u8, Msb0> = BitVec::with_capacity(32 + coded.len() * 8);
        let sync_word = self.preamble_pattern.to_be_bytes();
        air.extend_from_bitslice(sync_word.view_bits::<Msb0>());
        for &byte in &coded {
            let scrambled = self.scrambler.process(byte);
            air.extend_from_bitslice(scrambled.view_bits::<Msb0>());
        }

        let bits_per_symbol = self.constellation.bits_per_symbol();
        air.chunks(bits_per_symbol)
            .map(|chunk| self.constellation.point(chunk.load_be::<u8>()))
            .collect()
    }
}
