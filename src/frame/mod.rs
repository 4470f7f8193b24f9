use thiserror::Error;

use crate::decode::{CODE_RATE, CONSTRAINT_LENGTH};

pub mod encoder;
pub mod preamble;
pub mod sync;

pub use encoder::{new_frame_encoder, FrameEncoder};
pub use preamble::{new_detector, PreambleDetector};
pub use sync::{new_synchroniser, FrameSynchroniser};

/// Encoded bytes buffered before the length field is decoded. 16 encoded
/// bytes decode to 8 bytes at rate 1/2: the two length bytes plus margin.
pub const PREFIX_ENCODED_BYTES: usize = 16;

/// Length field, CRC-8 and trellis terminator around the payload.
pub const FRAME_OVERHEAD: usize = 4;

/// Outcome of feeding one symbol to the synchroniser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    None,
    PreambleFound {
        selected_phase: usize,
        phase_conflict: bool,
        desync_bitcount: i32,
    },
    BlockSizeOk {
        length: u16,
    },
    BlockSizeErr {
        length: u16,
    },
    PayloadOk(Payload),
    PayloadErr(Payload),
}

/// A decoded frame. Carried by value on PAYLOAD_OK and, for diagnostics,
/// on PAYLOAD_ERR as well.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub length: u16,
    pub bytes: Vec<u8>,
    pub crc8_received: u8,
    pub crc8_calculated: u8,
    /// Accumulated Viterbi metric; zero on a clean channel.
    pub decoded_error: i32,
}

/// Receiver configuration. Defaults mirror the transmitter this protocol
/// was built against: 16-QAM, a 32-bit sync word, rate-1/2 K=3 coding.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    pub preamble_pattern: u32,
    /// Phase rotations tried in parallel by the preamble detector.
    pub total_phases: usize,
    pub scrambler_seed: u16,
    pub crc8_poly: u8,
    pub generator_polys: [u8; CODE_RATE],
    /// Side length of the square constellation.
    pub constellation_side: usize,
    /// Size of the encoded-frame buffer; bounds the payload length.
    pub max_frame_bytes: usize,
    pub soft_low: i16,
    pub soft_high: i16,
}

impl Default for FrameConfig {
    fn default() -> Self {
        FrameConfig {
            preamble_pattern: 0xf9af_cd6d,
            total_phases: 4,
            scrambler_seed: 0x8559,
            crc8_poly: 0xd5,
            generator_polys: [0b111, 0b101],
            constellation_side: 4,
            max_frame_bytes: 1024,
            soft_low: -127,
            soft_high: 127,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("constellation side {0} is not a power of two >= 2")]
    BadConstellation(usize),
    #[error("{0} bits per symbol does not divide a byte")]
    BadSymbolWidth(usize),
    #[error("generator polynomial {0:#05b} must have its top and bottom taps set")]
    BadPolynomial(u8),
    #[error("frame buffer of {0} bytes is smaller than two length prefixes")]
    BufferTooSmall(usize),
    #[error("soft decision levels are inverted: {low} > {high}")]
    BadSoftLevels { low: i16, high: i16 },
    #[error("at least one phase hypothesis is required")]
    NoPhases,
}

impl FrameConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.total_phases == 0 {
            return Err(ConfigError::NoPhases);
        }
        if self.constellation_side < 2 || !self.constellation_side.is_power_of_two() {
            return Err(ConfigError::BadConstellation(self.constellation_side));
        }
        let bits_per_symbol = (self.constellation_side * self.constellation_side)
            .trailing_zeros() as usize;
        if !8usize.is_multiple_of(bits_per_symbol) {
            return Err(ConfigError::BadSymbolWidth(bits_per_symbol));
        }
        for &poly in &self.generator_polys {
            let top = poly >> (CONSTRAINT_LENGTH - 1);
            if poly & 1 != 1 || top != 1 {
                return Err(ConfigError::BadPolynomial(poly));
            }
        }
        if self.max_frame_bytes < 2 * PREFIX_ENCODED_BYTES {
            return Err(ConfigError::BufferTooSmall(self.max_frame_bytes));
        }
        if self.soft_low > self.soft_high {
            return Err(ConfigError::BadSoftLevels {
                low: self.soft_low,
                high: self.soft_high,
            });
        }
        Ok(())
    }
}
