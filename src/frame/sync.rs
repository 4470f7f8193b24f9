use num_complex::Complex32;

use crate::constellation::{new_constellation, SquareConstellation};
use crate::decode::{
    new_crc8, new_scrambler, new_viterbi, AdditiveScrambler, Crc8, ViterbiDecoder, CODE_RATE,
};
use crate::frame::{
    new_detector, ConfigError, FrameConfig, FrameEvent, Payload, PreambleDetector,
    FRAME_OVERHEAD, PREFIX_ENCODED_BYTES,
};

enum State {
    WaitPreamble,
    WaitBlockSize,
    WaitPayload,
}

/// Drives one packet at a time from preamble hunt to CRC check. Owns every
/// stage of the pipeline and all working buffers; processing a symbol never
/// allocates.
pub struct FrameSynchroniser {
    constellation: SquareConstellation,
    detector: PreambleDetector,
    descrambler: AdditiveScrambler,
    vitdec: ViterbiDecoder,
    crc8: Crc8,

    state: State,
    buffer_size: usize,
    descramble_buffer: Vec<u8>,
    encoded_buffer: Vec<u8>,
    decoded_buffer: Vec<u8>,

    // cursor into the byte being assembled, and past it
    encoded_bits: usize,
    encoded_bytes: usize,
    decoded_bytes: usize,

    decoded_block_size: usize,
    encoded_block_size: usize,
}

pub fn new_synchroniser(config: FrameConfig) -> Result<FrameSynchroniser, ConfigError> {
    config.validate()?;

    let buffer_size = config.max_frame_bytes;
    Ok(FrameSynchroniser {
        constellation: new_constellation(config.constellation_side),
        detector: new_detector(config.preamble_pattern, config.total_phases),
        descrambler: new_scrambler(config.scrambler_seed),
        vitdec: new_viterbi(
            config.generator_polys,
            buffer_size * 8 / CODE_RATE,
            config.soft_low,
            config.soft_high,
        ),
        crc8: new_crc8(config.crc8_poly),
        state: State::WaitPreamble,
        buffer_size,
        descramble_buffer: vec![0; buffer_size],
        encoded_buffer: vec![0; buffer_size],
        decoded_buffer: vec![0; buffer_size],
        encoded_bits: 0,
        encoded_bytes: 0,
        decoded_bytes: 0,
        decoded_block_size: 0,
        encoded_block_size: 0,
    })
}

impl FrameSynchroniser {
    /// Feed one demodulated symbol. Exactly one event comes back; almost
    /// always [`FrameEvent::None`].
    pub fn process(&mut self, iq: Complex32) -> FrameEvent {
        match self.state {
            State::WaitPreamble => self.process_await_preamble(iq),
            State::WaitBlockSize => self.process_await_block_size(iq),
            State::WaitPayload => self.process_await_payload(iq),
        }
    }

    fn process_await_preamble(&mut self, iq: Complex32) -> FrameEvent {
        if !self.detector.process(iq, &self.constellation) {
            return FrameEvent::None;
        }

        // the phase stays latched until this frame resolves
        self.reset_decoders();
        self.state = State::WaitBlockSize;
        FrameEvent::PreambleFound {
            selected_phase: self.detector.selected_phase(),
            phase_conflict: self.detector.phase_conflict(),
            desync_bitcount: self.detector.desync_bitcount(),
        }
    }

    fn process_await_block_size(&mut self, iq: Complex32) -> FrameEvent {
        self.buffer_symbol(iq);
        let is_done = self.encoded_bytes >= PREFIX_ENCODED_BYTES && self.encoded_bits == 0;
        if !is_done {
            return FrameEvent::None;
        }

        // not terminated: the trellis is mid-frame, chain back from the
        // best state
        self.decoded_bytes += self.vitdec.process(
            &self.encoded_buffer[..PREFIX_ENCODED_BYTES],
            &mut self.decoded_buffer[..],
            false,
        );

        let length = u16::from_le_bytes([self.decoded_buffer[0], self.decoded_buffer[1]]);
        let max_block = self.buffer_size / 2 - FRAME_OVERHEAD;
        // anything shorter is already fully inside the prefix
        let min_block = PREFIX_ENCODED_BYTES / 2 - 3;

        if (length as usize) > max_block || (length as usize) < min_block {
            self.state = State::WaitPreamble;
            FrameEvent::BlockSizeErr { length }
        } else {
            self.decoded_block_size = length as usize;
            self.encoded_block_size = CODE_RATE * (self.decoded_block_size + FRAME_OVERHEAD);
            self.state = State::WaitPayload;
            FrameEvent::BlockSizeOk { length }
        }
    }

    fn process_await_payload(&mut self, iq: Complex32) -> FrameEvent {
        self.buffer_symbol(iq);
        let is_done = self.encoded_bytes >= self.encoded_block_size && self.encoded_bits == 0;
        if !is_done {
            return FrameEvent::None;
        }

        // tail bits are known zero, so the chainback is pinned to state 0
        let start = self.decoded_bytes;
        self.decoded_bytes += self.vitdec.process(
            &self.encoded_buffer[PREFIX_ENCODED_BYTES..self.encoded_block_size],
            &mut self.decoded_buffer[start..],
            true,
        );

        // 0..2 length, 2..2+N payload, then CRC-8 and the trellis terminator
        let n = self.decoded_block_size;
        let payload_bytes = &self.decoded_buffer[2..2 + n];
        let crc8_received = self.decoded_buffer[self.decoded_bytes - 2];
        let crc8_calculated = self.crc8.process(payload_bytes);

        let payload = Payload {
            length: n as u16,
            bytes: payload_bytes.to_vec(),
            crc8_received,
            crc8_calculated,
            decoded_error: self.vitdec.error(0) as i32,
        };

        self.state = State::WaitPreamble;
        if crc8_received != crc8_calculated {
            FrameEvent::PayloadErr(payload)
        } else {
            FrameEvent::PayloadOk(payload)
        }
    }

    /// Demap one symbol under the latched phase and pack its bits MSB first
    /// into the byte being assembled; completed bytes are descrambled into
    /// the encoded buffer.
    fn buffer_symbol(&mut self, iq: Complex32) {
        let iq_phi = iq * self.detector.mixer(self.detector.selected_phase());
        let sym = self.constellation.nearest(iq_phi);
        let bits_per_symbol = self.constellation.bits_per_symbol();

        if self.encoded_bits == 0 {
            self.descramble_buffer[self.encoded_bytes] = 0;
        }
        self.descramble_buffer[self.encoded_bytes] |=
            sym << (8 - bits_per_symbol - self.encoded_bits);

        self.encoded_bits += bits_per_symbol;
        if self.encoded_bits == 8 {
            self.encoded_bits = 0;
            self.encoded_buffer[self.encoded_bytes] = self
                .descrambler
                .process(self.descramble_buffer[self.encoded_bytes]);
            self.encoded_bytes += 1;
        }
    }

    fn reset_decoders(&mut self) {
        // both the Viterbi chainback and the decision updates OR bits in,
        // so everything the previous frame touched goes back to zero
        for byte in &mut self.decoded_buffer[..self.decoded_bytes] {
            *byte = 0;
        }

        self.encoded_bits = 0;
        self.encoded_bytes = 0;
        self.decoded_bytes = 0;
        self.decoded_block_size = 0;
        self.encoded_block_size = 0;

        self.descrambler.reset();
        self.vitdec.reset(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::new_frame_encoder;

    fn run(sync: &mut FrameSynchroniser, symbols: &[Complex32]) -> Vec<FrameEvent> {
        symbols
            .iter()
            .map(|&iq| sync.process(iq))
            .filter(|e| *e != FrameEvent::None)
            .collect()
    }

    #[test]
    fn test_happy_path_event_order() {
        let config = FrameConfig::default();
        let mut encoder = new_frame_encoder(&config).unwrap();
        let mut sync = new_synchroniser(config).unwrap();

        let payload = [0x10, 0x20, 0x30, 0x40, 0x50, 0x60];
        let events = run(&mut sync, &encoder.encode(&payload));

        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], FrameEvent::PreambleFound { .. }));
        assert!(matches!(events[1], FrameEvent::BlockSizeOk { length: 6 }));
        match &events[2] {
            FrameEvent::PayloadOk(p) => {
                assert_eq!(p.bytes, payload);
                assert_eq!(p.decoded_error, 0);
            }
            other => panic!("expected PayloadOk, got {other:?}"),
        }
    }

    #[test]
    fn test_length_above_buffer_is_rejected() {
        let config = FrameConfig {
            max_frame_bytes: 64,
            ..Default::default()
        };
        let mut encoder = new_frame_encoder(&FrameConfig::default()).unwrap();
        let mut sync = new_synchroniser(config).unwrap();

        // 40 > 64/2 - 4
        let payload = [0xaa; 40];
        let events = run(&mut sync, &encoder.encode(&payload));

        assert!(matches!(events[0], FrameEvent::PreambleFound { .. }));
        assert!(matches!(events[1], FrameEvent::BlockSizeErr { length: 40 }));
        // nothing of the rejected frame surfaces as a payload
        assert!(events
            .iter()
            .all(|e| !matches!(e, FrameEvent::PayloadOk(_) | FrameEvent::PayloadErr(_))));
    }

    #[test]
    fn test_length_below_prefix_is_rejected() {
        let config = FrameConfig::default();
        let mut encoder = new_frame_encoder(&config).unwrap();
        let mut sync = new_synchroniser(config).unwrap();

        // 4 < 16/2 - 3: the whole frame would fit inside the prefix decode
        let events = run(&mut sync, &encoder.encode(&[1, 2, 3, 4]));

        assert!(matches!(events[1], FrameEvent::BlockSizeErr { length: 4 }));
    }

    #[test]
    fn test_recovers_after_rejected_frame() {
        let config = FrameConfig::default();
        let mut encoder = new_frame_encoder(&config).unwrap();
        let mut sync = new_synchroniser(config).unwrap();

        run(&mut sync, &encoder.encode(&[1, 2, 3, 4]));

        let payload = [9, 8, 7, 6, 5, 4, 3, 2, 1, 0];
        let events = run(&mut sync, &encoder.encode(&payload));
        match events.last() {
            Some(FrameEvent::PayloadOk(p)) => assert_eq!(p.bytes, payload),
            other => panic!("expected PayloadOk, got {other:?}"),
        }
    }

    #[test]
    fn test_back_to_back_frames_in_order() {
        let config = FrameConfig::default();
        let mut encoder = new_frame_encoder(&config).unwrap();
        let mut sync = new_synchroniser(config).unwrap();

        let mut symbols = Vec::new();
        symbols.extend(encoder.encode(b"first frame"));
        symbols.extend(encoder.encode(b"second frame"));

        let payloads: Vec<Vec<u8>> = run(&mut sync, &symbols)
            .into_iter()
            .filter_map(|e| match e {
                FrameEvent::PayloadOk(p) => Some(p.bytes),
                _ => None,
            })
            .collect();

        assert_eq!(payloads, vec![b"first frame".to_vec(), b"second frame".to_vec()]);
    }
}
