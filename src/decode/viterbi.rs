// Soft decision Viterbi decoder for the rate 1/2, K=3 frame FEC.
// Register-exchange-free design after Phil Karn's libfec: two metric buffers
// swapped per trellis step, one decision word per step, chainback along the
// surviving path. Metrics are i16 and renormalized before they can overflow.

use super::{bits_to_bytes, bytes_to_bits};

/* Encoder memory depth; the trellis has 2^(K-1) states */
pub const CONSTRAINT_LENGTH: usize = 3;
/* Output bits per input bit */
pub const CODE_RATE: usize = 2;

const NUM_STATES: usize = 1 << (CONSTRAINT_LENGTH - 1);

// Starting state gets zero error, everything else a large penalty so the
// survivor paths fan out from the known state.
const INITIAL_START_ERROR: i16 = 0;
const INITIAL_NON_START_ERROR: i16 = 3000;
// Shrink metrics back towards zero once any state gets near the i16 ceiling.
const RENORMALIZE_THRESHOLD: i16 = i16::MAX - 3000;

/* 8-bit parity lookup table */
const PARTAB: [u8; 256] = [
    0, 1, 1, 0, 1, 0, 0, 1, 1, 0, 0, 1, 0, 1, 1, 0, 1, 0, 0, 1, 0, 1, 1, 0, 0, 1, 1, 0, 1, 0, 0, 1,
    1, 0, 0, 1, 0, 1, 1, 0, 0, 1, 1, 0, 1, 0, 0, 1, 0, 1, 1, 0, 1, 0, 0, 1, 1, 0, 0, 1, 0, 1, 1, 0,
    1, 0, 0, 1, 0, 1, 1, 0, 0, 1, 1, 0, 1, 0, 0, 1, 0, 1, 1, 0, 1, 0, 0, 1, 1, 0, 0, 1, 0, 1, 1, 0,
    0, 1, 1, 0, 1, 0, 0, 1, 1, 0, 0, 1, 0, 1, 1, 0, 1, 0, 0, 1, 0, 1, 1, 0, 0, 1, 1, 0, 1, 0, 0, 1,
    1, 0, 0, 1, 0, 1, 1, 0, 0, 1, 1, 0, 1, 0, 0, 1, 0, 1, 1, 0, 1, 0, 0, 1, 1, 0, 0, 1, 0, 1, 1, 0,
    0, 1, 1, 0, 1, 0, 0, 1, 1, 0, 0, 1, 0, 1, 1, 0, 1, 0, 0, 1, 0, 1, 1, 0, 0, 1, 1, 0, 1, 0, 0, 1,
    0, 1, 1, 0, 1, 0, 0, 1, 1, 0, 0, 1, 0, 1, 1, 0, 1, 0, 0, 1, 0, 1, 1, 0, 0, 1, 1, 0, 1, 0, 0, 1,
    1, 0, 0, 1, 0, 1, 1, 0, 0, 1, 1, 0, 1, 0, 0, 1, 0, 1, 1, 0, 1, 0, 0, 1, 1, 0, 0, 1, 0, 1, 1, 0,
];

fn parity(x: u8) -> u8 {
    PARTAB[x as usize]
}

/// Rate 1/R convolutional encoder matched to [`ViterbiDecoder`]. The window
/// register holds the newest input bit in its low position; each output is
/// the parity of the window masked by one generator polynomial.
pub struct ConvolutionalEncoder {
    polys: [u8; CODE_RATE],
    window: u8,
}

pub fn new_conv_encoder(polys: [u8; CODE_RATE]) -> ConvolutionalEncoder {
    ConvolutionalEncoder { polys, window: 0 }
}

impl ConvolutionalEncoder {
    pub fn reset(&mut self) {
        self.window = 0;
    }

    pub fn encode_bit(&mut self, bit: u8) -> [u8; CODE_RATE] {
        self.window = ((self.window << 1) | (bit & 1)) & ((1 << CONSTRAINT_LENGTH) - 1);
        let mut out = [0u8; CODE_RATE];
        for (o, &poly) in out.iter_mut().zip(self.polys.iter()) {
            *o = parity(self.window & poly);
        }
        out
    }

    /// Encode a byte stream MSB first, producing CODE_RATE output bytes per
    /// input byte. Append a zero byte beforehand if the trellis must end in
    /// state 0.
    pub fn encode(&mut self, bytes: &[u8]) -> Vec<u8> {
        let mut coded = Vec::with_capacity(bytes.len() * 8 * CODE_RATE);
        for bit in bytes_to_bits(bytes) {
            coded.extend_from_slice(&self.encode_bit(bit));
        }
        bits_to_bytes(&coded)
    }
}

pub struct ViterbiDecoder {
    // branch_table[j][s]: expected soft value of output j on the branch
    // leaving state s with a zero input bit
    branch_table: [[i16; NUM_STATES / 2]; CODE_RATE],
    metrics: [[i16; NUM_STATES]; 2],
    curr: usize,
    // one word per trellis step, bit s = surviving predecessor of state s
    decisions: Vec<u8>,
    curr_decoded_bit: usize,
    soft_low: i16,
    soft_high: i16,
    max_metric: i16,
}

/// `max_decoded_bits` bounds the trellis length of one frame and sizes the
/// decision history up front; nothing allocates after construction.
pub fn new_viterbi(
    polys: [u8; CODE_RATE],
    max_decoded_bits: usize,
    soft_low: i16,
    soft_high: i16,
) -> ViterbiDecoder {
    assert!(max_decoded_bits > 0);
    assert!(soft_low <= soft_high);
    for &poly in &polys {
        // half the branch metrics are derived by complementing the other
        // half, which only holds when both end taps are present
        assert!(
            poly & 1 == 1 && poly >> (CONSTRAINT_LENGTH - 1) == 1,
            "generator polynomial {poly:#05b} must span the full register",
        );
    }

    let mut branch_table = [[0i16; NUM_STATES / 2]; CODE_RATE];
    for (j, &poly) in polys.iter().enumerate() {
        for (s, branch) in branch_table[j].iter_mut().enumerate() {
            *branch = if parity(((s as u8) << 1) & poly) == 1 {
                soft_high
            } else {
                soft_low
            };
        }
    }

    let mut vitdec = ViterbiDecoder {
        branch_table,
        metrics: [[0; NUM_STATES]; 2],
        curr: 0,
        decisions: vec![0; max_decoded_bits + CONSTRAINT_LENGTH - 1],
        curr_decoded_bit: 0,
        soft_low,
        soft_high,
        max_metric: CODE_RATE as i16 * (soft_high - soft_low),
    };
    vitdec.reset(0);
    vitdec
}

impl ViterbiDecoder {
    /// Prepare for a new frame: penalise every state except `starting_state`
    /// and zero the decision words the previous frame used (the update path
    /// ORs bits in).
    pub fn reset(&mut self, starting_state: usize) {
        self.metrics[0] = [INITIAL_NON_START_ERROR; NUM_STATES];
        self.metrics[0][starting_state & (NUM_STATES - 1)] = INITIAL_START_ERROR;
        self.curr = 0;
        for d in &mut self.decisions[..self.curr_decoded_bit] {
            *d = 0;
        }
        self.curr_decoded_bit = 0;
    }

    /// Decode hard encoded bytes, continuing the current frame. Each byte is
    /// expanded MSB first to the configured soft levels. The newly decoded
    /// region is chained back into `out`, which must be zeroed by the caller.
    /// Returns the number of bytes written.
    pub fn process(&mut self, encoded: &[u8], out: &mut [u8], terminated: bool) -> usize {
        let start_bit = self.curr_decoded_bit;
        let mut syms = [0i16; CODE_RATE];
        let mut filled = 0;
        for &byte in encoded {
            for bit in (0..8).rev() {
                syms[filled] = if (byte >> bit) & 1 == 1 {
                    self.soft_high
                } else {
                    self.soft_low
                };
                filled += 1;
                if filled == CODE_RATE {
                    self.step(&syms);
                    filled = 0;
                }
            }
        }
        self.finish(start_bit, out, terminated)
    }

    /// Decode raw soft values, CODE_RATE per trellis step. Same contract as
    /// [`ViterbiDecoder::process`] but lets the caller grade each bit.
    pub fn process_soft(&mut self, soft: &[i16], out: &mut [u8], terminated: bool) -> usize {
        debug_assert!(soft.len().is_multiple_of(CODE_RATE));
        let start_bit = self.curr_decoded_bit;
        let mut syms = [0i16; CODE_RATE];
        for chunk in soft.chunks_exact(CODE_RATE) {
            syms.copy_from_slice(chunk);
            self.step(&syms);
        }
        self.finish(start_bit, out, terminated)
    }

    /// Accumulated path metric of `state` after the last processed step.
    /// This is the decoded-error quality score: zero on a clean channel,
    /// growing with every corrected bit.
    pub fn error(&self, state: usize) -> i16 {
        self.metrics[self.curr][state % NUM_STATES]
    }

    /// State with the smallest accumulated metric, lowest index on ties.
    pub fn best_state(&self) -> usize {
        let metrics = &self.metrics[self.curr];
        let mut best = 0;
        for (state, &err) in metrics.iter().enumerate() {
            if err < metrics[best] {
                best = state;
            }
        }
        best
    }

    fn finish(&mut self, start_bit: usize, out: &mut [u8], terminated: bool) -> usize {
        let nbits = self.curr_decoded_bit - start_bit;
        debug_assert!(nbits.is_multiple_of(8));
        let endstate = if terminated { 0 } else { self.best_state() };
        self.chainback(out, start_bit, endstate);
        nbits / 8
    }

    /// One add-compare-select pass over all butterflies.
    fn step(&mut self, syms: &[i16; CODE_RATE]) {
        debug_assert!(self.curr_decoded_bit < self.decisions.len());

        let (left, right) = self.metrics.split_at_mut(1);
        let (old, new) = if self.curr == 0 {
            (&left[0], &mut right[0])
        } else {
            (&right[0], &mut left[0])
        };

        let mut decision_bits = 0u8;
        for i in 0..NUM_STATES / 2 {
            let mut metric = 0i16;
            for j in 0..CODE_RATE {
                metric += (self.branch_table[j][i] - syms[j]).abs();
            }

            // Branches from state i+NUM_STATES/2 and the input-one branches
            // carry the complemented outputs, hence the mirrored metric.
            let m0 = old[i] + metric;
            let m1 = old[i + NUM_STATES / 2] + (self.max_metric - metric);
            let m2 = old[i] + (self.max_metric - metric);
            let m3 = old[i + NUM_STATES / 2] + metric;

            let d0 = m0 > m1;
            let d1 = m2 > m3;
            new[2 * i] = if d0 { m1 } else { m0 };
            new[2 * i + 1] = if d1 { m3 } else { m2 };
            decision_bits |= (d0 as u8) << (2 * i);
            decision_bits |= (d1 as u8) << (2 * i + 1);
        }

        if new.iter().any(|&m| m > RENORMALIZE_THRESHOLD) {
            let min = *new.iter().min().unwrap();
            for m in new.iter_mut() {
                *m -= min;
            }
        }

        self.decisions[self.curr_decoded_bit] |= decision_bits;
        self.curr_decoded_bit += 1;
        self.curr ^= 1;
    }

    /// Walk the surviving path backwards from `endstate`. The input bit of
    /// each step is the low bit of the state it leads to; the decision word
    /// picks which predecessor the walk continues through. Bits decoded
    /// before `start_bit` belong to an earlier pass and are left alone.
    fn chainback(&self, out: &mut [u8], start_bit: usize, endstate: usize) {
        let mut state = endstate & (NUM_STATES - 1);
        for t in (start_bit..self.curr_decoded_bit).rev() {
            let input = (state & 1) as u8;
            let i = t - start_bit;
            out[i / 8] |= input << (7 - (i % 8));
            let decision = (self.decisions[t] >> state) & 1;
            state = (state >> 1) | ((decision as usize) << (CONSTRAINT_LENGTH - 2));
        }
    }
}
