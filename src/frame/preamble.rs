use num_complex::Complex32;

use crate::constellation::SquareConstellation;

/// Sliding 32-bit register compared against the sync word after every
/// symbol. Symbols shift in MSB first, so the register always holds the
/// last 32 received bits.
struct PreambleFilter {
    pattern: u32,
    register: u32,
}

impl PreambleFilter {
    fn process(&mut self, symbol: u8, bits: usize) -> bool {
        self.register = (self.register << bits) | symbol as u32;
        self.register == self.pattern
    }

    fn length(&self) -> usize {
        u32::BITS as usize
    }
}

/// Runs one preamble filter per candidate phase rotation. QPSK and square
/// QAM are invariant under quarter turns, so the carrier loop can lock a
/// multiple of 2*pi/M away from the transmitter; whichever rotated filter
/// matches tells us the offset and marks the frame boundary in one pass.
pub struct PreambleDetector {
    filters: Vec<PreambleFilter>,
    mixers: Vec<Complex32>,
    selected_phase: usize,
    phase_conflict: bool,
    desync_bitcount: i32,
    bits_since_preamble: i32,
}

pub fn new_detector(pattern: u32, total_phases: usize) -> PreambleDetector {
    use std::f32::consts::TAU;

    let filters = (0..total_phases)
        .map(|_| PreambleFilter {
            pattern,
            register: 0,
        })
        .collect();
    let mixers = (0..total_phases)
        .map(|k| Complex32::from_polar(1.0, TAU * k as f32 / total_phases as f32))
        .collect();

    PreambleDetector {
        filters,
        mixers,
        selected_phase: 0,
        phase_conflict: false,
        desync_bitcount: 0,
        bits_since_preamble: 0,
    }
}

impl PreambleDetector {
    /// Feed one symbol; true when any rotated filter just matched. When
    /// several phases match on the same symbol the last one wins and the
    /// conflict flag is raised for the caller to judge.
    pub fn process(&mut self, iq: Complex32, constellation: &SquareConstellation) -> bool {
        let bits_per_symbol = constellation.bits_per_symbol();
        self.bits_since_preamble += bits_per_symbol as i32;

        let mut total_found = 0;
        for (i, filter) in self.filters.iter_mut().enumerate() {
            let iq_phi = iq * self.mixers[i];
            let sym = constellation.nearest(iq_phi);
            if !filter.process(sym, bits_per_symbol) {
                continue;
            }

            self.selected_phase = i;
            total_found += 1;
            self.desync_bitcount = self.bits_since_preamble - filter.length() as i32;
        }

        if total_found > 0 {
            self.phase_conflict = total_found > 1;
            self.bits_since_preamble = 0;
            return true;
        }

        false
    }

    pub fn selected_phase(&self) -> usize {
        self.selected_phase
    }

    pub fn phase_conflict(&self) -> bool {
        self.phase_conflict
    }

    /// Bit misalignment of the match within the symbol stream, measured
    /// against the previous synchronisation point.
    pub fn desync_bitcount(&self) -> i32 {
        self.desync_bitcount
    }

    /// Rotator for a phase hypothesis; the synchroniser applies the
    /// selected one to every payload symbol.
    pub fn mixer(&self, phase: usize) -> Complex32 {
        self.mixers[phase]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constellation::new_constellation;

    const PATTERN: u32 = 0xf9af_cd6d;

    fn preamble_symbols(pattern: u32) -> Vec<u8> {
        (0..8).rev().map(|i| ((pattern >> (i * 4)) & 0xf) as u8).collect()
    }

    #[test]
    fn test_detects_preamble_at_phase_zero() {
        let constellation = new_constellation(4);
        let mut detector = new_detector(PATTERN, 4);

        let symbols = preamble_symbols(PATTERN);
        for (n, &sym) in symbols.iter().enumerate() {
            let fired = detector.process(constellation.point(sym), &constellation);
            assert_eq!(fired, n == symbols.len() - 1);
        }

        assert_eq!(detector.selected_phase(), 0);
        assert!(!detector.phase_conflict());
        assert_eq!(detector.desync_bitcount(), 0);
    }

    #[test]
    fn test_detects_rotated_preamble() {
        let constellation = new_constellation(4);
        let mut detector = new_detector(PATTERN, 4);

        // a stream the carrier loop locked one quarter turn off is undone
        // by hypothesis 1
        let rotation = detector.mixer(1).conj();
        let mut fired = false;
        for &sym in &preamble_symbols(PATTERN) {
            fired = detector.process(constellation.point(sym) * rotation, &constellation);
        }

        assert!(fired);
        assert_eq!(detector.selected_phase(), 1);
        assert!(!detector.phase_conflict());
    }

    #[test]
    fn test_desync_counts_extra_bits() {
        let constellation = new_constellation(4);
        let mut detector = new_detector(PATTERN, 4);

        // three junk symbols ahead of the sync word
        for _ in 0..3 {
            detector.process(constellation.point(0), &constellation);
        }
        for &sym in &preamble_symbols(PATTERN) {
            detector.process(constellation.point(sym), &constellation);
        }

        assert_eq!(detector.desync_bitcount(), 3 * 4);
    }

    #[test]
    fn test_silence_never_fires() {
        let constellation = new_constellation(4);
        let mut detector = new_detector(PATTERN, 4);

        for _ in 0..10_000 {
            assert!(!detector.process(Complex32::new(0.0, 0.0), &constellation));
        }
    }
}
