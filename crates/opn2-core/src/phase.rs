//! Phase generator for a single operator.
//!
//! A 24-bit accumulator advanced once per output sample. The increment is
//! derived from the channel frequency (fnum/block), the operator's detune
//! and multiple, and the clock-to-sample-rate ratio, so the generator runs
//! correctly at any output rate.

use crate::tables::{CPS_SHIFT_P, DP_BITS, DP_MASK, PM_SHIFT, SIN_BITS, detune_offset};

/// Phase accumulator with a precomputed per-sample increment.
#[derive(Clone, Debug, Default)]
pub struct PhaseGenerator {
    /// Accumulator, wraps at `1 << DP_BITS`.
    phase: u32,
    /// Increment per output sample.
    spd: u32,
}

impl PhaseGenerator {
    /// Create a new phase generator at phase zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute the per-sample increment.
    ///
    /// `mul2` is twice the operator multiple, with 1 standing in for the
    /// x0.5 setting. `cps` is the clock ratio produced by the chip from
    /// master clock and sample rate. Detune is applied in base-frequency
    /// units before the multiple, clamped so deep negative detune on the
    /// lowest notes cannot drive the increment negative.
    pub fn set_frequency(&mut self, fnum: u16, block: u8, mul2: u32, dt: u8, kcode: u8, cps: u32) {
        let base = ((fnum as i32) << (block & 7)) >> 1;
        let detuned = (base + detune_offset(dt, kcode)).max(0) as u64;
        let native = (detuned * mul2 as u64) >> 1;
        self.spd = ((native * cps as u64) >> (CPS_SHIFT_P - (DP_BITS - 20))) as u32;
    }

    /// Advance one sample under a vibrato multiplier and return the new phase.
    ///
    /// `pm` is a fixed-point factor with unity at `1 << PM_SHIFT`; at unity
    /// the step is exactly `spd`.
    #[inline]
    pub fn step(&mut self, pm: u32) -> u32 {
        let inc = ((self.spd as u64 * pm as u64) >> PM_SHIFT) as u32;
        self.phase = (self.phase + inc) & DP_MASK;
        self.phase
    }

    /// Current sine table index for this phase.
    #[inline]
    pub fn sin_index(&self) -> u32 {
        self.phase >> (DP_BITS - SIN_BITS)
    }

    /// Current raw phase.
    #[inline]
    pub fn phase(&self) -> u32 {
        self.phase
    }

    /// Restart the waveform from phase zero (key on, SSG phase reset).
    #[inline]
    pub fn reset_phase(&mut self) {
        self.phase = 0;
    }

    /// Reset to power-on state.
    pub fn reset(&mut self) {
        self.phase = 0;
        self.spd = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::key_code;

    // Clock ratio for the NTSC master clock at its native sample rate.
    const NATIVE_CPS: u32 = 1 << CPS_SHIFT_P;

    #[test]
    fn unity_vibrato_steps_by_increment() {
        let mut pg = PhaseGenerator::new();
        pg.set_frequency(1000, 4, 2, 0, key_code(4, 1000), NATIVE_CPS);
        let p1 = pg.step(1 << PM_SHIFT);
        let p2 = pg.step(1 << PM_SHIFT);
        assert_eq!(p2 - p1, p1);
    }

    #[test]
    fn block_doubles_frequency() {
        let mut lo = PhaseGenerator::new();
        let mut hi = PhaseGenerator::new();
        lo.set_frequency(1000, 3, 2, 0, key_code(3, 1000), NATIVE_CPS);
        hi.set_frequency(1000, 4, 2, 0, key_code(4, 1000), NATIVE_CPS);
        assert_eq!(hi.step(1 << PM_SHIFT), 2 * lo.step(1 << PM_SHIFT));
    }

    #[test]
    fn multiple_scales_increment() {
        let mut m1 = PhaseGenerator::new();
        let mut m4 = PhaseGenerator::new();
        let mut half = PhaseGenerator::new();
        m1.set_frequency(512, 4, 2, 0, 16, NATIVE_CPS);
        m4.set_frequency(512, 4, 8, 0, 16, NATIVE_CPS);
        half.set_frequency(512, 4, 1, 0, 16, NATIVE_CPS);
        let unity = 1 << PM_SHIFT;
        let base = m1.step(unity);
        assert_eq!(m4.step(unity), 4 * base);
        assert_eq!(half.step(unity), base / 2);
    }

    #[test]
    fn detune_shifts_increment_both_ways() {
        let unity = 1 << PM_SHIFT;
        let mut plain = PhaseGenerator::new();
        let mut up = PhaseGenerator::new();
        let mut down = PhaseGenerator::new();
        plain.set_frequency(1000, 4, 2, 0, 28, NATIVE_CPS);
        up.set_frequency(1000, 4, 2, 3, 28, NATIVE_CPS);
        down.set_frequency(1000, 4, 2, 7, 28, NATIVE_CPS);
        let base = plain.step(unity);
        assert!(up.step(unity) > base);
        assert!(down.step(unity) < base);
    }

    #[test]
    fn vibrato_multiplier_bends_pitch() {
        let unity = 1 << PM_SHIFT;
        let mut pg = PhaseGenerator::new();
        pg.set_frequency(1000, 4, 2, 0, 16, NATIVE_CPS);
        let base = pg.step(unity);
        pg.reset_phase();
        let bent = pg.step(unity + (unity >> 4));
        assert!(bent > base);
    }

    #[test]
    fn zero_fnum_freezes_the_phase() {
        let mut pg = PhaseGenerator::new();
        pg.set_frequency(0, 7, 30, 0, 31, NATIVE_CPS);
        for _ in 0..64 {
            pg.step(1 << PM_SHIFT);
        }
        assert_eq!(pg.phase(), 0);
    }

    #[test]
    fn phase_wraps_at_24_bits() {
        let mut pg = PhaseGenerator::new();
        pg.set_frequency(2047, 7, 30, 0, 31, NATIVE_CPS);
        for _ in 0..64 {
            assert!(pg.step(1 << PM_SHIFT) <= DP_MASK);
        }
    }

    #[test]
    fn half_rate_cps_halves_increment() {
        let unity = 1 << PM_SHIFT;
        let mut native = PhaseGenerator::new();
        let mut doubled = PhaseGenerator::new();
        native.set_frequency(1000, 4, 2, 0, 16, NATIVE_CPS);
        doubled.set_frequency(1000, 4, 2, 0, 16, NATIVE_CPS / 2);
        assert_eq!(doubled.step(unity), native.step(unity) / 2);
    }
}
