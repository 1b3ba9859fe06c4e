//! A single FM operator: phase generator, envelope generator and the
//! log-domain output pipeline that ties them together.
//!
//! Per sample the operator sums its attenuations (total level, envelope,
//! tremolo, sine) in the log domain and converts the result to a signed
//! linear value with one table lookup. Modulation input arrives in sine
//! table index units and simply offsets the phase lookup.

use crate::envelope::{EnvelopeClock, EnvelopeGenerator, SsgMode};
use crate::phase::PhaseGenerator;
use crate::tables::{SIN_LEN, SynthTables};

/// Shift positioning full-scale operator output (peak about +/-16384).
const OUTPUT_SHIFT: u32 = 16;

/// Extra right shift applied when an output feeds another operator,
/// scaling full swing to about two sine periods of deviation.
pub(crate) const MOD_SHIFT: u32 = 2;

/// One of the four operators of an FM channel.
#[derive(Clone, Debug, Default)]
pub struct Operator {
    pg: PhaseGenerator,
    eg: EnvelopeGenerator,
    /// Detune field (0-7).
    dt: u8,
    /// Frequency multiple (0 means x0.5).
    mul: u8,
    /// Total level, 7 bits at 0.75 dB per step.
    tl: u8,
    /// Key scale shift (0-3).
    ks: u8,
    ar: u8,
    dr: u8,
    sr: u8,
    rr: u8,
    sl: u8,
    am_enable: bool,
    /// Key-on latch; repeated key-ons do not retrigger.
    keyed: bool,
    /// Last two outputs, averaged for self-feedback.
    fb: [i32; 2],
}

impl Operator {
    /// Create a silent operator.
    pub fn new() -> Self {
        Operator {
            eg: EnvelopeGenerator::new(),
            ..Default::default()
        }
    }

    // ------------------------------------------------------------------
    // Register fields
    // ------------------------------------------------------------------

    /// Detune / multiple register (0x30 block).
    pub fn set_dt_mul(&mut self, v: u8) {
        self.dt = (v >> 4) & 7;
        self.mul = v & 15;
    }

    /// Total level register (0x40 block).
    pub fn set_tl(&mut self, v: u8) {
        self.tl = v & 0x7F;
    }

    /// Key scale / attack rate register (0x50 block).
    pub fn set_ks_ar(&mut self, v: u8) {
        self.ks = v >> 6;
        self.ar = v & 0x1F;
    }

    /// AM enable / decay rate register (0x60 block).
    pub fn set_am_dr(&mut self, v: u8) {
        self.am_enable = v & 0x80 != 0;
        self.dr = v & 0x1F;
    }

    /// Sustain rate register (0x70 block).
    pub fn set_sr(&mut self, v: u8) {
        self.sr = v & 0x1F;
    }

    /// Sustain level / release rate register (0x80 block).
    pub fn set_sl_rr(&mut self, v: u8) {
        self.sl = v >> 4;
        self.rr = v & 0x0F;
    }

    /// SSG-EG register (0x90 block). Takes effect on the next key-on.
    pub fn set_ssg(&mut self, v: u8) {
        self.eg.set_ssg(SsgMode::from_register(v));
    }

    /// Whether tremolo applies to this operator.
    #[inline]
    pub fn am_enabled(&self) -> bool {
        self.am_enable
    }

    /// Drop key-off requests (CSM-managed operators).
    pub fn set_ignore_key_off(&mut self, ignore: bool) {
        self.eg.set_ignore_key_off(ignore);
    }

    /// Recompute phase increment and envelope speeds after a register or
    /// frequency change.
    pub fn refresh(&mut self, fnum: u16, block: u8, kcode: u8, phase_cps: u32, eg_clock: &EnvelopeClock) {
        let mul2 = if self.mul == 0 { 1 } else { 2 * self.mul as u32 };
        self.pg.set_frequency(fnum, block, mul2, self.dt, kcode, phase_cps);
        self.eg.set_rates(eg_clock, self.ar, self.dr, self.sr, self.rr, self.ks, kcode);
        self.eg.set_sustain_level(self.sl);
    }

    // ------------------------------------------------------------------
    // Keying
    // ------------------------------------------------------------------

    /// Key on: restart phase, envelope and feedback history. Latched, a
    /// second key-on while held does nothing.
    pub fn key_on(&mut self) {
        if self.keyed {
            return;
        }
        self.keyed = true;
        self.pg.reset_phase();
        self.fb = [0, 0];
        self.eg.key_on();
    }

    /// Key off: enter the release segment.
    pub fn key_off(&mut self) {
        if !self.keyed {
            return;
        }
        self.keyed = false;
        self.eg.key_off();
    }

    /// True once the envelope has fully released.
    #[inline]
    pub fn is_silent(&self) -> bool {
        self.eg.is_off()
    }

    // ------------------------------------------------------------------
    // Synthesis
    // ------------------------------------------------------------------

    /// Produce one sample.
    ///
    /// `input` is a modulation offset in sine table index units,
    /// `extra_att` carries tremolo and master attenuation in log units,
    /// `pm` is the vibrato phase multiplier. A fully released operator
    /// contributes exactly zero.
    #[inline]
    pub fn synthesize(&mut self, input: i32, extra_att: u32, pm: u32, t: &SynthTables) -> i32 {
        self.eg.step(t);
        if self.eg.take_phase_reset() {
            self.pg.reset_phase();
        }
        self.pg.step(pm);
        let idx = (self.pg.sin_index() as i32 + input) as usize & (SIN_LEN - 1);

        let level = self.tl as u32 * 2 + self.eg.output();
        if level >= 128 {
            return 0;
        }
        let att = t.tll[level as usize] + extra_att + t.sin[idx];
        t.log.to_linear(att, OUTPUT_SHIFT)
    }

    /// Self-feedback modulation input for the given 3-bit feedback level.
    #[inline]
    pub fn feedback_input(&self, fb: u8) -> i32 {
        if fb == 0 {
            0
        } else {
            (self.fb[0] + self.fb[1]) >> (10 - fb as u32)
        }
    }

    /// Record an output sample into the feedback history.
    #[inline]
    pub fn push_feedback(&mut self, out: i32) {
        self.fb[1] = self.fb[0];
        self.fb[0] = out;
    }

    /// Reset to power-on state. Register fields are cleared.
    pub fn reset(&mut self) {
        *self = Operator::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::{CPS_SHIFT_P, PM_SHIFT, key_code, synth_tables};

    const NATIVE_CPS: u32 = 1 << CPS_SHIFT_P;
    const UNITY_PM: u32 = 1 << PM_SHIFT;

    fn eg_clock() -> EnvelopeClock {
        EnvelopeClock::new(7_670_454, 44_100)
    }

    fn singing_op() -> Operator {
        let mut op = Operator::new();
        op.set_dt_mul(0x01); // mul 1
        op.set_tl(0x00);
        op.set_ks_ar(0x1F); // max attack
        op.set_am_dr(0x00);
        op.set_sl_rr(0x05);
        op.refresh(1000, 4, key_code(4, 1000), NATIVE_CPS, &eg_clock());
        op.key_on();
        op
    }

    #[test]
    fn released_operator_outputs_exact_zero() {
        let t = synth_tables();
        let mut op = Operator::new();
        op.refresh(1000, 4, 18, NATIVE_CPS, &eg_clock());
        for _ in 0..100 {
            assert_eq!(op.synthesize(0, 0, UNITY_PM, t), 0);
        }
    }

    #[test]
    fn keyed_operator_produces_bounded_waveform() {
        let t = synth_tables();
        let mut op = singing_op();
        let mut peak = 0i32;
        let mut nonzero = 0;
        for _ in 0..2000 {
            let v = op.synthesize(0, 0, UNITY_PM, t);
            peak = peak.max(v.abs());
            if v != 0 {
                nonzero += 1;
            }
        }
        assert!(nonzero > 1000, "waveform mostly silent");
        assert!(peak > 1000, "peak {peak} too quiet");
        assert!(peak <= 1 << 14, "peak {peak} exceeds full scale");
    }

    #[test]
    fn total_level_attenuates() {
        let t = synth_tables();
        let mut loud = singing_op();
        let mut quiet = singing_op();
        quiet.set_tl(16); // 12 dB down
        let mut peak_loud = 0i32;
        let mut peak_quiet = 0i32;
        for _ in 0..2000 {
            peak_loud = peak_loud.max(loud.synthesize(0, 0, UNITY_PM, t).abs());
            peak_quiet = peak_quiet.max(quiet.synthesize(0, 0, UNITY_PM, t).abs());
        }
        assert!(peak_quiet < peak_loud / 2);
        assert!(peak_quiet > 0);
    }

    #[test]
    fn extra_attenuation_reduces_output() {
        let t = synth_tables();
        let mut plain = singing_op();
        let mut damped = singing_op();
        let mut peak_plain = 0i32;
        let mut peak_damped = 0i32;
        // One octave of extra attenuation.
        let att = 1u32 << (crate::tables::LOG_BITS + 1);
        for _ in 0..2000 {
            peak_plain = peak_plain.max(plain.synthesize(0, 0, UNITY_PM, t).abs());
            peak_damped = peak_damped.max(damped.synthesize(0, att, UNITY_PM, t).abs());
        }
        assert!(peak_damped < peak_plain);
        assert!(peak_damped * 3 > peak_plain, "one octave should halve, not kill");
    }

    #[test]
    fn modulation_input_shifts_the_waveform() {
        let t = synth_tables();
        let mut a = singing_op();
        let mut b = singing_op();
        let mut differs = false;
        for _ in 0..256 {
            let va = a.synthesize(0, 0, UNITY_PM, t);
            let vb = b.synthesize(512, 0, UNITY_PM, t);
            if va != vb {
                differs = true;
            }
        }
        assert!(differs, "quarter-period offset should change samples");
    }

    #[test]
    fn feedback_input_scales_with_level() {
        let mut op = Operator::new();
        op.push_feedback(8000);
        op.push_feedback(8000);
        assert_eq!(op.feedback_input(0), 0);
        assert_eq!(op.feedback_input(7), 16000 >> 3);
        assert_eq!(op.feedback_input(1), 16000 >> 9);
        // History averages the last two outputs.
        op.push_feedback(-8000);
        assert_eq!(op.feedback_input(7), 0);
    }

    #[test]
    fn fully_decayed_operator_falls_exactly_silent() {
        let t = synth_tables();
        let mut op = singing_op();
        op.set_am_dr(0x1F); // decay straight to the floor
        op.set_sl_rr(0xF5); // sustain level at the floor
        op.refresh(1000, 4, key_code(4, 1000), NATIVE_CPS, &eg_clock());
        for _ in 0..50_000 {
            op.synthesize(0, 0, UNITY_PM, t);
            if op.is_silent() {
                break;
            }
        }
        assert!(op.is_silent(), "decay to the floor should disable the voice");
        // No residual tone afterwards, every sample is exactly zero.
        for _ in 0..1000 {
            assert_eq!(op.synthesize(0, 0, UNITY_PM, t), 0);
        }
    }

    #[test]
    fn rekeyed_operator_matches_a_fresh_one() {
        let t = synth_tables();
        let mut op = singing_op();
        // Dirty every piece of per-note state before the second note.
        op.push_feedback(1234);
        op.push_feedback(-5678);
        for _ in 0..700 {
            op.synthesize(0, 0, UNITY_PM, t);
        }
        op.key_off();
        for _ in 0..200_000 {
            op.synthesize(0, 0, UNITY_PM, t);
            if op.is_silent() {
                break;
            }
        }
        assert!(op.is_silent());
        op.key_on();
        assert_eq!(op.feedback_input(7), 0, "feedback history survives a re-key");
        let mut fresh = singing_op();
        for n in 0..500 {
            let a = op.synthesize(0, 0, UNITY_PM, t);
            let b = fresh.synthesize(0, 0, UNITY_PM, t);
            assert_eq!(a, b, "sample {n} diverges after re-key");
        }
    }

    #[test]
    fn zero_frequency_keeps_the_envelope_running() {
        let t = synth_tables();
        let mut op = Operator::new();
        op.set_dt_mul(0x01);
        op.set_tl(0x00);
        op.set_ks_ar(0x1F);
        op.set_am_dr(0x1F); // fast decay
        op.set_sl_rr(0xF5); // sustain level at the floor
        op.refresh(0, 0, key_code(0, 0), NATIVE_CPS, &eg_clock());
        op.key_on();
        assert!(!op.is_silent());
        // The phase increment is zero but the envelope still clocks: the
        // voice decays to silence without any key-off request.
        let mut went_silent = false;
        for _ in 0..10_000 {
            op.synthesize(0, 0, UNITY_PM, t);
            if op.is_silent() {
                went_silent = true;
                break;
            }
        }
        assert!(went_silent, "envelope should keep running at zero frequency");
    }

    #[test]
    fn key_on_is_latched() {
        let t = synth_tables();
        let mut op = singing_op();
        for _ in 0..500 {
            op.synthesize(0, 0, UNITY_PM, t);
        }
        // A second key-on while held must not restart the phase.
        let mut snapshot = op.clone();
        op.key_on();
        let a = op.synthesize(0, 0, UNITY_PM, t);
        let b = snapshot.synthesize(0, 0, UNITY_PM, t);
        assert_eq!(a, b);
    }
}
