//! Log-domain lookup tables for the FM core.
//!
//! All synthesis runs in the log domain: attenuations are summed as
//! integers and converted back to linear magnitudes with a single table
//! lookup and shift. Tables are computed once on first use and shared
//! process-wide.
//!
//! Log units: 1 << LOG_BITS (4096) equals one octave (about 6 dB).
//! Stored attenuation values are shifted left once, with the low bit
//! carrying the sign of the linear value it produces.

use std::sync::OnceLock;

/// Fractional bits of the log representation (4096 units per octave).
pub const LOG_BITS: u32 = 12;

/// Bits of linear input resolution for [`LogTable::from_linear`].
pub const LIN_BITS: u32 = 7;

/// Bits of the full-scale linear magnitude (`to_linear` peaks at `1 << 30`).
pub const LOG_LIN_BITS: u32 = 30;

/// Entries in the log-to-linear table.
pub const LOG_TABLE_LEN: usize = 1 << LOG_BITS;

/// Attenuation value treated as silence (31 octaves down).
pub const LOG_KEY_OFF: u32 = 31 << (LOG_BITS + 1);

/// Bits of sine table resolution (2048 entries per period).
pub const SIN_BITS: u32 = 11;

/// Entries in the sine attenuation table.
pub const SIN_LEN: usize = 1 << SIN_BITS;

/// Bits of the phase accumulator.
pub const DP_BITS: u32 = 24;

/// Phase accumulator wrap mask.
pub const DP_MASK: u32 = (1 << DP_BITS) - 1;

/// Fixed-point bits of the vibrato multiplier (unity is `1 << PM_SHIFT`).
pub const PM_SHIFT: u32 = 9;

/// Fractional bits of the envelope phase (top 7 bits are the output level).
pub const EG_SHIFT: u32 = 15;

/// Envelope phase at maximum attenuation.
pub const EG_PHASE_MAX: u32 = 127 << EG_SHIFT;

/// Envelope phase ceiling used while keyed off (collapses to silence).
pub const EG_KEY_OFF: u32 = 128 << EG_SHIFT;

/// Fractional bits of the attack accumulator.
pub const AR_SHIFT: u32 = 14;

/// Attack accumulator endpoint.
pub const AR_PHASE_MAX: u32 = 63 << AR_SHIFT;

/// Bits of attack curve table resolution (128 entries).
pub const AR_TBL_BITS: u32 = 7;

/// Fixed-point bits of the phase clock ratio.
pub const CPS_SHIFT_P: u32 = 18;

/// Fixed-point bits of the envelope clock ratio.
pub const CPS_SHIFT_E: u32 = 20;

/// Fixed-point bits of the LFO step counter.
pub const LFO_SHIFT: u32 = 16;

/// Entries per LFO waveform period.
pub const LFO_LEN: usize = 256;

/// Fixed-point division: `(num << shift) / den`.
#[inline]
pub fn div_fix(num: u32, den: u32, shift: u32) -> u32 {
    (((num as u64) << shift) / den as u64) as u32
}

/// 5-bit key code from block and fnum, used for key scaling and detune.
///
/// The top two fnum bits are folded per the OPN carry rule so the code
/// tracks pitch monotonically across block boundaries.
#[inline]
pub fn key_code(block: u8, fnum: u16) -> u8 {
    let f11 = (fnum >> 10) & 1;
    let f10 = (fnum >> 9) & 1;
    let f9 = (fnum >> 8) & 1;
    let f8 = (fnum >> 7) & 1;
    let n4 = f11;
    let n3 = (f11 & (f10 | f9 | f8)) | ((1 - f11) & f10 & f9 & f8);
    ((block & 7) << 2) | ((n4 << 1) | n3) as u8
}

/// Per-sample detune offset in phase-base units, signed.
///
/// `dt` is the 3-bit register field: 0 disables, 1-3 raise, 5-7 lower
/// by the same magnitudes. Magnitude grows with key code.
#[inline]
pub fn detune_offset(dt: u8, kcode: u8) -> i32 {
    let mag = DETUNE_TABLE[(dt & 3) as usize][(kcode & 31) as usize] as i32;
    if dt & 4 != 0 { -mag } else { mag }
}

/// Detune magnitudes per key code, rows indexed by `dt & 3`.
pub const DETUNE_TABLE: [[u8; 32]; 4] = [
    [
        0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, //
        0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    ],
    [
        0, 0, 0, 0, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, //
        2, 2, 2, 2, 2, 2, 2, 2, 2, 3, 3, 3, 4, 4, 4, 5,
    ],
    [
        1, 1, 1, 1, 2, 2, 2, 2, 2, 2, 2, 2, 3, 3, 3, 4, //
        4, 4, 5, 5, 6, 6, 7, 8, 8, 9, 10, 11, 12, 13, 14, 16,
    ],
    [
        2, 2, 2, 2, 2, 3, 3, 3, 4, 4, 4, 5, 5, 6, 6, 7, //
        8, 8, 9, 10, 11, 12, 13, 14, 16, 17, 19, 20, 22, 24, 26, 28,
    ],
];

/// AM depth per sensitivity setting, in dB of peak attenuation.
const AM_DEPTH_DB: [f64; 4] = [0.0, 1.4, 5.9, 11.8];

/// PM depth per sensitivity setting, in cents of peak deviation.
const PM_DEPTH_CENTS: [f64; 8] = [0.0, 3.4, 6.7, 10.0, 14.0, 20.0, 40.0, 80.0];

/// Log units per dB (one octave of amplitude is ~6.02 dB).
const UNITS_PER_DB: f64 = (1 << LOG_BITS) as f64 / 6.020_599_913_279_624;

// ============================================================================
// Log <-> linear conversion
// ============================================================================

/// Bidirectional log/linear conversion tables.
pub struct LogTable {
    log: Vec<u32>,
    lin: Vec<u32>,
}

impl LogTable {
    fn build() -> Self {
        let mut log = vec![0u32; LOG_TABLE_LEN];
        for (i, slot) in log.iter_mut().enumerate() {
            let exp = i as f64 / LOG_TABLE_LEN as f64;
            *slot = ((1u64 << LOG_LIN_BITS) as f64 / 2f64.powf(exp)).floor() as u32;
        }
        let mut lin = vec![0u32; (1 << LIN_BITS) + 1];
        // Zero input has no finite log; park it far past the silence floor.
        lin[0] = LOG_LIN_BITS << (LOG_BITS + 1);
        for (i, slot) in lin.iter_mut().enumerate().skip(1) {
            let octaves = LIN_BITS as f64 - (i as f64).log2();
            *slot = ((octaves * (1 << LOG_BITS) as f64) as u32) << 1;
        }
        LogTable { log, lin }
    }

    /// Convert a log-domain attenuation to a signed linear magnitude.
    ///
    /// `shift` positions full scale: an attenuation of 0 yields
    /// `1 << (LOG_LIN_BITS - shift)`. Attenuations at or past the floor
    /// collapse to exactly 0. The low bit of `l` selects the sign.
    #[inline]
    pub fn to_linear(&self, l: u32, shift: u32) -> i32 {
        let total = shift + (l >> (LOG_BITS + 1));
        if total >= LOG_LIN_BITS {
            return 0;
        }
        let mag = (self.log[((l >> 1) as usize) & (LOG_TABLE_LEN - 1)] >> total) as i32;
        if l & 1 != 0 { -mag } else { mag }
    }

    /// Convert a signed 7-bit linear value to a log-domain attenuation.
    #[inline]
    pub fn from_linear(&self, v: i32) -> u32 {
        if v < 0 {
            self.lin[(-v).min(1 << LIN_BITS) as usize] + 1
        } else {
            self.lin[v.min(1 << LIN_BITS) as usize]
        }
    }
}

// ============================================================================
// Synthesis tables
// ============================================================================

/// All precomputed synthesis tables.
pub struct SynthTables {
    /// Log/linear conversion.
    pub log: LogTable,
    /// Full-period sine attenuation, sign in the low bit.
    pub sin: Vec<u32>,
    /// Combined total-level / envelope attenuation curve (1/16 octave steps).
    pub tll: [u32; 128],
    /// Attack envelope phase per attack accumulator step.
    pub attack: [u32; 1 << AR_TBL_BITS],
    /// Tremolo attenuation per sensitivity and LFO step.
    pub am: [[u32; LFO_LEN]; 4],
    /// Vibrato phase multiplier per sensitivity and LFO step.
    pub pm: [[u32; LFO_LEN]; 8],
}

impl SynthTables {
    fn build() -> Self {
        let log = LogTable::build();

        let mut sin = vec![0u32; SIN_LEN];
        let half = SIN_LEN / 2;
        for i in 0..half {
            let s = ((i as f64 + 0.5) * std::f64::consts::PI / half as f64).sin();
            let att = ((-s.log2()) * (1 << LOG_BITS) as f64) as u32;
            let att = att.min(LOG_KEY_OFF >> 1);
            sin[i] = att << 1;
            sin[i + half] = (att << 1) | 1;
        }

        let mut tll = [0u32; 128];
        for (i, slot) in tll.iter_mut().enumerate() {
            *slot = (i as u32) << (LOG_BITS - 4 + 1);
        }

        let mut attack = [0u32; 1 << AR_TBL_BITS];
        let ln_full = ((1u32 << AR_TBL_BITS) as f64).ln();
        for (i, slot) in attack.iter_mut().enumerate() {
            let frac = 1.0 - ((1 + i) as f64).ln() / ln_full;
            *slot = (EG_PHASE_MAX as f64 * frac) as u32;
        }

        let mut am = [[0u32; LFO_LEN]; 4];
        for (s, row) in am.iter_mut().enumerate() {
            let peak = AM_DEPTH_DB[s] * UNITS_PER_DB;
            for (i, slot) in row.iter_mut().enumerate() {
                // Triangle from 0 attenuation up to full depth and back.
                let t = if i < LFO_LEN / 2 {
                    i as f64 / (LFO_LEN / 2) as f64
                } else {
                    (LFO_LEN - i) as f64 / (LFO_LEN / 2) as f64
                };
                *slot = ((t * peak) as u32) << 1;
            }
        }

        let mut pm = [[0u32; LFO_LEN]; 8];
        for (s, row) in pm.iter_mut().enumerate() {
            let cents = PM_DEPTH_CENTS[s];
            for (i, slot) in row.iter_mut().enumerate() {
                // Signed triangle over the period: 0, +1, 0, -1.
                let q = LFO_LEN / 4;
                let t = match i / q {
                    0 => i as f64 / q as f64,
                    1 | 2 => ((2 * q) as f64 - i as f64) / q as f64,
                    _ => (i as f64 - LFO_LEN as f64) / q as f64,
                };
                let ratio = 2f64.powf(t * cents / 1200.0);
                *slot = (ratio * (1 << PM_SHIFT) as f64).round() as u32;
            }
        }

        SynthTables {
            log,
            sin,
            tll,
            attack,
            am,
            pm,
        }
    }
}

static TABLES: OnceLock<SynthTables> = OnceLock::new();

/// Shared synthesis tables, built on first use.
pub fn synth_tables() -> &'static SynthTables {
    TABLES.get_or_init(SynthTables::build)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_table_full_scale_and_floor() {
        let t = synth_tables();
        assert_eq!(t.log.to_linear(0, 0), 1 << LOG_LIN_BITS);
        assert_eq!(t.log.to_linear(0, 16), 1 << (LOG_LIN_BITS - 16));
        // At or past the floor everything collapses to zero.
        assert_eq!(t.log.to_linear(LOG_KEY_OFF, 0), 0);
        assert_eq!(t.log.to_linear(EG_KEY_OFF, 16), 0);
    }

    #[test]
    fn log_table_sign_bit_negates() {
        let t = synth_tables();
        let pos = t.log.to_linear(100 << 1, 10);
        let neg = t.log.to_linear((100 << 1) | 1, 10);
        assert!(pos > 0);
        assert_eq!(neg, -pos);
    }

    #[test]
    fn log_table_monotonic_attenuation() {
        let t = synth_tables();
        let mut prev = t.log.to_linear(0, 14);
        for att in 1..200u32 {
            let v = t.log.to_linear(att << 10, 14);
            assert!(v <= prev, "attenuation {att} raised output");
            prev = v;
        }
    }

    #[test]
    fn from_linear_round_trips_powers_of_two() {
        let t = synth_tables();
        // 7-bit full scale maps back to full scale under a matching shift.
        let l = t.log.from_linear(1 << LIN_BITS);
        assert_eq!(t.log.to_linear(l, LOG_LIN_BITS - LIN_BITS), 1 << LIN_BITS);
        let l = t.log.from_linear(64);
        assert_eq!(t.log.to_linear(l, LOG_LIN_BITS - LIN_BITS), 64);
        let l = t.log.from_linear(-64);
        assert_eq!(t.log.to_linear(l, LOG_LIN_BITS - LIN_BITS), -64);
    }

    #[test]
    fn from_linear_zero_is_silent() {
        let t = synth_tables();
        let l = t.log.from_linear(0);
        assert_eq!(t.log.to_linear(l, 14), 0);
    }

    #[test]
    fn sine_halves_mirror_with_opposite_sign() {
        let t = synth_tables();
        for i in 0..SIN_LEN / 2 {
            assert_eq!(t.sin[i] >> 1, t.sin[i + SIN_LEN / 2] >> 1);
            assert_eq!(t.sin[i] & 1, 0);
            assert_eq!(t.sin[i + SIN_LEN / 2] & 1, 1);
        }
    }

    #[test]
    fn sine_peak_is_quarter_period() {
        let t = synth_tables();
        let peak = SIN_LEN / 4;
        // Least attenuation at the quarter-period peak.
        for i in 0..SIN_LEN / 2 {
            assert!(t.sin[peak] <= t.sin[i]);
        }
        assert!(t.sin[peak] >> 1 < 16, "peak should be near zero attenuation");
    }

    #[test]
    fn tll_curve_spans_envelope_floor() {
        let t = synth_tables();
        assert_eq!(t.tll[0], 0);
        for i in 1..128 {
            assert!(t.tll[i] > t.tll[i - 1]);
        }
        // Step 127 is about 48 dB down: 8 octaves of headroom.
        assert_eq!(t.tll[127] >> 1, 127 << (LOG_BITS - 4));
    }

    #[test]
    fn attack_curve_endpoints() {
        let t = synth_tables();
        assert_eq!(t.attack[0], EG_PHASE_MAX);
        assert_eq!(*t.attack.last().unwrap(), 0);
        for i in 1..t.attack.len() {
            assert!(t.attack[i] <= t.attack[i - 1]);
        }
    }

    #[test]
    fn pm_sensitivity_zero_is_exact_unity() {
        let t = synth_tables();
        for &v in t.pm[0].iter() {
            assert_eq!(v, 1 << PM_SHIFT);
        }
    }

    #[test]
    fn pm_depth_grows_with_sensitivity() {
        let t = synth_tables();
        for s in 1..8 {
            let peak_hi = *t.pm[s].iter().max().unwrap();
            let peak_lo = *t.pm[s].iter().min().unwrap();
            assert!(peak_hi > 1 << PM_SHIFT);
            assert!(peak_lo < 1 << PM_SHIFT);
            let prev_hi = *t.pm[s - 1].iter().max().unwrap();
            assert!(peak_hi >= prev_hi);
        }
    }

    #[test]
    fn am_sensitivity_zero_is_silent() {
        let t = synth_tables();
        assert!(t.am[0].iter().all(|&v| v == 0));
        let peak = *t.am[3].iter().max().unwrap() >> 1;
        // 11.8 dB is just under two octaves of attenuation.
        assert!(peak > (1 << LOG_BITS) && peak < 2 << LOG_BITS);
    }

    #[test]
    fn key_code_tracks_pitch() {
        assert_eq!(key_code(0, 0), 0);
        // Top fnum bit drives bit 1 of the code.
        assert_eq!(key_code(0, 0x400) & 2, 2);
        // Block dominates.
        assert!(key_code(4, 0) > key_code(3, 0x7FF) - 4);
        assert_eq!(key_code(7, 0x7FF), 31);
    }

    #[test]
    fn detune_signs_mirror() {
        for kc in 0..32u8 {
            for dt in 1..4u8 {
                assert_eq!(detune_offset(dt, kc), -detune_offset(dt | 4, kc));
            }
        }
        assert_eq!(detune_offset(0, 31), 0);
        assert_eq!(detune_offset(3, 31), 28);
    }

    #[test]
    fn div_fix_native_ratio_is_unity() {
        // 7670454 / (144 * 53267) is within rounding of 1.0.
        let cps = div_fix(7_670_454, 144 * 53_267, CPS_SHIFT_P);
        let unity = 1u32 << CPS_SHIFT_P;
        assert!(cps >= unity && cps < unity + (unity >> 8));
    }
}
