//! Envelope generator for a single operator.
//!
//! The envelope is an attenuation phase in fixed point: 0 is full level,
//! `EG_PHASE_MAX` is the floor, and the top 7 bits feed the log-domain
//! attenuation pipeline. Attack runs on a separate accumulator through a
//! logarithmic curve table; the other segments add a per-sample speed
//! derived from the register rate, key scaling and the clock ratio.

use crate::tables::{
    AR_PHASE_MAX, AR_TBL_BITS, CPS_SHIFT_E, EG_KEY_OFF, EG_PHASE_MAX, EG_SHIFT, SynthTables,
    div_fix,
};

/// Attack accumulator bits above the curve table index.
const AR_IDX_SHIFT: u32 = 20 - AR_TBL_BITS;

/// Envelope segment currently in effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum EnvelopeMode {
    /// Rising from silence along the attack curve.
    Attack,
    /// Falling from full level toward the sustain level.
    Decay,
    /// Falling from the sustain level at the sustain rate.
    Sustain,
    /// Holding a constant level until key off.
    SustainHold,
    /// Falling toward silence after key off.
    Release,
    /// Silent; contributes exactly zero.
    #[default]
    Off,
}

/// SSG-EG register decode (repeating and inverted envelope shapes).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SsgMode {
    /// Bit 3: SSG-EG shapes enabled, decay segments run 4x faster.
    pub enabled: bool,
    /// Bit 2: start with the output inverted.
    pub attack: bool,
    /// Bit 1: flip the inversion each time the floor is reached.
    pub alternate: bool,
    /// Bit 0: hold at the floor instead of looping.
    pub hold: bool,
}

impl SsgMode {
    /// Decode the low nibble of an SSG-EG register write.
    pub fn from_register(v: u8) -> Self {
        SsgMode {
            enabled: v & 0x08 != 0,
            attack: v & 0x04 != 0,
            alternate: v & 0x02 != 0,
            hold: v & 0x01 != 0,
        }
    }
}

/// Envelope clock scaling shared by every operator on a chip.
///
/// Converts 6-bit effective rates into per-sample phase speeds for the
/// configured master clock and output rate.
#[derive(Clone, Copy, Debug, Default)]
pub struct EnvelopeClock {
    cps: u32,
}

impl EnvelopeClock {
    /// Build the scale for a master clock and output sample rate.
    pub fn new(master_clock: u32, sample_rate: u32) -> Self {
        EnvelopeClock {
            cps: div_fix(master_clock, 144 * sample_rate, CPS_SHIFT_E),
        }
    }

    /// Per-sample envelope speed for a 6-bit effective rate.
    ///
    /// Rate 0 yields speed 0: the segment never advances.
    #[inline]
    pub fn speed(&self, rate6: u8) -> u32 {
        if rate6 == 0 {
            return 0;
        }
        let coarse = (rate6 >> 2) as u32;
        let fine = (rate6 & 3) as u32;
        (((4 + fine) as u64 * self.cps as u64) >> (CPS_SHIFT_E + 1 - coarse)) as u32
    }
}

/// Combine a 5-bit register rate with key scaling into a 6-bit rate.
///
/// Rate 0 stays 0 (segment disabled) regardless of scaling.
#[inline]
pub fn effective_rate(reg_rate: u8, ks: u8, kcode: u8) -> u8 {
    if reg_rate == 0 {
        return 0;
    }
    let scaled = (kcode >> (3 - (ks & 3))) as u16;
    (2 * reg_rate as u16 + scaled).min(63) as u8
}

/// Envelope generator state for one operator.
#[derive(Clone, Debug, Default)]
pub struct EnvelopeGenerator {
    mode: EnvelopeMode,
    /// Attenuation phase; top 7 bits are the output level.
    phase: u32,
    /// Attack progress, mapped through the attack curve table.
    attack_acc: u32,
    attack_spd: u32,
    decay_spd: u32,
    sustain_spd: u32,
    release_spd: u32,
    /// Decay-to-sustain threshold in phase units.
    sustain_level: u32,
    /// Effective attack rate 60+ snaps straight to full level.
    instant_attack: bool,
    /// Key-off requests are dropped (CSM-managed operators).
    ignore_key_off: bool,
    ssg: SsgMode,
    inverted: bool,
    phase_reset_pending: bool,
}

impl EnvelopeGenerator {
    /// Create a new envelope in the silent state.
    pub fn new() -> Self {
        EnvelopeGenerator {
            phase: EG_KEY_OFF,
            ..Default::default()
        }
    }

    /// Recompute all segment speeds from register rates and key scaling.
    ///
    /// Release uses its 4-bit register value doubled plus one before
    /// scaling, matching the hardware's coarser release resolution.
    pub fn set_rates(&mut self, clock: &EnvelopeClock, ar: u8, dr: u8, sr: u8, rr: u8, ks: u8, kcode: u8) {
        let ar_eff = effective_rate(ar, ks, kcode);
        self.attack_spd = clock.speed(ar_eff).saturating_mul(3);
        self.instant_attack = ar_eff >= 60;
        self.decay_spd = clock.speed(effective_rate(dr, ks, kcode));
        self.sustain_spd = clock.speed(effective_rate(sr, ks, kcode));
        self.release_spd = clock.speed(effective_rate(rr * 2 + 1, ks, kcode));
    }

    /// Set the sustain level from the 4-bit register field (3 dB steps,
    /// 15 meaning the envelope floor).
    pub fn set_sustain_level(&mut self, sl: u8) {
        self.sustain_level = if sl >= 15 {
            EG_PHASE_MAX
        } else {
            (sl as u32) << (EG_SHIFT + 3)
        };
    }

    /// Configure the SSG-EG shape for subsequent key-ons.
    pub fn set_ssg(&mut self, ssg: SsgMode) {
        self.ssg = ssg;
    }

    /// When set, key-off requests are ignored and the envelope runs its
    /// shape to completion.
    pub fn set_ignore_key_off(&mut self, ignore: bool) {
        self.ignore_key_off = ignore;
    }

    /// Start the attack segment from silence.
    pub fn key_on(&mut self) {
        self.attack_acc = 0;
        self.inverted = self.ssg.enabled && self.ssg.attack;
        if self.instant_attack {
            self.phase = 0;
            self.mode = EnvelopeMode::Decay;
        } else {
            self.phase = EG_KEY_OFF;
            self.mode = EnvelopeMode::Attack;
        }
    }

    /// Enter the release segment from the current level.
    pub fn key_off(&mut self) {
        if self.ignore_key_off || self.mode == EnvelopeMode::Off {
            return;
        }
        // Release always runs on the audible level, so a pending
        // inversion is baked into the phase first.
        if self.inverted {
            self.phase = EG_KEY_OFF.saturating_sub(self.phase).min(EG_PHASE_MAX);
            self.inverted = false;
        }
        self.mode = EnvelopeMode::Release;
    }

    /// Silence immediately without a release ramp.
    pub fn shut_off(&mut self) {
        self.mode = EnvelopeMode::Off;
        self.phase = EG_KEY_OFF;
        self.inverted = false;
    }

    /// Advance one sample.
    #[inline]
    pub fn step(&mut self, t: &SynthTables) {
        match self.mode {
            EnvelopeMode::Attack => {
                self.attack_acc = self.attack_acc.saturating_add(self.attack_spd);
                if self.attack_acc >= AR_PHASE_MAX {
                    self.phase = 0;
                    self.mode = EnvelopeMode::Decay;
                } else {
                    let idx = ((self.attack_acc >> AR_IDX_SHIFT) as usize).min(t.attack.len() - 1);
                    self.phase = t.attack[idx];
                }
            }
            EnvelopeMode::Decay => {
                self.phase += self.segment_speed(self.decay_spd);
                if self.phase >= EG_PHASE_MAX {
                    // Reaching the floor always disables the operator,
                    // even when the sustain level sits at the floor too.
                    if self.ssg.enabled {
                        self.ssg_floor();
                    } else {
                        self.shut_off();
                    }
                } else if self.phase >= self.sustain_level {
                    // Sustain rate 0 freezes the level until key off.
                    self.mode = if self.sustain_spd == 0 {
                        EnvelopeMode::SustainHold
                    } else {
                        EnvelopeMode::Sustain
                    };
                }
            }
            EnvelopeMode::Sustain => {
                self.phase += self.segment_speed(self.sustain_spd);
                if self.phase >= EG_PHASE_MAX {
                    if self.ssg.enabled {
                        self.ssg_floor();
                    } else {
                        self.shut_off();
                    }
                }
            }
            EnvelopeMode::SustainHold => {}
            EnvelopeMode::Release => {
                self.phase += self.release_spd;
                if self.phase >= EG_PHASE_MAX {
                    self.shut_off();
                }
            }
            EnvelopeMode::Off => {}
        }
    }

    #[inline]
    fn segment_speed(&self, spd: u32) -> u32 {
        // SSG-EG shapes clock their decay segments four times faster.
        if self.ssg.enabled { spd << 2 } else { spd }
    }

    /// Handle the envelope reaching the floor under SSG-EG.
    fn ssg_floor(&mut self) {
        if self.ssg.alternate {
            self.inverted = !self.inverted;
        }
        if self.ssg.hold {
            self.phase = EG_PHASE_MAX;
            self.mode = EnvelopeMode::SustainHold;
        } else {
            // Loop: restart from full level, waveform restarts with it.
            self.phase = 0;
            self.mode = EnvelopeMode::Decay;
            self.phase_reset_pending = true;
        }
    }

    /// Current 7-bit attenuation level; 128 and above is silent.
    #[inline]
    pub fn output(&self) -> u32 {
        if self.mode == EnvelopeMode::Off {
            return 128;
        }
        let raw = (self.phase >> EG_SHIFT).min(128);
        if self.inverted { 128 - raw } else { raw }
    }

    /// Current segment.
    #[inline]
    pub fn mode(&self) -> EnvelopeMode {
        self.mode
    }

    /// True once the envelope has fully released.
    #[inline]
    pub fn is_off(&self) -> bool {
        self.mode == EnvelopeMode::Off
    }

    /// Consume a pending SSG-EG waveform restart.
    #[inline]
    pub fn take_phase_reset(&mut self) -> bool {
        std::mem::take(&mut self.phase_reset_pending)
    }

    /// Reset to power-on state. Rates are cleared and must be set again.
    pub fn reset(&mut self) {
        *self = EnvelopeGenerator::new();
    }
}
