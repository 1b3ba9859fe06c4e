use std::f32::consts::TAU;

use opn2::registers::{ChannelField, GlobalField, OperatorField, RegisterEffect, decode};

/// Output scale matching the core's single-carrier peak.
const OUTPUT_SCALE: f32 = 16384.0;

/// Envelope segment for the modeled ADSR.
#[derive(Clone, Copy, PartialEq, Eq)]
enum EnvStage {
    Idle,
    Attack,
    Decay,
    Release,
}

/// Smooth exponential ADSR driven by register rate fields.
#[derive(Clone, Copy)]
struct SoftEnvelope {
    stage: EnvStage,
    level: f32,
    attack_coeff: f32,
    decay_coeff: f32,
    sustain: f32,
    release_coeff: f32,
}

impl SoftEnvelope {
    fn new() -> Self {
        SoftEnvelope {
            stage: EnvStage::Idle,
            level: 0.0,
            attack_coeff: 0.5,
            decay_coeff: 0.0,
            sustain: 1.0,
            release_coeff: 0.01,
        }
    }

    /// Map a 5-bit rate to a per-sample exponential coefficient. Rate 0
    /// freezes the segment, 31 is nearly instant.
    fn rate_coeff(rate: u8, sample_rate: f32) -> f32 {
        if rate == 0 {
            return 0.0;
        }
        // Double speed roughly every four rate steps.
        let per_second = 8.0 * 2f32.powf(rate as f32 / 4.0 - 4.0);
        (per_second / sample_rate).min(1.0)
    }

    fn set_rates(&mut self, ar: u8, dr: u8, sl: u8, rr: u8, sample_rate: f32) {
        self.attack_coeff = Self::rate_coeff(ar, sample_rate) * 4.0;
        self.decay_coeff = Self::rate_coeff(dr, sample_rate);
        // 3 dB per sustain level step.
        self.sustain = if sl >= 15 { 0.0 } else { 10f32.powf(-0.15 * sl as f32) };
        self.release_coeff = Self::rate_coeff(rr * 2 + 1, sample_rate).max(1e-4);
    }

    fn key_on(&mut self) {
        self.stage = EnvStage::Attack;
    }

    fn key_off(&mut self) {
        if self.stage != EnvStage::Idle {
            self.stage = EnvStage::Release;
        }
    }

    fn advance(&mut self) -> f32 {
        match self.stage {
            EnvStage::Idle => {}
            EnvStage::Attack => {
                self.level += self.attack_coeff * (1.02 - self.level);
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = EnvStage::Decay;
                }
            }
            EnvStage::Decay => {
                self.level += self.decay_coeff * (self.sustain - self.level);
            }
            EnvStage::Release => {
                self.level -= self.release_coeff * self.level;
                if self.level < 1e-4 {
                    self.level = 0.0;
                    self.stage = EnvStage::Idle;
                }
            }
        }
        self.level
    }

    fn is_idle(&self) -> bool {
        self.stage == EnvStage::Idle
    }
}

/// Raw per-operator register fields the voice model reads from.
#[derive(Clone, Copy, Default)]
struct OpParams {
    mul: u8,
    tl: u8,
    ar: u8,
    dr: u8,
    sl: u8,
    rr: u8,
}

/// One channel modeled as a two-operator FM voice.
///
/// Operator 0 is the modulator, operator 3 the carrier, which covers the
/// audible behavior of the common serial algorithms; parallel-carrier
/// algorithms simply sound as one carrier.
#[derive(Clone, Copy)]
struct FmVoice {
    ops: [OpParams; 4],
    freq: f32,
    freq_latch: u8,
    mod_phase: f32,
    car_phase: f32,
    mod_env: SoftEnvelope,
    car_env: SoftEnvelope,
    feedback: u8,
    algorithm: u8,
    pan_left: bool,
    pan_right: bool,
    muted: bool,
}

impl FmVoice {
    fn new() -> Self {
        FmVoice {
            ops: [OpParams::default(); 4],
            freq: 0.0,
            freq_latch: 0,
            mod_phase: 0.0,
            car_phase: 0.0,
            mod_env: SoftEnvelope::new(),
            car_env: SoftEnvelope::new(),
            feedback: 0,
            algorithm: 0,
            pan_left: true,
            pan_right: true,
            muted: false,
        }
    }

    fn commit_freq(&mut self, low: u8, master_clock: f32) {
        let block = (self.freq_latch >> 3) & 7;
        let fnum = (((self.freq_latch & 7) as u32) << 8) | low as u32;
        // Same pitch law as the hardware: fnum scaled by block, against
        // the native sample rate of master_clock / 144.
        self.freq = fnum as f32 * 2f32.powi(block as i32 - 1) * master_clock
            / (144.0 * (1 << 20) as f32);
    }

    fn refresh_envelopes(&mut self, sample_rate: f32) {
        let m = self.ops[0];
        let c = self.ops[3];
        self.mod_env.set_rates(m.ar, m.dr, m.sl, m.rr, sample_rate);
        self.car_env.set_rates(c.ar, c.dr, c.sl, c.rr, sample_rate);
    }

    fn key(&mut self, mask: u8) {
        if mask != 0 {
            self.mod_env.key_on();
            self.car_env.key_on();
        } else {
            self.mod_env.key_off();
            self.car_env.key_off();
        }
    }

    /// 0.75 dB per total-level step, as a linear gain.
    fn tl_gain(tl: u8) -> f32 {
        10f32.powf(-0.0375 * tl as f32)
    }

    fn advance(&mut self, sample_rate: f32) -> f32 {
        if self.car_env.is_idle() || self.freq <= 0.0 {
            return 0.0;
        }
        let mul = |m: u8| if m == 0 { 0.5 } else { m as f32 };
        let mod_inc = TAU * self.freq * mul(self.ops[0].mul) / sample_rate;
        let car_inc = TAU * self.freq * mul(self.ops[3].mul) / sample_rate;

        self.mod_phase = (self.mod_phase + mod_inc) % TAU;
        self.car_phase = (self.car_phase + car_inc) % TAU;

        // Modulation index follows the modulator's level and envelope;
        // feedback fattens it.
        let mod_depth = 4.0 * Self::tl_gain(self.ops[0].tl)
            * self.mod_env.advance()
            * (1.0 + self.feedback as f32 / 7.0);
        let modulation = if self.algorithm == 7 { 0.0 } else { mod_depth * self.mod_phase.sin() };

        let amp = Self::tl_gain(self.ops[3].tl) * self.car_env.advance();
        amp * (self.car_phase + modulation).sin()
    }
}

/// Modeled OPN2 synthesizer.
///
/// Intentionally not register-exact: writes apply immediately (no busy
/// window), envelopes are smooth exponentials, and each channel renders
/// as a two-operator voice. The register interface and pitch law match
/// the core, so the same driver code produces a recognizable rendition.
pub struct SoftFm {
    registers: [u8; 0x200],
    voices: [FmVoice; 6],
    master_clock: f32,
    sample_rate: f32,
    master_gain: f32,
    dac_enable: bool,
    dac_data: u8,
}

impl SoftFm {
    /// Create a synthesizer with NTSC clocks at 44.1 kHz.
    pub fn new() -> Self {
        Self::with_clocks(opn2_common::NTSC_MASTER_CLOCK, opn2_common::DEFAULT_SAMPLE_RATE)
    }

    /// Create a synthesizer with explicit clocks.
    pub fn with_clocks(master_clock: u32, sample_rate: u32) -> Self {
        SoftFm {
            registers: [0; 0x200],
            voices: [FmVoice::new(); 6],
            master_clock: master_clock as f32,
            sample_rate: sample_rate.max(1) as f32,
            master_gain: 1.0,
            dac_enable: false,
            dac_data: 0x80,
        }
    }

    /// Reset all voices and registers, keeping mute flags.
    pub fn reset(&mut self, master_clock: u32, sample_rate: u32) {
        let mutes: Vec<bool> = self.voices.iter().map(|v| v.muted).collect();
        *self = Self::with_clocks(master_clock, sample_rate);
        for (v, m) in self.voices.iter_mut().zip(mutes) {
            v.muted = m;
        }
    }

    /// Apply a register write immediately.
    pub fn write_register(&mut self, addr: u32, value: u8) {
        if addr >= 0x200 {
            return;
        }
        self.registers[addr as usize] = value;
        let Some(effect) = decode(addr) else { return };
        match effect {
            RegisterEffect::Global(GlobalField::KeyOnOff) => {
                if value & 3 == 3 {
                    return;
                }
                let idx = (value & 3) as usize + if value & 4 != 0 { 3 } else { 0 };
                self.voices[idx].key(value >> 4);
            }
            RegisterEffect::Global(GlobalField::DacData) => self.dac_data = value,
            RegisterEffect::Global(GlobalField::DacEnable) => {
                self.dac_enable = value & 0x80 != 0;
            }
            // Timers and the LFO have no modeled equivalent.
            RegisterEffect::Global(_) => {}
            RegisterEffect::Operator { channel, op, field } => {
                let sample_rate = self.sample_rate;
                let voice = &mut self.voices[channel];
                let p = &mut voice.ops[op];
                match field {
                    OperatorField::DetuneMultiple => p.mul = value & 15,
                    OperatorField::TotalLevel => p.tl = value & 0x7F,
                    OperatorField::KeyScaleAttack => p.ar = value & 0x1F,
                    OperatorField::AmDecay => p.dr = value & 0x1F,
                    OperatorField::SustainRate => {}
                    OperatorField::SustainLevelRelease => {
                        p.sl = value >> 4;
                        p.rr = value & 0x0F;
                    }
                    OperatorField::SsgMode => {}
                }
                voice.refresh_envelopes(sample_rate);
            }
            RegisterEffect::Channel { channel, field } => {
                let master_clock = self.master_clock;
                let voice = &mut self.voices[channel];
                match field {
                    ChannelField::FreqLow => voice.commit_freq(value, master_clock),
                    ChannelField::FreqHigh => voice.freq_latch = value & 0x3F,
                    ChannelField::FeedbackAlgorithm => {
                        voice.feedback = (value >> 3) & 7;
                        voice.algorithm = value & 7;
                    }
                    ChannelField::PanSensitivity => {
                        voice.pan_left = value & 0x80 != 0;
                        voice.pan_right = value & 0x40 != 0;
                    }
                }
            }
        }
    }

    /// Snapshot of the register file.
    pub fn register(&self, addr: u32) -> u8 {
        if addr < 0x200 { self.registers[addr as usize] } else { 0 }
    }

    /// Render one stereo frame.
    pub fn render_frame(&mut self) -> (i32, i32) {
        let mut left = 0.0f32;
        let mut right = 0.0f32;
        for (i, voice) in self.voices.iter_mut().enumerate() {
            let mut v = voice.advance(self.sample_rate);
            if i == 5 && self.dac_enable {
                v = (self.dac_data as f32 - 128.0) / 128.0;
            }
            if voice.muted {
                continue;
            }
            if voice.pan_left {
                left += v;
            }
            if voice.pan_right {
                right += v;
            }
        }
        let scale = OUTPUT_SCALE * self.master_gain;
        ((left * scale) as i32, (right * scale) as i32)
    }

    /// Master attenuation in 1/16-octave steps, like the core.
    pub fn set_volume(&mut self, level: i32) {
        self.master_gain = 2f32.powf(-(level.clamp(0, 255) as f32) / 16.0);
    }

    /// Mute or unmute a channel.
    pub fn set_channel_mute(&mut self, channel: usize, mute: bool) {
        if channel < 6 {
            self.voices[channel].muted = mute;
        }
    }

    /// Current mute state of a channel.
    pub fn is_channel_muted(&self, channel: usize) -> bool {
        channel < 6 && self.voices[channel].muted
    }
}

impl Default for SoftFm {
    fn default() -> Self {
        Self::new()
    }
}
