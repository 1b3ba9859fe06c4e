//! The OPN2 chip: register file, six channels, LFO, timers, DAC and the
//! write scheduler, wired into the [`SynthesisBackend`] interface.
//!
//! All state changes arrive through the register ports. Writes are gated
//! by the busy window and applied at the sample where their window
//! elapses, so a rendered stream reproduces hardware write timing.

use opn2_common::{
    CYCLES_PER_SAMPLE, DEFAULT_SAMPLE_RATE, NTSC_MASTER_CLOCK, NUM_CHANNELS, SynthesisBackend,
};

use crate::channel::{Channel, ChannelClocks, OutputFlags};
use crate::envelope::EnvelopeClock;
use crate::lfo::Lfo;
use crate::registers::{ChannelField, GlobalField, OperatorField, RegisterEffect, decode};
use crate::scheduler::{HARD_RESET_WAIT_CYCLES, WriteScheduler};
use crate::tables::{CPS_SHIFT_P, LOG_BITS, div_fix, synth_tables};

/// Channel driven by the DAC when register 0x2B enables it.
const DAC_CHANNEL: usize = 5;

/// Scales the unsigned 8-bit DAC sample to carrier output range.
const DAC_SHIFT: u32 = 7;

/// OPN2 (YM2612) FM sound chip.
pub struct Opn2 {
    /// Register file, both banks; reflects accepted writes only.
    regs: [u8; 0x200],
    channels: [Channel; NUM_CHANNELS],
    lfo: Lfo,
    scheduler: WriteScheduler,
    clocks: ChannelClocks,
    master_clock: u32,
    sample_rate: u32,
    /// Residual master cycles carried between output samples.
    cycle_acc: u32,
    /// Master attenuation in log units, applied to carriers.
    master_att: u32,

    timer_a_period: u32,
    timer_b_period: u32,
    /// Remaining master cycles; 0 means stopped.
    timer_a_count: u32,
    timer_b_count: u32,
    timer_a_flag_en: bool,
    timer_b_flag_en: bool,
    timer_a_flag: bool,
    timer_b_flag: bool,
    /// Timer A retriggers channel 2 when set.
    csm_mode: bool,

    dac_enable: bool,
    dac_data: u8,
}

impl Opn2 {
    /// Create a chip with NTSC master clock at 44.1 kHz.
    pub fn new() -> Self {
        Self::with_clocks(NTSC_MASTER_CLOCK, DEFAULT_SAMPLE_RATE)
    }

    /// Create a chip with explicit clocks.
    pub fn with_clocks(master_clock: u32, sample_rate: u32) -> Self {
        let mut chip = Opn2 {
            regs: [0; 0x200],
            channels: std::array::from_fn(|_| Channel::new()),
            lfo: Lfo::new(),
            scheduler: WriteScheduler::new(),
            clocks: ChannelClocks::default(),
            master_clock,
            sample_rate,
            cycle_acc: 0,
            master_att: 0,
            timer_a_period: 0,
            timer_b_period: 0,
            timer_a_count: 0,
            timer_b_count: 0,
            timer_a_flag_en: false,
            timer_b_flag_en: false,
            timer_a_flag: false,
            timer_b_flag: false,
            csm_mode: false,
            dac_enable: false,
            dac_data: 0x80,
        };
        chip.reset_internal(master_clock, sample_rate);
        chip
    }

    fn reset_internal(&mut self, master_clock: u32, sample_rate: u32) {
        self.master_clock = master_clock;
        self.sample_rate = sample_rate.max(1);
        self.clocks = ChannelClocks {
            phase_cps: div_fix(master_clock, CYCLES_PER_SAMPLE * self.sample_rate, CPS_SHIFT_P),
            eg: EnvelopeClock::new(master_clock, self.sample_rate),
        };
        self.regs = [0; 0x200];
        self.scheduler.reset();
        self.lfo.reset();
        self.cycle_acc = 0;
        self.timer_a_period = 0;
        self.timer_b_period = 0;
        self.timer_a_count = 0;
        self.timer_b_count = 0;
        self.timer_a_flag_en = false;
        self.timer_b_flag_en = false;
        self.timer_a_flag = false;
        self.timer_b_flag = false;
        self.csm_mode = false;
        self.dac_enable = false;
        self.dac_data = 0x80;
        for ch in &mut self.channels {
            let muted = ch.is_muted();
            ch.reset();
            ch.set_muted(muted);
            ch.refresh(&self.clocks);
        }
    }

    /// Chip status byte: busy flag and timer overflow flags.
    pub fn status(&self) -> u8 {
        (u8::from(self.scheduler.is_busy()) << 7)
            | (u8::from(self.timer_b_flag) << 1)
            | u8::from(self.timer_a_flag)
    }

    /// Peek the register file (accepted writes only).
    pub fn register(&self, addr: u32) -> u8 {
        if addr < 0x200 { self.regs[addr as usize] } else { 0 }
    }

    /// Queue the glitch-free silencing sequence for one channel.
    ///
    /// Each operator gets maximum release rate and sustain level plus a
    /// silent total level, the channel is keyed off, and a settling gap
    /// follows so the release completes before the caller programs the
    /// next voice.
    pub fn enqueue_hard_reset(&mut self, channel: usize) {
        let channel = channel % NUM_CHANNELS;
        let bank = (channel / 3) as u16 * 0x100;
        let low = (channel % 3) as u16;
        for op in 0..4u16 {
            let slot = op * 4 + low;
            self.scheduler.push_write(bank + 0x80 + slot, 0xFF);
            self.scheduler.push_write(bank + 0x40 + slot, 0x7F);
        }
        let code = (channel % 3) as u8 | if channel >= 3 { 4 } else { 0 };
        self.scheduler.push_write(0x28, code);
        self.scheduler.push_wait(HARD_RESET_WAIT_CYCLES);
    }

    // ------------------------------------------------------------------
    // Register application
    // ------------------------------------------------------------------

    fn apply_register(&mut self, addr: u32, value: u8) {
        self.regs[addr as usize] = value;
        let Some(effect) = decode(addr) else { return };
        match effect {
            RegisterEffect::Global(field) => self.apply_global(field, value),
            RegisterEffect::Operator { channel, op, field } => {
                let clocks = self.clocks;
                let ch = &mut self.channels[channel];
                let o = ch.op_mut(op);
                match field {
                    OperatorField::DetuneMultiple => o.set_dt_mul(value),
                    OperatorField::TotalLevel => o.set_tl(value),
                    OperatorField::KeyScaleAttack => o.set_ks_ar(value),
                    OperatorField::AmDecay => o.set_am_dr(value),
                    OperatorField::SustainRate => o.set_sr(value),
                    OperatorField::SustainLevelRelease => o.set_sl_rr(value),
                    OperatorField::SsgMode => o.set_ssg(value),
                }
                ch.refresh(&clocks);
            }
            RegisterEffect::Channel { channel, field } => {
                let clocks = self.clocks;
                let ch = &mut self.channels[channel];
                match field {
                    ChannelField::FreqLow => ch.set_freq_low(value, &clocks),
                    ChannelField::FreqHigh => ch.set_freq_high(value),
                    ChannelField::FeedbackAlgorithm => ch.set_fb_alg(value),
                    ChannelField::PanSensitivity => ch.set_pan_sens(value),
                }
            }
        }
    }

    fn apply_global(&mut self, field: GlobalField, value: u8) {
        match field {
            GlobalField::LfoControl => {
                self.lfo.set_frequency(value & 7, self.sample_rate);
                self.lfo.set_enabled(value & 0x08 != 0);
            }
            GlobalField::TimerAHigh | GlobalField::TimerALow => {
                let ta = ((self.regs[0x24] as u32) << 2) | (self.regs[0x25] as u32 & 3);
                self.timer_a_period = CYCLES_PER_SAMPLE * (1024 - ta);
            }
            GlobalField::TimerB => {
                self.timer_b_period = CYCLES_PER_SAMPLE * 16 * (256 - value as u32);
            }
            GlobalField::TimerControl => {
                self.csm_mode = value & 0xC0 == 0x80;
                self.timer_a_flag_en = value & 0x04 != 0;
                self.timer_b_flag_en = value & 0x08 != 0;
                if value & 0x01 != 0 {
                    if self.timer_a_count == 0 {
                        self.timer_a_count = self.timer_a_period.max(CYCLES_PER_SAMPLE);
                    }
                } else {
                    self.timer_a_count = 0;
                }
                if value & 0x02 != 0 {
                    if self.timer_b_count == 0 {
                        self.timer_b_count = self.timer_b_period.max(CYCLES_PER_SAMPLE);
                    }
                } else {
                    self.timer_b_count = 0;
                }
                if value & 0x10 != 0 {
                    self.timer_a_flag = false;
                }
                if value & 0x20 != 0 {
                    self.timer_b_flag = false;
                }
            }
            GlobalField::KeyOnOff => {
                if value & 3 == 3 {
                    return;
                }
                let channel = (value & 3) as usize + if value & 4 != 0 { 3 } else { 0 };
                self.channels[channel].key_mask(value >> 4);
            }
            GlobalField::DacData => self.dac_data = value,
            GlobalField::DacEnable => self.dac_enable = value & 0x80 != 0,
        }
    }

    // ------------------------------------------------------------------
    // Time
    // ------------------------------------------------------------------

    fn tick_timers(&mut self, cycles: u32) {
        if self.timer_a_count != 0 {
            if cycles < self.timer_a_count {
                self.timer_a_count -= cycles;
            } else {
                let period = self.timer_a_period.max(CYCLES_PER_SAMPLE);
                let over = (cycles - self.timer_a_count) % period;
                self.timer_a_count = period - over;
                if self.timer_a_flag_en {
                    self.timer_a_flag = true;
                }
                if self.csm_mode {
                    self.channels[2].key_off_all();
                    self.channels[2].key_on_all();
                }
            }
        }
        if self.timer_b_count != 0 {
            if cycles < self.timer_b_count {
                self.timer_b_count -= cycles;
            } else {
                let period = self.timer_b_period.max(CYCLES_PER_SAMPLE);
                let over = (cycles - self.timer_b_count) % period;
                self.timer_b_count = period - over;
                if self.timer_b_flag_en {
                    self.timer_b_flag = true;
                }
            }
        }
    }
}

impl Default for Opn2 {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthesisBackend for Opn2 {
    fn new() -> Self {
        Opn2::new()
    }

    fn with_clocks(master_clock: u32, sample_rate: u32) -> Self {
        Opn2::with_clocks(master_clock, sample_rate)
    }

    fn reset(&mut self, master_clock: u32, sample_rate: u32) {
        self.reset_internal(master_clock, sample_rate);
    }

    fn write(&mut self, addr: u32, value: u8) {
        if addr < 0x200 {
            self.scheduler.push_write(addr as u16, value);
        }
    }

    fn read(&self, _addr: u32) -> u8 {
        self.status()
    }

    fn generate(&mut self, buffer: &mut [i32]) {
        debug_assert!(buffer.len() % 2 == 0, "stereo buffer length must be even");
        let t = synth_tables();
        for frame in buffer.chunks_exact_mut(2) {
            self.cycle_acc += self.master_clock;
            let mut budget = self.cycle_acc / self.sample_rate;
            self.cycle_acc %= self.sample_rate;
            self.tick_timers(budget);
            while let Some((addr, value)) = self.scheduler.accept(&mut budget) {
                self.apply_register(addr as u32, value);
            }

            self.lfo.step();
            let lfo_adr = if self.lfo.is_enabled() { Some(self.lfo.address()) } else { None };

            let mut left = 0i32;
            let mut right = 0i32;
            for (i, ch) in self.channels.iter_mut().enumerate() {
                let mut out = ch.synthesize(lfo_adr, self.master_att, t);
                if i == DAC_CHANNEL && self.dac_enable {
                    out = if ch.is_muted() {
                        0
                    } else {
                        (self.dac_data as i32 - 0x80) << DAC_SHIFT
                    };
                }
                let pan = ch.pan();
                if pan.contains(OutputFlags::LEFT) {
                    left += out;
                }
                if pan.contains(OutputFlags::RIGHT) {
                    right += out;
                }
            }
            frame[0] = left;
            frame[1] = right;
        }
    }

    fn set_volume(&mut self, level: i32) {
        self.master_att = (level.clamp(0, 255) as u32) << (LOG_BITS - 4 + 1);
    }

    fn set_channel_mute(&mut self, channel: usize, mute: bool) {
        if channel < NUM_CHANNELS {
            self.channels[channel].set_muted(mute);
        }
    }

    fn is_channel_muted(&self, channel: usize) -> bool {
        channel < NUM_CHANNELS && self.channels[channel].is_muted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Program a simple single-carrier voice on one channel and key it on.
    fn program_voice(chip: &mut Opn2, channel: usize) {
        let bank = (channel / 3) as u32 * 0x100;
        let low = (channel % 3) as u32;
        chip.write(bank + 0xB0 + low, 0x07); // algorithm 7, no feedback
        chip.write(bank + 0xB4 + low, 0xC0); // both outputs
        for op in 0..4u32 {
            let slot = op * 4 + low;
            chip.write(bank + 0x30 + slot, 0x01); // mul 1
            chip.write(bank + 0x40 + slot, if op == 0 { 0x00 } else { 0x7F });
            chip.write(bank + 0x50 + slot, 0x1F); // max attack
            chip.write(bank + 0x60 + slot, 0x00);
            chip.write(bank + 0x70 + slot, 0x00);
            chip.write(bank + 0x80 + slot, 0x05);
        }
        chip.write(bank + 0xA4 + low, 0x22); // block 4
        chip.write(bank + 0xA0 + low, 0xE8);
        let code = (channel % 3) as u8 | if channel >= 3 { 4 } else { 0 };
        chip.write(0x28, 0xF0 | code);
    }

    fn render(chip: &mut Opn2, frames: usize) -> Vec<i32> {
        let mut buf = vec![0i32; frames * 2];
        chip.generate(&mut buf);
        buf
    }

    fn peak(buf: &[i32]) -> i32 {
        buf.iter().map(|v| v.abs()).max().unwrap_or(0)
    }

    #[test]
    fn fresh_chip_renders_silence() {
        let mut chip = Opn2::new();
        let buf = render(&mut chip, 512);
        assert!(buf.iter().all(|&v| v == 0));
    }

    #[test]
    fn keyed_voice_renders_audio_on_both_outputs() {
        let mut chip = Opn2::new();
        program_voice(&mut chip, 0);
        let buf = render(&mut chip, 4096);
        let left: Vec<i32> = buf.iter().step_by(2).copied().collect();
        let right: Vec<i32> = buf.iter().skip(1).step_by(2).copied().collect();
        assert!(peak(&left) > 4000);
        assert_eq!(left, right, "centered voice should be symmetric");
    }

    #[test]
    fn second_bank_channels_render() {
        let mut chip = Opn2::new();
        program_voice(&mut chip, 4);
        let buf = render(&mut chip, 4096);
        assert!(peak(&buf) > 4000);
    }

    #[test]
    fn pan_left_keeps_right_silent() {
        let mut chip = Opn2::new();
        program_voice(&mut chip, 0);
        chip.write(0xB4, 0x80);
        let buf = render(&mut chip, 4096);
        let right: Vec<i32> = buf.iter().skip(1).step_by(2).copied().collect();
        assert_eq!(peak(&right), 0);
    }

    #[test]
    fn busy_flag_sets_after_accepted_write_and_clears() {
        let mut chip = Opn2::new();
        chip.write(0x40, 0x10);
        // The write is accepted during generation; the busy window spans
        // about one output sample at 44.1 kHz.
        render(&mut chip, 1);
        assert_eq!(chip.read(0) & 0x80, 0x80);
        render(&mut chip, 4);
        assert_eq!(chip.read(0) & 0x80, 0);
        assert_eq!(chip.register(0x40), 0x10);
    }

    #[test]
    fn queued_writes_apply_in_order_across_samples() {
        let mut chip = Opn2::new();
        for v in 0..8u8 {
            chip.write(0x40, v);
        }
        render(&mut chip, 64);
        assert_eq!(chip.register(0x40), 7);
    }

    #[test]
    fn writes_to_unmapped_registers_are_dropped() {
        let mut chip = Opn2::new();
        chip.write(0x2000, 0xAA);
        chip.write(0xC0, 0x55);
        let buf = render(&mut chip, 256);
        assert!(buf.iter().all(|&v| v == 0));
        assert_eq!(chip.register(0xC0), 0x55, "file keeps the byte, synthesis ignores it");
    }

    #[test]
    fn rendering_is_deterministic_after_reset() {
        let mut chip = Opn2::new();
        program_voice(&mut chip, 0);
        let first = render(&mut chip, 2000);
        chip.reset(NTSC_MASTER_CLOCK, DEFAULT_SAMPLE_RATE);
        program_voice(&mut chip, 0);
        let second = render(&mut chip, 2000);
        assert_eq!(first, second);
    }

    #[test]
    fn reset_silences_and_clears_registers() {
        let mut chip = Opn2::new();
        program_voice(&mut chip, 0);
        render(&mut chip, 1000);
        chip.reset(NTSC_MASTER_CLOCK, DEFAULT_SAMPLE_RATE);
        assert_eq!(chip.register(0xB0), 0);
        let buf = render(&mut chip, 512);
        assert!(buf.iter().all(|&v| v == 0));
    }

    #[test]
    fn timer_a_overflow_raises_its_flag() {
        let mut chip = Opn2::new();
        chip.write(0x24, 0xFF); // short period
        chip.write(0x25, 0x03);
        chip.write(0x27, 0x05); // load A, enable A flag
        render(&mut chip, 64);
        assert_eq!(chip.read(0) & 1, 1);
        // Resetting the flag clears it until the next overflow.
        chip.write(0x27, 0x15);
        render(&mut chip, 1);
        assert_eq!(chip.read(0) & 1, 0);
    }

    #[test]
    fn timer_b_overflow_raises_its_flag() {
        let mut chip = Opn2::new();
        chip.write(0x26, 0xFF);
        chip.write(0x27, 0x0A); // load B, enable B flag
        render(&mut chip, 64);
        assert_eq!(chip.read(0) & 2, 2);
    }

    #[test]
    fn timer_without_flag_enable_stays_clear() {
        let mut chip = Opn2::new();
        chip.write(0x24, 0xFF);
        chip.write(0x25, 0x03);
        chip.write(0x27, 0x01); // load A only
        render(&mut chip, 64);
        assert_eq!(chip.read(0) & 1, 0);
    }

    #[test]
    fn csm_mode_retriggers_channel_two() {
        let mut chip = Opn2::new();
        program_voice(&mut chip, 2);
        // Fast release so a plain key-off goes silent quickly.
        for op in 0..4u32 {
            chip.write(0x80 + op * 4 + 2, 0x0F);
        }
        chip.write(0x28, 0x02); // key off channel 2
        render(&mut chip, 2048);
        let released = render(&mut chip, 1024);
        assert_eq!(peak(&released), 0, "release should have finished");
        // CSM alone keys the channel back on at every timer A overflow.
        chip.write(0x24, 0xFF);
        chip.write(0x25, 0x03);
        chip.write(0x27, 0x81); // CSM mode, load A
        render(&mut chip, 64);
        let buf = render(&mut chip, 4096);
        assert!(peak(&buf) > 1000, "CSM retrigger should key channel 2 on");
    }

    #[test]
    fn dac_replaces_channel_five() {
        let mut chip = Opn2::new();
        chip.write(0x1B4, 0xC0); // pan channel 5 to both
        chip.write(0x2B, 0x80);
        chip.write(0x2A, 0xFF);
        let buf = render(&mut chip, 16);
        let last = *buf.last().unwrap();
        assert_eq!(last, 127 << 7);
        chip.write(0x2A, 0x00);
        let buf = render(&mut chip, 16);
        assert_eq!(*buf.last().unwrap(), -128 << 7);
        // Disabling the DAC returns the channel to FM (silent here).
        chip.write(0x2B, 0x00);
        let buf = render(&mut chip, 16);
        assert_eq!(*buf.last().unwrap(), 0);
    }

    #[test]
    fn muted_channel_is_removed_from_the_mix() {
        let mut chip = Opn2::new();
        program_voice(&mut chip, 0);
        chip.set_channel_mute(0, true);
        assert!(chip.is_channel_muted(0));
        let buf = render(&mut chip, 2048);
        assert_eq!(peak(&buf), 0);
        chip.set_channel_mute(0, false);
        let buf = render(&mut chip, 2048);
        assert!(peak(&buf) > 0);
    }

    #[test]
    fn master_volume_attenuates_output() {
        let mut chip = Opn2::new();
        program_voice(&mut chip, 0);
        let loud = peak(&render(&mut chip, 4096));
        let mut soft_chip = Opn2::new();
        program_voice(&mut soft_chip, 0);
        soft_chip.set_volume(16); // one octave down
        let soft = peak(&render(&mut soft_chip, 4096));
        assert!(soft < loud);
        assert!(soft * 3 > loud);
    }

    #[test]
    fn hard_reset_sequence_silences_the_channel() {
        let mut chip = Opn2::new();
        program_voice(&mut chip, 0);
        render(&mut chip, 2000);
        chip.enqueue_hard_reset(0);
        // Drain the quiet sequence and its settling gap.
        render(&mut chip, 3000);
        let buf = render(&mut chip, 1024);
        assert_eq!(peak(&buf), 0, "channel should be fully released");
        // The voice can be reprogrammed cleanly afterwards.
        program_voice(&mut chip, 0);
        let buf = render(&mut chip, 4096);
        assert!(peak(&buf) > 4000);
    }

    #[test]
    fn sample_rate_conversion_preserves_pitch() {
        // Count zero crossings over one second at two output rates; the
        // fundamental should match within a few cycles.
        fn crossings(rate: u32) -> u32 {
            let mut chip = Opn2::with_clocks(NTSC_MASTER_CLOCK, rate);
            program_voice(&mut chip, 0);
            let buf = render(&mut chip, rate as usize);
            let left: Vec<i32> = buf.iter().step_by(2).copied().collect();
            let mut count = 0;
            for w in left.windows(2) {
                if w[0] <= 0 && w[1] > 0 {
                    count += 1;
                }
            }
            count
        }
        let at_44k = crossings(44_100);
        let at_48k = crossings(48_000);
        let diff = at_44k.abs_diff(at_48k);
        assert!(at_44k > 100, "expected an audible fundamental");
        assert!(diff < at_44k / 50, "{at_44k} vs {at_48k}");
    }
}
