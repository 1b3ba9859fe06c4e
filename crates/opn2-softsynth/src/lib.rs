//! Experimental Modeled Synthesizer Backend for OPN2
//!
//! This crate provides a non-register-exact, musical software synthesizer
//! that implements the [`SynthesisBackend`] trait. It can be used as a
//! drop-in replacement for the table-driven core when a lighter, smoother
//! rendering is preferred over accuracy.
//!
//! # Features
//!
//! - Two-operator floating point FM per channel
//! - Smooth exponential envelopes derived from the register rates
//! - Same register map and pitch law as the `opn2` core
//! - DAC channel and stereo panning
//!
//! # Example
//!
//! ```no_run
//! use opn2_common::SynthesisBackend;
//! use opn2_softsynth::SoftFm;
//!
//! let mut synth = SoftFm::new();
//! synth.write(0xA4, 0x22); // block/fnum high
//! synth.write(0xA0, 0x69); // fnum low
//! synth.write(0x28, 0xF0); // key on channel 0
//! let mut buffer = [0i32; 128];
//! synth.generate(&mut buffer);
//! ```

#![warn(missing_docs)]

pub use opn2_common::SynthesisBackend;

// Re-export the implementation
mod softsynth_impl;
pub use softsynth_impl::SoftFm;

// Implement the backend trait
impl SynthesisBackend for SoftFm {
    fn new() -> Self {
        SoftFm::new()
    }

    fn with_clocks(master_clock: u32, sample_rate: u32) -> Self {
        SoftFm::with_clocks(master_clock, sample_rate)
    }

    fn reset(&mut self, master_clock: u32, sample_rate: u32) {
        self.reset(master_clock, sample_rate);
    }

    fn write(&mut self, addr: u32, value: u8) {
        // No busy window: the model applies writes immediately.
        self.write_register(addr, value);
    }

    fn read(&self, _addr: u32) -> u8 {
        // Never busy, no timers.
        0
    }

    fn generate(&mut self, buffer: &mut [i32]) {
        for frame in buffer.chunks_exact_mut(2) {
            let (l, r) = self.render_frame();
            frame[0] = l;
            frame[1] = r;
        }
    }

    fn set_volume(&mut self, level: i32) {
        self.set_volume(level);
    }

    fn set_channel_mute(&mut self, channel: usize, mute: bool) {
        self.set_channel_mute(channel, mute);
    }

    fn is_channel_muted(&self, channel: usize) -> bool {
        self.is_channel_muted(channel)
    }
}
