//! Chip-wide low frequency oscillator.
//!
//! The LFO is a single free-running step counter shared by all channels.
//! It only produces a table address; each channel applies its own AM and
//! PM sensitivity by indexing the tremolo and vibrato tables with it.

use crate::tables::{LFO_LEN, LFO_SHIFT, div_fix};

/// Selectable LFO frequencies in centi-hertz (3.98 Hz .. 72.2 Hz).
const LFO_FREQ_CENTI_HZ: [u32; 8] = [398, 556, 602, 637, 688, 963, 4810, 7220];

/// Free-running LFO step counter.
#[derive(Clone, Debug, Default)]
pub struct Lfo {
    counter: u32,
    spd: u32,
    enabled: bool,
}

impl Lfo {
    /// Create a stopped LFO.
    pub fn new() -> Self {
        Self::default()
    }

    /// Select one of the eight hardware frequencies.
    pub fn set_frequency(&mut self, index: u8, sample_rate: u32) {
        let freq = LFO_FREQ_CENTI_HZ[(index & 7) as usize];
        self.spd = div_fix(freq * LFO_LEN as u32, sample_rate * 100, LFO_SHIFT);
    }

    /// Enable or disable the oscillator. Disabling rewinds it so every
    /// enable starts from the same point.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.counter = 0;
        }
    }

    /// Whether the oscillator is running.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Advance one output sample.
    #[inline]
    pub fn step(&mut self) {
        if self.enabled {
            self.counter = self.counter.wrapping_add(self.spd);
        }
    }

    /// Current position within the waveform tables.
    #[inline]
    pub fn address(&self) -> usize {
        ((self.counter >> LFO_SHIFT) as usize) & (LFO_LEN - 1)
    }

    /// Reset to power-on state.
    pub fn reset(&mut self) {
        *self = Lfo::default();
    }
}
