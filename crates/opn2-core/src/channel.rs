//! An FM channel: four operators wired by an algorithm.
//!
//! Operators are evaluated in index order each sample; a modulator's
//! output reaches its carrier within the same sample. Operator 0 always
//! owns the self-feedback path.

use crate::envelope::EnvelopeClock;
use crate::operator::{MOD_SHIFT, Operator};
use crate::tables::{PM_SHIFT, SynthTables, key_code};

/// Modulation source for one operator slot.
#[derive(Clone, Copy, Debug)]
pub enum ModInput {
    /// No modulation.
    None,
    /// Averaged self-feedback, depth set by the channel feedback level.
    Feedback,
    /// Output of an earlier operator this sample.
    Op(usize),
    /// Sum of two earlier operators this sample.
    Pair(usize, usize),
}

/// One of the eight OPN modulation topologies.
pub struct AlgorithmSpec {
    /// Modulation source per operator slot.
    pub input: [ModInput; 4],
    /// Bit mask of the slots mixed into the channel output.
    pub carriers: u8,
}

/// The eight algorithms, indexed by the 3-bit register field.
pub const ALGORITHMS: [AlgorithmSpec; 8] = [
    // 0: serial chain 0 -> 1 -> 2 -> 3
    AlgorithmSpec {
        input: [ModInput::Feedback, ModInput::Op(0), ModInput::Op(1), ModInput::Op(2)],
        carriers: 0b1000,
    },
    // 1: (0 + 1) -> 2 -> 3
    AlgorithmSpec {
        input: [ModInput::Feedback, ModInput::None, ModInput::Pair(0, 1), ModInput::Op(2)],
        carriers: 0b1000,
    },
    // 2: 0 -> 3, 1 -> 2 -> 3
    AlgorithmSpec {
        input: [ModInput::Feedback, ModInput::None, ModInput::Op(1), ModInput::Pair(0, 2)],
        carriers: 0b1000,
    },
    // 3: 0 -> 1 -> 3, 2 -> 3
    AlgorithmSpec {
        input: [ModInput::Feedback, ModInput::Op(0), ModInput::None, ModInput::Pair(1, 2)],
        carriers: 0b1000,
    },
    // 4: two stacks, 0 -> 1 and 2 -> 3
    AlgorithmSpec {
        input: [ModInput::Feedback, ModInput::Op(0), ModInput::None, ModInput::Op(2)],
        carriers: 0b1010,
    },
    // 5: 0 modulates 1, 2 and 3
    AlgorithmSpec {
        input: [ModInput::Feedback, ModInput::Op(0), ModInput::Op(0), ModInput::Op(0)],
        carriers: 0b1110,
    },
    // 6: 0 -> 1, plain 2 and 3
    AlgorithmSpec {
        input: [ModInput::Feedback, ModInput::Op(0), ModInput::None, ModInput::None],
        carriers: 0b1110,
    },
    // 7: four parallel carriers
    AlgorithmSpec {
        input: [ModInput::Feedback, ModInput::None, ModInput::None, ModInput::None],
        carriers: 0b1111,
    },
];

bitflags::bitflags! {
    /// Stereo routing bits from the pan register.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct OutputFlags: u8 {
        /// Mix into the left output.
        const LEFT = 0x80;
        /// Mix into the right output.
        const RIGHT = 0x40;
    }
}

impl Default for OutputFlags {
    fn default() -> Self {
        OutputFlags::LEFT | OutputFlags::RIGHT
    }
}

/// Clock scaling shared by phase and envelope generators.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChannelClocks {
    /// Fixed-point master-clock to sample-rate ratio for phase.
    pub phase_cps: u32,
    /// Envelope speed scale.
    pub eg: EnvelopeClock,
}

/// One FM channel.
#[derive(Clone, Debug, Default)]
pub struct Channel {
    ops: [Operator; 4],
    algorithm: u8,
    feedback: u8,
    fnum: u16,
    block: u8,
    kcode: u8,
    /// Pending block/fnum-high byte, committed by the fnum-low write.
    freq_latch: u8,
    ams: u8,
    pms: u8,
    pan: OutputFlags,
    muted: bool,
}

impl Channel {
    /// Create a silent channel panned to both outputs.
    pub fn new() -> Self {
        Channel {
            ops: [Operator::new(), Operator::new(), Operator::new(), Operator::new()],
            pan: OutputFlags::default(),
            ..Default::default()
        }
    }

    // ------------------------------------------------------------------
    // Register fields
    // ------------------------------------------------------------------

    /// Latch the block/fnum-high byte; nothing changes until the low
    /// byte arrives.
    pub fn set_freq_high(&mut self, v: u8) {
        self.freq_latch = v & 0x3F;
    }

    /// Write the fnum low byte: commits the latched high byte so both
    /// halves take effect atomically.
    pub fn set_freq_low(&mut self, v: u8, clocks: &ChannelClocks) {
        self.block = (self.freq_latch >> 3) & 7;
        self.fnum = ((self.freq_latch as u16 & 7) << 8) | v as u16;
        self.kcode = key_code(self.block, self.fnum);
        self.refresh(clocks);
    }

    /// Feedback / algorithm register.
    pub fn set_fb_alg(&mut self, v: u8) {
        self.feedback = (v >> 3) & 7;
        self.algorithm = v & 7;
    }

    /// Pan / sensitivity register: stereo routing plus AM and PM depth.
    pub fn set_pan_sens(&mut self, v: u8) {
        self.pan = OutputFlags::from_bits_truncate(v);
        self.ams = (v >> 4) & 3;
        self.pms = v & 7;
    }

    /// Stereo routing for this channel.
    #[inline]
    pub fn pan(&self) -> OutputFlags {
        self.pan
    }

    /// Mute control; a muted channel keeps running but mixes silence.
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Whether the channel is muted.
    #[inline]
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Mutable access to one operator (register decode).
    pub fn op_mut(&mut self, idx: usize) -> &mut Operator {
        &mut self.ops[idx]
    }

    /// Recompute derived state for all operators after a register or
    /// clock change.
    pub fn refresh(&mut self, clocks: &ChannelClocks) {
        for op in &mut self.ops {
            op.refresh(self.fnum, self.block, self.kcode, clocks.phase_cps, &clocks.eg);
        }
    }

    // ------------------------------------------------------------------
    // Keying
    // ------------------------------------------------------------------

    /// Apply a key on/off mask, one bit per operator.
    pub fn key_mask(&mut self, mask: u8) {
        for (i, op) in self.ops.iter_mut().enumerate() {
            if mask & (1 << i) != 0 {
                op.key_on();
            } else {
                op.key_off();
            }
        }
    }

    /// Key on every operator (CSM retrigger).
    pub fn key_on_all(&mut self) {
        for op in &mut self.ops {
            op.key_on();
        }
    }

    /// Key off every operator.
    pub fn key_off_all(&mut self) {
        for op in &mut self.ops {
            op.key_off();
        }
    }

    /// True when every operator has fully released.
    pub fn is_silent(&self) -> bool {
        self.ops.iter().all(Operator::is_silent)
    }

    // ------------------------------------------------------------------
    // Synthesis
    // ------------------------------------------------------------------

    /// Produce one mono sample.
    ///
    /// `lfo_adr` is the shared LFO position, or `None` when the LFO is
    /// stopped. `master` is the master attenuation, applied to carriers
    /// only so modulation depth stays volume-independent.
    pub fn synthesize(&mut self, lfo_adr: Option<usize>, master: u32, t: &SynthTables) -> i32 {
        let (am, pm) = match lfo_adr {
            Some(a) => (t.am[self.ams as usize][a], t.pm[self.pms as usize][a]),
            None => (0, 1 << PM_SHIFT),
        };
        let alg = &ALGORITHMS[self.algorithm as usize];
        let mut outputs = [0i32; 4];
        let mut mix = 0i32;
        for i in 0..4 {
            let input = match alg.input[i] {
                ModInput::None => 0,
                ModInput::Feedback => self.ops[i].feedback_input(self.feedback),
                ModInput::Op(j) => outputs[j] >> MOD_SHIFT,
                ModInput::Pair(a, b) => (outputs[a] + outputs[b]) >> MOD_SHIFT,
            };
            let is_carrier = alg.carriers & (1 << i) != 0;
            let am_att = if self.ops[i].am_enabled() { am } else { 0 };
            let extra = am_att + if is_carrier { master } else { 0 };
            let out = self.ops[i].synthesize(input, extra, pm, t);
            outputs[i] = out;
            if matches!(alg.input[i], ModInput::Feedback) {
                self.ops[i].push_feedback(out);
            }
            if is_carrier {
                mix += out;
            }
        }
        if self.muted { 0 } else { mix }
    }

    /// Reset to power-on state.
    pub fn reset(&mut self) {
        *self = Channel::new();
    }
}
