//! OPN2 (YM2612) FM synthesis core
//!
//! A register-exact emulation of the Yamaha OPN2 as integrated into the
//! Sega Mega Drive. Six four-operator FM channels, a chip-wide LFO,
//! interval timers with CSM retriggering, a PCM DAC on channel 6, and a
//! write scheduler reproducing the hardware busy window.
//!
//! # Features
//! - Log-domain synthesis: the hot path is integer adds and table lookups
//! - Full envelope generator including SSG-EG shapes
//! - Double-buffered frequency writes and busy-gated register timing
//! - Runs at any output sample rate; clock ratios are fixed-point
//!
//! # Backend Trait
//! The chip implements [`opn2_common::SynthesisBackend`], so it can be
//! swapped with the `opn2-softsynth` crate's modeled synthesizer.
//!
//! # Quick start
//! ```no_run
//! use opn2::Opn2;
//! use opn2_common::SynthesisBackend;
//!
//! let mut chip = Opn2::new();
//! chip.write(0xB0, 0x07); // channel 0: algorithm 7
//! chip.write(0x40, 0x00); // operator 0 at full level
//! chip.write(0x50, 0x1F); // max attack rate
//! chip.write(0xA4, 0x22); // block 4 (latched)
//! chip.write(0xA0, 0x69); // fnum low, commits the pair
//! chip.write(0x28, 0xF0); // key on
//!
//! let mut buffer = vec![0i32; 2 * 44100];
//! chip.generate(&mut buffer);
//! ```

#![warn(missing_docs)]

pub mod channel;
pub mod chip;
pub mod envelope;
pub mod lfo;
pub mod operator;
pub mod phase;
pub mod registers;
pub mod scheduler;
pub mod tables;

pub use channel::{ALGORITHMS, AlgorithmSpec, Channel, ModInput, OutputFlags};
pub use chip::Opn2;
pub use envelope::{EnvelopeGenerator, EnvelopeMode, SsgMode};
pub use lfo::Lfo;
pub use operator::Operator;
pub use phase::PhaseGenerator;
pub use registers::{ChannelField, GlobalField, OperatorField, RegisterEffect, decode};
pub use scheduler::{HARD_RESET_WAIT_CYCLES, QueuedWrite, WRITE_BUSY_CYCLES, WriteScheduler};
pub use tables::{LogTable, SynthTables, synth_tables};

// Re-exported so downstream users need only this crate for the common
// interface.
pub use opn2_common::{Opn2Error, SynthesisBackend};
