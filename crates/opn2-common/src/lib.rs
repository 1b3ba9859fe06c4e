//! Common traits and types for OPN2 (YM2612) synthesis backends.
//!
//! This crate provides the shared abstractions used across the backend
//! implementations (the table-driven core in `opn2` and the modeled
//! synthesizer in `opn2-softsynth`).
//!
//! # Example
//!
//! ```ignore
//! use opn2_common::SynthesisBackend;
//!
//! fn render<B: SynthesisBackend>(chip: &mut B) -> Vec<i32> {
//!     chip.write(0x28, 0xF0); // key on all four operators of channel 0
//!     let mut buffer = vec![0i32; 2048];
//!     chip.generate(&mut buffer);
//!     buffer
//! }
//! ```

#![warn(missing_docs)]

mod backend;
mod config;

pub use backend::SynthesisBackend;
pub use config::{BackendKind, EngineConfig};

// ============================================================================
// Common Constants
// ============================================================================

/// Standard audio sample rate (44.1 kHz CD quality).
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// NTSC Mega Drive master clock feeding the OPN2 (~7.67 MHz).
pub const NTSC_MASTER_CLOCK: u32 = 7_670_454;

/// PAL Mega Drive master clock feeding the OPN2 (~7.60 MHz).
pub const PAL_MASTER_CLOCK: u32 = 7_600_489;

/// Master clock cycles consumed per native chip sample (6 channels x 24).
pub const CYCLES_PER_SAMPLE: u32 = 144;

/// Number of FM channels on the chip.
pub const NUM_CHANNELS: usize = 6;

/// Number of operators per FM channel.
pub const OPS_PER_CHANNEL: usize = 4;

/// Error types shared by OPN2 backends.
#[derive(thiserror::Error, Debug)]
pub enum Opn2Error {
    /// IO error from filesystem or device
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid engine or render configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unknown backend name in configuration
    #[error("Unknown backend: {0}")]
    UnknownBackend(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl From<String> for Opn2Error {
    fn from(s: String) -> Self {
        Opn2Error::Other(s)
    }
}

/// Convenience result alias using [`Opn2Error`].
pub type Result<T> = std::result::Result<T, Opn2Error>;
