//! Engine configuration and backend selection.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::{DEFAULT_SAMPLE_RATE, NTSC_MASTER_CLOCK, Opn2Error};

/// Which synthesis backend to instantiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum BackendKind {
    /// Table-driven, register-exact core (`opn2` crate).
    #[default]
    Tabular,
    /// Lightweight modeled synthesizer (`opn2-softsynth` crate).
    Modeled,
}

impl FromStr for BackendKind {
    type Err = Opn2Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tabular" => Ok(BackendKind::Tabular),
            "modeled" | "softsynth" => Ok(BackendKind::Modeled),
            other => Err(Opn2Error::UnknownBackend(other.to_string())),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Tabular => write!(f, "tabular"),
            BackendKind::Modeled => write!(f, "modeled"),
        }
    }
}

/// Engine configuration shared by all backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Backend implementation to use.
    pub backend: BackendKind,
    /// OPN2 master clock frequency in Hz.
    pub master_clock: u32,
    /// Audio output sample rate in Hz.
    pub sample_rate: u32,
    /// Master attenuation in 1/16-octave steps (0 = unity).
    pub volume: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            backend: BackendKind::default(),
            master_clock: NTSC_MASTER_CLOCK,
            sample_rate: DEFAULT_SAMPLE_RATE,
            volume: 0,
        }
    }
}

/// Lowest accepted output rate. The clock-ratio fixed-point math loses
/// precision below this, and no audio consumer wants such rates anyway.
pub const MIN_SAMPLE_RATE: u32 = 4_000;

/// Highest accepted master clock, well above any OPN-family part.
pub const MAX_MASTER_CLOCK: u32 = 32_000_000;

impl EngineConfig {
    /// Validate clock and volume ranges.
    pub fn validate(&self) -> crate::Result<()> {
        if self.sample_rate < MIN_SAMPLE_RATE {
            return Err(Opn2Error::InvalidConfig(format!(
                "sample_rate {} below minimum {}",
                self.sample_rate, MIN_SAMPLE_RATE
            )));
        }
        if self.master_clock > MAX_MASTER_CLOCK {
            return Err(Opn2Error::InvalidConfig(format!(
                "master_clock {} above maximum {}",
                self.master_clock, MAX_MASTER_CLOCK
            )));
        }
        if self.master_clock < self.sample_rate {
            return Err(Opn2Error::InvalidConfig(format!(
                "master_clock {} below sample_rate {}",
                self.master_clock, self.sample_rate
            )));
        }
        if !(0..=255).contains(&self.volume) {
            return Err(Opn2Error::InvalidConfig(format!(
                "volume {} outside 0..=255",
                self.volume
            )));
        }
        Ok(())
    }
}
