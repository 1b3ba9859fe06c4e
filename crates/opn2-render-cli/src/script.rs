//! Register script parsing.
//!
//! A script is a JSON document describing a timed sequence of OPN2
//! register writes. Writes land on the chip through its busy-window
//! scheduler, so scripts render deterministically on the tabular
//! backend.

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use opn2_common::EngineConfig;

/// A single timed event in a register script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptEvent {
    /// Queue a register write.
    Write {
        /// Register address (0x000-0x1FF)
        addr: u32,
        /// Register value
        value: u8,
    },
    /// Advance synthesis time without capturing output.
    Wait {
        /// Number of output frames to discard
        frames: u32,
    },
    /// Render output frames into the WAV file.
    Render {
        /// Number of output frames to capture
        frames: u32,
    },
}

/// A parsed register script.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterScript {
    /// Engine configuration (clocks, backend, volume). Optional; the
    /// script-level config is overridden by `--config` and `--backend`.
    #[serde(default)]
    pub config: EngineConfig,
    /// Timed event sequence.
    pub events: Vec<ScriptEvent>,
}

impl RegisterScript {
    /// Parse a script from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let script: RegisterScript =
            serde_json::from_str(text).context("failed to parse register script")?;
        script.validate()?;
        Ok(script)
    }

    fn validate(&self) -> Result<()> {
        if self.events.is_empty() {
            bail!("script contains no events");
        }
        for event in &self.events {
            if let ScriptEvent::Write { addr, .. } = event {
                if *addr >= 0x200 {
                    bail!("register address {:#05x} outside 0x000-0x1FF", addr);
                }
            }
        }
        Ok(())
    }

    /// Total number of frames the script will capture.
    pub fn rendered_frames(&self) -> u64 {
        self.events
            .iter()
            .map(|e| match e {
                ScriptEvent::Render { frames } => u64::from(*frames),
                _ => 0,
            })
            .sum()
    }
}
