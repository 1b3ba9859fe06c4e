//! Write scheduler with busy-window gating.
//!
//! Every accepted register write makes the chip busy for a fixed number
//! of master clock cycles; writes that arrive while busy queue up and
//! drain in order as synthesis time passes. Wait entries let callers
//! insert deliberate settling gaps, as the hard-reset protocol requires.

use std::collections::VecDeque;

/// Master clock cycles the chip stays busy after accepting a write
/// (32 internal cycles).
pub const WRITE_BUSY_CYCLES: u32 = 192;

/// Settling gap for a hard reset: room for 400 write windows, enough
/// for the per-operator quiet sequence to drain on real hardware.
pub const HARD_RESET_WAIT_CYCLES: u32 = 400 * WRITE_BUSY_CYCLES;

/// A queued bus operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueuedWrite {
    /// A register write: bank-extended address and value.
    Register {
        /// Register address, bit 8 selecting the bank.
        addr: u16,
        /// Value to write.
        value: u8,
    },
    /// A deliberate gap of master clock cycles.
    Wait {
        /// Gap length in master cycles.
        cycles: u32,
    },
}

/// FIFO of pending writes plus the busy countdown.
#[derive(Clone, Debug, Default)]
pub struct WriteScheduler {
    queue: VecDeque<QueuedWrite>,
    /// Master cycles until the next write can be accepted.
    busy: u32,
}

impl WriteScheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a register write.
    pub fn push_write(&mut self, addr: u16, value: u8) {
        self.queue.push_back(QueuedWrite::Register { addr, value });
    }

    /// Queue a settling gap.
    pub fn push_wait(&mut self, cycles: u32) {
        if cycles > 0 {
            self.queue.push_back(QueuedWrite::Wait { cycles });
        }
    }

    /// Whether the chip currently reports busy.
    #[inline]
    pub fn is_busy(&self) -> bool {
        self.busy > 0
    }

    /// Number of queued operations not yet accepted.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Advance by up to `budget` master cycles and pop the next write
    /// that becomes acceptable, if any.
    ///
    /// The budget is decremented by the cycles actually consumed. When a
    /// write is returned the busy window for it has been started; calling
    /// again with the remaining budget continues draining the queue.
    pub fn accept(&mut self, budget: &mut u32) -> Option<(u16, u8)> {
        loop {
            if self.busy > 0 {
                let spend = self.busy.min(*budget);
                self.busy -= spend;
                *budget -= spend;
                if self.busy > 0 {
                    return None;
                }
            }
            match self.queue.front().copied() {
                None => return None,
                Some(QueuedWrite::Wait { cycles }) => {
                    self.queue.pop_front();
                    self.busy = cycles;
                }
                Some(QueuedWrite::Register { addr, value }) => {
                    self.queue.pop_front();
                    self.busy = WRITE_BUSY_CYCLES;
                    return Some((addr, value));
                }
            }
        }
    }

    /// Drop all pending writes and clear the busy window.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.busy = 0;
    }
}
