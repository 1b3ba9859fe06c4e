//! Register address decode.
//!
//! The chip exposes two 256-byte register banks; bit 8 of the address
//! selects the bank. Decode is table-driven: each mapped address range
//! names the effect a write has, and the chip applies effects uniformly.
//! Unmapped addresses decode to `None` and the write is dropped.

/// Per-operator register groups, one per 0x10 stride from 0x30.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperatorField {
    /// 0x30: detune and multiple.
    DetuneMultiple,
    /// 0x40: total level.
    TotalLevel,
    /// 0x50: key scale and attack rate.
    KeyScaleAttack,
    /// 0x60: AM enable and decay rate.
    AmDecay,
    /// 0x70: sustain rate.
    SustainRate,
    /// 0x80: sustain level and release rate.
    SustainLevelRelease,
    /// 0x90: SSG-EG mode.
    SsgMode,
}

/// Per-channel register groups.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelField {
    /// 0xA0-0xA2: fnum low byte, commits the frequency latch.
    FreqLow,
    /// 0xA4-0xA6: block and fnum high bits, latched.
    FreqHigh,
    /// 0xB0-0xB2: feedback and algorithm.
    FeedbackAlgorithm,
    /// 0xB4-0xB6: stereo pan and LFO sensitivities.
    PanSensitivity,
}

/// Chip-global registers, first bank only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GlobalField {
    /// 0x22: LFO enable and frequency.
    LfoControl,
    /// 0x24: timer A high 8 bits.
    TimerAHigh,
    /// 0x25: timer A low 2 bits.
    TimerALow,
    /// 0x26: timer B period.
    TimerB,
    /// 0x27: timer load/reset control and channel 2 mode.
    TimerControl,
    /// 0x28: key on/off port.
    KeyOnOff,
    /// 0x2A: DAC sample value.
    DacData,
    /// 0x2B: DAC enable.
    DacEnable,
}

/// Decoded meaning of a register write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterEffect {
    /// A chip-global register.
    Global(GlobalField),
    /// A per-operator register.
    Operator {
        /// Channel index 0-5.
        channel: usize,
        /// Operator slot 0-3.
        op: usize,
        /// Which register group.
        field: OperatorField,
    },
    /// A per-channel register.
    Channel {
        /// Channel index 0-5.
        channel: usize,
        /// Which register group.
        field: ChannelField,
    },
}

/// How a mapped range decodes.
#[derive(Clone, Copy, Debug)]
enum RangeKind {
    Global(GlobalField),
    PerOperator(OperatorField),
    PerChannel(ChannelField),
}

/// One mapped address range within a bank.
struct AddressRange {
    start: u8,
    end: u8,
    kind: RangeKind,
}

const fn global(reg: u8, field: GlobalField) -> AddressRange {
    AddressRange { start: reg, end: reg, kind: RangeKind::Global(field) }
}

const fn per_op(start: u8, field: OperatorField) -> AddressRange {
    AddressRange { start, end: start + 0x0E, kind: RangeKind::PerOperator(field) }
}

const fn per_chan(start: u8, field: ChannelField) -> AddressRange {
    AddressRange { start, end: start + 0x02, kind: RangeKind::PerChannel(field) }
}

/// The register map, shared by both banks. Global rows only decode in
/// bank 0, matching the hardware port layout.
const DECODE_TABLE: &[AddressRange] = &[
    global(0x22, GlobalField::LfoControl),
    global(0x24, GlobalField::TimerAHigh),
    global(0x25, GlobalField::TimerALow),
    global(0x26, GlobalField::TimerB),
    global(0x27, GlobalField::TimerControl),
    global(0x28, GlobalField::KeyOnOff),
    global(0x2A, GlobalField::DacData),
    global(0x2B, GlobalField::DacEnable),
    per_op(0x30, OperatorField::DetuneMultiple),
    per_op(0x40, OperatorField::TotalLevel),
    per_op(0x50, OperatorField::KeyScaleAttack),
    per_op(0x60, OperatorField::AmDecay),
    per_op(0x70, OperatorField::SustainRate),
    per_op(0x80, OperatorField::SustainLevelRelease),
    per_op(0x90, OperatorField::SsgMode),
    per_chan(0xA0, ChannelField::FreqLow),
    per_chan(0xA4, ChannelField::FreqHigh),
    per_chan(0xB0, ChannelField::FeedbackAlgorithm),
    per_chan(0xB4, ChannelField::PanSensitivity),
];

/// Decode an address into its register effect, or `None` for unmapped
/// addresses (which the chip accepts and drops).
pub fn decode(addr: u32) -> Option<RegisterEffect> {
    if addr >= 0x200 {
        return None;
    }
    let bank = (addr >> 8) as usize;
    let reg = (addr & 0xFF) as u8;
    for range in DECODE_TABLE {
        if reg < range.start || reg > range.end {
            continue;
        }
        match range.kind {
            RangeKind::Global(field) => {
                return if bank == 0 { Some(RegisterEffect::Global(field)) } else { None };
            }
            RangeKind::PerOperator(field) => {
                let chan_low = (reg - range.start) & 3;
                if chan_low == 3 {
                    return None;
                }
                let op = ((reg - range.start) >> 2) as usize;
                return Some(RegisterEffect::Operator {
                    channel: bank * 3 + chan_low as usize,
                    op,
                    field,
                });
            }
            RangeKind::PerChannel(field) => {
                let chan_low = (reg - range.start) as usize;
                return Some(RegisterEffect::Channel { channel: bank * 3 + chan_low, field });
            }
        }
    }
    None
}
