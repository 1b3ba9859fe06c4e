//! Backend trait abstraction for OPN2 chip implementations.
//!
//! This module defines the core interface that all OPN2 backends must
//! implement, whether they are table-driven hardware emulations or
//! lighter-weight modeled synthesizers.

/// Common interface for OPN2 chip backends.
///
/// This trait allows different implementations to be used interchangeably:
/// - Table-driven emulation (log-domain arithmetic, register-exact)
/// - Modeled software synthesizers (musical, non-exact)
///
/// # Example
///
/// ```ignore
/// use opn2_common::SynthesisBackend;
///
/// fn play_note<B: SynthesisBackend>(chip: &mut B) {
///     chip.write(0xA4, 0x22); // Channel 0 block/fnum high (latched)
///     chip.write(0xA0, 0x69); // Channel 0 fnum low (commits the latch)
///     chip.write(0x40, 0x00); // Operator 0 total level: loudest
///     chip.write(0x28, 0xF0); // Key on all operators of channel 0
///
///     let mut frame = [0i32; 2];
///     chip.generate(&mut frame);
/// }
/// ```
pub trait SynthesisBackend: Send {
    /// Create a new backend instance with default clocks.
    ///
    /// Default clocks:
    /// - Master clock: 7,670,454 Hz (NTSC Mega Drive)
    /// - Sample rate: 44,100 Hz
    fn new() -> Self
    where
        Self: Sized;

    /// Create a backend with custom master clock and sample rate.
    ///
    /// # Arguments
    ///
    /// * `master_clock` - OPN2 master clock frequency in Hz
    /// * `sample_rate` - Audio output sample rate in Hz
    fn with_clocks(master_clock: u32, sample_rate: u32) -> Self
    where
        Self: Sized;

    /// Reset the backend to power-on state, reconfiguring its clocks.
    ///
    /// Clears all registers, envelopes, phase accumulators and any queued
    /// writes. After a reset the backend is silent and deterministic: the
    /// same write sequence always produces the same samples.
    fn reset(&mut self, master_clock: u32, sample_rate: u32);

    /// Queue a write to an OPN2 register.
    ///
    /// Addresses 0x000-0x0FF target the first register bank (channels 0-2
    /// and global registers), 0x100-0x1FF the second bank (channels 3-5).
    /// The write is applied once the chip's busy window has elapsed;
    /// writes issued while the chip is busy queue up in order.
    ///
    /// Writes to unmapped addresses are accepted and dropped.
    fn write(&mut self, addr: u32, value: u8);

    /// Read the chip status byte.
    ///
    /// Bit 7 is the busy flag, bits 1 and 0 are the timer B and timer A
    /// overflow flags. The address is ignored; the chip exposes status on
    /// every readable port.
    fn read(&self, addr: u32) -> u8;

    /// Generate interleaved stereo samples into a caller-provided buffer.
    ///
    /// The buffer length must be even; each frame is a left/right pair.
    /// Queued register writes are consumed as synthesis time passes, so
    /// writes issued between `generate` calls land at the correct sample.
    fn generate(&mut self, buffer: &mut [i32]);

    /// Number of output channels per frame (always 2: stereo).
    fn output_channels(&self) -> usize {
        2
    }

    /// Set the master output attenuation.
    ///
    /// `level` is in 1/16-octave steps (about 0.38 dB each); 0 is unity.
    /// Values are clamped to 0..=255.
    fn set_volume(&mut self, level: i32);

    /// Mute or unmute an FM channel (0-5).
    ///
    /// Default implementation does nothing. Override if the backend
    /// supports channel muting.
    fn set_channel_mute(&mut self, _channel: usize, _mute: bool) {}

    /// Check if an FM channel is muted.
    ///
    /// Default returns false. Override if the backend supports channel
    /// muting.
    fn is_channel_muted(&self, _channel: usize) -> bool {
        false
    }
}
