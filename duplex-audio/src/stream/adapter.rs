//! Physical endpoint traits.
//!
//! The pipeline moves bytes between these adapters and its rings; clocking,
//! DMA and line-level concerns stay behind the trait. Implementations are
//! shared between both cores and the interrupt context, so every method
//! takes `&self` and the adapter handles its own synchronization.

/// A capture endpoint delivering decoded interleaved PCM (line-in ADC,
/// digital-audio receiver).
pub trait CaptureSource {
    fn start(&self);
    fn stop(&self);
    fn set_format(&self, freq: u32, bits: u8);
    /// Whether the endpoint currently has a usable signal.
    fn is_active(&self) -> bool;
    /// Whether at least `samples` interleaved samples are buffered.
    fn has_samples(&self, samples: u32) -> bool;
    /// Fills `dst` with buffered PCM; returns the bytes written.
    fn fetch(&self, dst: &mut [u8]) -> usize;
}

/// A playback endpoint consuming interleaved PCM (DAC out, digital-audio
/// transmitter).
pub trait PlaybackSink {
    fn start(&self);
    fn stop(&self);
    fn set_format(&self, freq: u32, bits: u8);
    fn is_running(&self) -> bool;
    /// Interleaved samples of space left in the endpoint's buffer.
    fn free_samples(&self) -> usize;
    /// Queues `data` for playback; returns the bytes accepted.
    fn write(&self, data: &[u8]) -> usize;
}
