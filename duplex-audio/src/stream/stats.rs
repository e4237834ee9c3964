//! Flow counters, exposed for external logging only. Nothing in the
//! pipeline reads them back.

use core::sync::atomic::{AtomicU32, Ordering};

#[derive(Default)]
pub(super) struct Counters {
    pub received_bytes: AtomicU32,
    pub transferred_bytes: AtomicU32,
    pub output_cycles: AtomicU32,
    pub output_skips: AtomicU32,
    pub input_cycles: AtomicU32,
}

impl Counters {
    pub fn snapshot(&self) -> StreamStats {
        StreamStats {
            received_bytes: self.received_bytes.load(Ordering::Relaxed),
            transferred_bytes: self.transferred_bytes.load(Ordering::Relaxed),
            output_cycles: self.output_cycles.load(Ordering::Relaxed),
            output_skips: self.output_skips.load(Ordering::Relaxed),
            input_cycles: self.input_cycles.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the pipeline's flow counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StreamStats {
    /// Bytes accepted from the USB-OUT side.
    pub received_bytes: u32,
    /// Bytes handed to the USB-IN side (including re-sent stale packets).
    pub transferred_bytes: u32,
    /// Output mix cycles completed.
    pub output_cycles: u32,
    /// Output cycles that ran without mixed-input data.
    pub output_skips: u32,
    /// Input mix quanta completed.
    pub input_cycles: u32,
}
