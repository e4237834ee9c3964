//! Device-level streaming parameters.
//!
//! Buffer capacities are sized for the worst case (maximum sampling
//! frequency, 32-bit storage per sample) so that format changes only ever
//! shrink the logical window of a ring, never reallocate it.

/// Output (playback) channel count.
pub const OUTPUT_CHANNELS: u8 = 2;

/// Input (capture) channel count.
pub const INPUT_CHANNELS: u8 = 2;

/// Highest sampling frequency the device negotiates.
pub const MAX_SAMPLING_FREQUENCY: u32 = 96_000;

/// Widest sample storage in bytes (32-bit slot even for 24-bit audio).
pub const MAX_SAMPLE_BYTES: usize = 4;

/// Interleaved output samples produced in one millisecond at the maximum rate.
pub const MAX_OUTPUT_SAMPLES_1MS: usize =
    MAX_SAMPLING_FREQUENCY as usize * OUTPUT_CHANNELS as usize / 1000;

/// Interleaved input samples produced in one millisecond at the maximum rate.
pub const MAX_INPUT_SAMPLES_1MS: usize =
    MAX_SAMPLING_FREQUENCY as usize * INPUT_CHANNELS as usize / 1000;

/// Duration of the USB-received ring, in milliseconds.
pub const DEVICE_BUFFER_MS: u16 = 8;

/// Duration of the input-mixing ring, in milliseconds.
pub const INPUT_MIX_BUFFER_MS: u16 = 16;

/// Input-mixing quantum: one quarter of the input ring per cycle.
pub const INPUT_MIX_CYCLE_MS: u16 = INPUT_MIX_BUFFER_MS / 4;

/// Output-mixing quantum: one quarter of the device buffer per cycle.
pub const OUTPUT_MIX_CYCLE_MS: u16 = DEVICE_BUFFER_MS / 4;

/// Mix cycles withheld after a format change before output transmission
/// starts, pre-filling the physical buffers to ride out scheduling jitter.
pub const OUTPUT_CHARGE_CYCLES: u8 =
    ((DEVICE_BUFFER_MS / OUTPUT_MIX_CYCLE_MS) >> 1) as u8;

/// Byte capacity of the USB-received ring.
pub const RX_RING_CAPACITY: usize =
    MAX_OUTPUT_SAMPLES_1MS * DEVICE_BUFFER_MS as usize * MAX_SAMPLE_BYTES;

/// Byte capacity of the input-mixing ring.
pub const INPUT_MIX_RING_CAPACITY: usize =
    MAX_INPUT_SAMPLES_1MS * INPUT_MIX_BUFFER_MS as usize * MAX_SAMPLE_BYTES;

/// Byte capacity of the per-cycle output scratch buffers.
pub const OUTPUT_CYCLE_SCRATCH: usize =
    MAX_OUTPUT_SAMPLES_1MS * OUTPUT_MIX_CYCLE_MS as usize * MAX_SAMPLE_BYTES;

/// Byte capacity of the per-source input fetch buffers.
pub const INPUT_FETCH_SCRATCH: usize =
    MAX_INPUT_SAMPLES_1MS * INPUT_MIX_CYCLE_MS as usize * MAX_SAMPLE_BYTES;

/// Byte capacity of the USB-IN packet staging buffer (one 1 ms packet).
pub const USB_PACKET_STAGING: usize = MAX_INPUT_SAMPLES_1MS * MAX_SAMPLE_BYTES;

/// Interleaved sample count for a window of `ms` milliseconds.
pub const fn samples_for_duration(ms: u16, freq: u32, channels: u8) -> usize {
    ms as usize * freq as usize * channels as usize / 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_case_sizes() {
        assert_eq!(MAX_OUTPUT_SAMPLES_1MS, 192);
        assert_eq!(RX_RING_CAPACITY, 192 * 8 * 4);
        assert_eq!(INPUT_MIX_RING_CAPACITY, 192 * 16 * 4);
        assert_eq!(OUTPUT_CHARGE_CYCLES, 2);
    }

    #[test]
    fn duration_samples() {
        // 1 ms of 48 kHz stereo
        assert_eq!(samples_for_duration(1, 48_000, 2), 96);
        // the full device buffer at the maximum rate
        assert_eq!(
            samples_for_duration(DEVICE_BUFFER_MS, MAX_SAMPLING_FREQUENCY, OUTPUT_CHANNELS),
            MAX_OUTPUT_SAMPLES_1MS * DEVICE_BUFFER_MS as usize
        );
    }
}
