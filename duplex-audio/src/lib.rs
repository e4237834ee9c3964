//! # duplex-audio
//!
//! A `no_std`, zero-allocation streaming core for a dual-core USB audio
//! interface (RP2040 class): USB playback fans out to analog and digital
//! sinks while line and digital capture are mixed, resampled and folded
//! back into both the playback path and the USB capture endpoint.
//!
//! ## Architecture
//!
//! | Layer | Module | Purpose |
//! |-------|--------|---------|
//! | Rings | [`ring`] | Wrap arithmetic over caller-owned ring storage |
//! | Scheduling | [`sched`] | Cooperative task list shared by both cores |
//! | DSP | [`dsp`] | Sample codecs, linear blend, saturating intrinsics |
//! | Rate | [`resample`] | Stateful fixed-point linear resampler |
//! | Gain | [`mix`] | Volume scaling and saturating additive mixing |
//! | Orchestration | [`stream`] | The [`Pipeline`] tying it all together |
//!
//! ## Quick start
//!
//! ```ignore
//! use duplex_audio::{Pipeline, Role, CORE0, CORE1};
//!
//! let pipeline = Pipeline::new(line_in, spdif_in, dac_out, spdif_out, timer_us);
//! pipeline.init()?;
//! pipeline.set_volume(Role::LineIn, 0xc0);
//!
//! // USB endpoint callbacks:
//! pipeline.push_rx_data(packet.len(), |span| fill_from_packet(span));
//! pipeline.pop_tx_data(|data| send_in_packet(data));
//!
//! // Each core's main loop:
//! loop { pipeline.run_once(CORE0); }
//! ```
//!
//! ## Stream parameters
//!
//! - **Formats:** 16/20/24/32-bit PCM, stereo, up to 96 kHz per direction
//! - **Device buffer:** 8 ms playback ring, 16 ms input-mix ring
//! - **Cadence:** 2 ms output cycles, 4 ms input quanta

#![no_std]

#[cfg(test)]
extern crate std;

pub mod config;
pub mod dsp;
pub mod mix;
pub mod resample;
pub mod ring;
pub mod sched;
pub mod stream;

pub use dsp::FormatError;
pub use mix::{Mixer, MixerConfig};
pub use resample::{Advance, Resampler, ResamplerConfig};
pub use ring::RingRegion;
pub use sched::{Scheduler, TaskId, CORE0, CORE1, CORE_ANY};
pub use stream::{CaptureSource, Pipeline, PlaybackSink, Role, StreamStats};
