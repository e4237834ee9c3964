//! Fixed-point sample handling shared by the resampler and the mixer.
//!
//! Everything here is monomorphized over the sample bit depth through const
//! generics, so each supported format compiles to straight-line integer code
//! with no per-sample branching.

pub mod intrinsics;

mod blend;
mod sample;

pub use blend::{blend, blend_accel};
pub use sample::{bits_to_bytes, convert_depth, read_sample, write_sample};

use thiserror::Error;

/// Stream format rejected at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("unsupported sample depth {src}/{dst} bits")]
    UnsupportedBits { src: u8, dst: u8 },
    #[error("unsupported channel count {0}")]
    UnsupportedChannels(u8),
    #[error("sampling frequency must be nonzero")]
    ZeroFrequency,
}
