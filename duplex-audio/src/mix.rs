//! Volume-scaling sample mixer.
//!
//! Memoryless: every call scales each source sample by `volume / 256`
//! (expressed as `blend(0, sample, volume)`) and either overwrites the
//! destination or saturating-adds into it at the configured bit depth.
//! Additive overflow clamps to the signed rail, it never wraps. Like the
//! resampler, the combine routines are monomorphized per depth and bound
//! once at setup.

use crate::dsp::{blend, blend_accel, intrinsics, read_sample, write_sample, FormatError};
use crate::resample::Advance;

/// One stream format; source and destination share it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MixerConfig {
    pub bits: u8,
    pub stride: u8,
    pub channels: u8,
    pub accel: bool,
}

type CombineFn = fn(u8, usize, &[u8], &mut [u8]) -> Advance;

macro_rules! combine_dispatch {
    ($cfg:expr, $ow:literal) => {
        match ($cfg.bits, $cfg.accel) {
            (16, false) => Ok(combine::<16, $ow, false> as CombineFn),
            (16, true) => Ok(combine::<16, $ow, true> as CombineFn),
            (20, false) => Ok(combine::<20, $ow, false> as CombineFn),
            (20, true) => Ok(combine::<20, $ow, true> as CombineFn),
            (24, false) => Ok(combine::<24, $ow, false> as CombineFn),
            (24, true) => Ok(combine::<24, $ow, true> as CombineFn),
            (32, false) => Ok(combine::<32, $ow, false> as CombineFn),
            (32, true) => Ok(combine::<32, $ow, true> as CombineFn),
            _ => Err(FormatError::UnsupportedBits {
                src: $cfg.bits,
                dst: $cfg.bits,
            }),
        }
    };
}

#[derive(Default)]
pub struct Mixer {
    config: MixerConfig,
    combine_add: Option<CombineFn>,
    combine_overwrite: Option<CombineFn>,
}

impl Mixer {
    pub const fn new() -> Self {
        Self {
            config: MixerConfig {
                bits: 0,
                stride: 0,
                channels: 0,
                accel: false,
            },
            combine_add: None,
            combine_overwrite: None,
        }
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    pub fn setup(&mut self, config: &MixerConfig) -> Result<(), FormatError> {
        if config.channels == 0 {
            return Err(FormatError::UnsupportedChannels(config.channels));
        }
        self.combine_add = Some(combine_dispatch!(config, false)?);
        self.combine_overwrite = Some(combine_dispatch!(config, true)?);
        self.config = *config;
        Ok(())
    }

    /// Mixes `src` into `dst` at `volume`, trimming both windows to whole
    /// frames; returns equal byte advances on both sides, bounded by the
    /// shorter window.
    pub fn apply(&self, volume: u8, src: &[u8], dst: &mut [u8], overwrite: bool) -> Advance {
        let combine = if overwrite {
            self.combine_overwrite
        } else {
            self.combine_add
        };
        let Some(combine) = combine else {
            return Advance::default();
        };

        let frame = self.config.stride as usize * self.config.channels as usize;
        if src.len() < frame || dst.len() < frame {
            return Advance::default();
        }
        let src = &src[..src.len() / frame * frame];
        let dst_trim = dst.len() / frame * frame;
        combine(
            volume,
            self.config.stride as usize,
            src,
            &mut dst[..dst_trim],
        )
    }
}

fn combine<const BITS: u32, const OVERWRITE: bool, const ACCEL: bool>(
    volume: u8,
    stride: usize,
    src: &[u8],
    dst: &mut [u8],
) -> Advance {
    let len = src.len().min(dst.len());
    let mut pos = 0usize;
    while pos < len {
        let sample = read_sample::<BITS>(&src[pos..]);
        let scaled = if ACCEL {
            blend_accel::<BITS>(0, sample, volume)
        } else {
            blend::<BITS>(0, sample, volume)
        };

        if OVERWRITE {
            write_sample::<BITS>(&mut dst[pos..], scaled);
        } else {
            let existing = read_sample::<BITS>(&dst[pos..]);
            let mixed = if BITS == 32 {
                if ACCEL {
                    intrinsics::saturating_add(scaled as i32, existing as i32) as u32
                } else {
                    match (scaled as i32).checked_add(existing as i32) {
                        Some(sum) => sum as u32,
                        None if scaled & 0x8000_0000 != 0 => 0x8000_0000,
                        None => 0x7fff_ffff,
                    }
                }
            } else {
                let sum = (scaled as i32).wrapping_add(existing as i32);
                if ACCEL {
                    intrinsics::signed_saturate::<BITS>(sum) as u32
                } else {
                    let max = ((1u32 << (BITS - 1)) - 1) as i32;
                    let min = -max - 1;
                    sum.clamp(min, max) as u32
                }
            };
            write_sample::<BITS>(&mut dst[pos..], mixed);
        }
        pos += stride;
    }
    Advance {
        src_bytes: pos,
        dst_bytes: pos,
    }
}
