//! Stateful linear-interpolation sample-rate converter.
//!
//! The conversion ratio is an 8.8 fixed-point step `src_freq * 256 /
//! dst_freq`. Each output sample is a [`blend`](crate::dsp::blend) between
//! two bracketing source samples at the accumulated phase, so a stream can
//! be fed in arbitrarily small windows: per-channel state carries the
//! bracket pair and the phase across calls and the output is byte-identical
//! to a single whole-stream call.
//!
//! One sampling routine is bound at [`Resampler::setup`] for the lifetime of
//! the configuration: direction (downsampling when the integer step part is
//! nonzero, upsampling otherwise), the source/destination bit-depth pair and
//! the acceleration flag are all resolved once into a monomorphized `fn`,
//! keeping the per-sample loops free of branching.

use crate::dsp::{blend, blend_accel, convert_depth, read_sample, write_sample, FormatError};

/// Mid-stream resumption: the phase and bracket pair in the channel state
/// are live.
const SAMPLE_CONTINUE: u32 = 0x8000_0000;
/// The source ran out before the second bracket sample could be read.
const LACK_FIRST_SAMPLE: u32 = 0x4000_0000;
const COUNT_FLAGS_MASK: u32 = 0xf000_0000;

/// Bytes consumed on each side of one conversion call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Advance {
    pub src_bytes: usize,
    pub dst_bytes: usize,
}

/// Stream formats on both sides of the converter. `src_stride` /
/// `dst_stride` are the per-sample storage strides in bytes; a frame is
/// `stride * channels` bytes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResamplerConfig {
    pub src_bits: u8,
    pub src_stride: u8,
    pub src_freq: u32,
    pub dst_bits: u8,
    pub dst_stride: u8,
    pub dst_freq: u32,
    pub channels: u8,
    pub accel: bool,
}

pub const MAX_CHANNELS: usize = 4;

/// Phase accumulator plus bracket pair, one per channel.
///
/// `count` packs the 8-bit interpolation phase in its low byte, a pending
/// source-frame count (overshoot past the last window) above it, and the
/// two flag bits in the top nibble.
#[derive(Debug, Default, Clone, Copy)]
struct ChannelState {
    count: u32,
    base0: u32,
    base1: u32,
}

#[derive(Clone, Copy)]
struct Params {
    step: u32,
    /// Frame strides in bytes.
    src_frame: usize,
    dst_frame: usize,
}

type SampleFn = fn(&Params, &mut ChannelState, &[u8], &mut [u8]) -> Advance;

/// Dispatches a direction routine over the supported bit-depth pairs and
/// the acceleration flag.
macro_rules! depth_dispatch {
    ($dir:ident, $cfg:expr) => {
        depth_dispatch!(@arms $dir, $cfg,
            (16, 16), (16, 20), (16, 24), (16, 32),
            (20, 16), (20, 20), (20, 24), (20, 32),
            (24, 16), (24, 20), (24, 24), (24, 32),
            (32, 16), (32, 20), (32, 24), (32, 32))
    };
    (@arms $dir:ident, $cfg:expr, $(($s:literal, $d:literal)),+) => {
        match ($cfg.src_bits, $cfg.dst_bits, $cfg.accel) {
            $(
                ($s, $d, false) => Ok($dir::<$s, $d, false> as SampleFn),
                ($s, $d, true) => Ok($dir::<$s, $d, true> as SampleFn),
            )+
            _ => Err(FormatError::UnsupportedBits {
                src: $cfg.src_bits,
                dst: $cfg.dst_bits,
            }),
        }
    };
}

#[derive(Default)]
pub struct Resampler {
    config: ResamplerConfig,
    params: Option<Params>,
    state: [ChannelState; MAX_CHANNELS],
    sampler: Option<SampleFn>,
}

impl Resampler {
    pub const fn new() -> Self {
        Self {
            config: ResamplerConfig {
                src_bits: 0,
                src_stride: 0,
                src_freq: 0,
                dst_bits: 0,
                dst_stride: 0,
                dst_freq: 0,
                channels: 0,
                accel: false,
            },
            params: None,
            state: [ChannelState {
                count: 0,
                base0: 0,
                base1: 0,
            }; MAX_CHANNELS],
            sampler: None,
        }
    }

    pub fn config(&self) -> &ResamplerConfig {
        &self.config
    }

    /// Binds the sampling routine for `config` and resets all channel
    /// state. Must be called before [`Resampler::apply`] and after every
    /// format change.
    pub fn setup(&mut self, config: &ResamplerConfig) -> Result<(), FormatError> {
        if config.channels == 0 || config.channels as usize > MAX_CHANNELS {
            return Err(FormatError::UnsupportedChannels(config.channels));
        }
        if config.src_freq == 0 || config.dst_freq == 0 {
            return Err(FormatError::ZeroFrequency);
        }

        let step = config.src_freq * 256 / config.dst_freq;
        self.sampler = Some(if step > 0xff {
            depth_dispatch!(downsample, config)?
        } else {
            depth_dispatch!(upsample, config)?
        });
        self.config = *config;
        self.params = Some(Params {
            step,
            src_frame: config.src_stride as usize * config.channels as usize,
            dst_frame: config.dst_stride as usize * config.channels as usize,
        });
        self.state = [ChannelState::default(); MAX_CHANNELS];
        Ok(())
    }

    /// Converts as much of `src` into `dst` as fits, interleaved frames on
    /// both sides. Both windows are trimmed to whole frames; the return
    /// value is the per-side maximum consumed across channels, and callers
    /// advance their cursors by it and call again.
    pub fn apply(&mut self, src: &[u8], dst: &mut [u8]) -> Advance {
        let (Some(params), Some(sampler)) = (self.params, self.sampler) else {
            return Advance::default();
        };

        if src.len() < params.src_frame || dst.len() < params.dst_frame {
            return Advance::default();
        }
        let src = &src[..src.len() / params.src_frame * params.src_frame];
        let dst_trim = dst.len() / params.dst_frame * params.dst_frame;
        let dst = &mut dst[..dst_trim];

        let mut total = Advance::default();
        for ch in 0..self.config.channels as usize {
            let src_off = ch * self.config.src_stride as usize;
            let dst_off = ch * self.config.dst_stride as usize;
            let result = sampler(
                &params,
                &mut self.state[ch],
                &src[src_off..],
                &mut dst[dst_off..],
            );
            total.src_bytes = total.src_bytes.max(result.src_bytes);
            total.dst_bytes = total.dst_bytes.max(result.dst_bytes);
        }
        total
    }

    /// Source samples needed before a conversion can produce `dst_samples`
    /// output samples without stalling.
    pub fn required_src_samples(&self, dst_samples: u32) -> u32 {
        if dst_samples == 0 {
            return 0;
        }
        let step = self.params.map(|p| p.step).unwrap_or(0);
        (((dst_samples - 1) * step) >> 8) + 2
    }

    pub fn required_src_bytes(&self, dst_bytes: u32) -> u32 {
        self.required_src_samples(dst_bytes / self.config.dst_stride as u32)
            * self.config.src_stride as u32
    }
}

#[inline(always)]
fn interpolate<const BITS: u32, const ACCEL: bool>(v0: u32, v1: u32, alpha: u8) -> u32 {
    if ACCEL {
        blend_accel::<BITS>(v0, v1, alpha)
    } else {
        blend::<BITS>(v0, v1, alpha)
    }
}

/// Integer step part >= 1: the source cursor is derived from the
/// accumulated phase, skipping source frames the output never lands in.
fn downsample<const SRC_BITS: u32, const DST_BITS: u32, const ACCEL: bool>(
    p: &Params,
    st: &mut ChannelState,
    src: &[u8],
    dst: &mut [u8],
) -> Advance {
    let src_len = src.len();
    let dst_len = dst.len();

    let mut base0 = st.base0;
    let mut base1 = st.base1;
    let mut total_steps = st.count & !COUNT_FLAGS_MASK;
    let mut dst_pos = 0usize;

    if st.count & SAMPLE_CONTINUE == 0 {
        if st.count & LACK_FIRST_SAMPLE == 0 {
            base0 = read_sample::<SRC_BITS>(src);
            total_steps += p.step & !0xff;
        }
        let pos = (total_steps >> 8) as usize * p.src_frame;
        if pos >= src_len {
            st.base0 = base0;
            st.count = ((((pos - src_len) / p.src_frame) as u32) << 8) | LACK_FIRST_SAMPLE;
            return Advance {
                src_bytes: src_len,
                dst_bytes: 0,
            };
        }
        base1 = read_sample::<SRC_BITS>(&src[pos..]);
        total_steps += p.step;
    }

    let mut src_pos = (total_steps >> 8) as usize * p.src_frame;
    while src_pos < src_len && dst_pos < dst_len {
        let value = interpolate::<SRC_BITS, ACCEL>(base0, base1, (total_steps & 0xff) as u8);
        write_sample::<DST_BITS>(&mut dst[dst_pos..], convert_depth::<SRC_BITS, DST_BITS>(value));
        dst_pos += p.dst_frame;

        base0 = base1;
        base1 = read_sample::<SRC_BITS>(&src[src_pos..]);
        total_steps += p.step;
        src_pos = (total_steps >> 8) as usize * p.src_frame;
    }

    st.base0 = base0;
    st.base1 = base1;
    st.count = (total_steps & 0xff) | SAMPLE_CONTINUE;
    let src_bytes = if src_pos >= src_len {
        st.count |= (((src_pos - src_len) / p.src_frame) as u32) << 8;
        src_len
    } else {
        src_pos
    };
    Advance {
        src_bytes,
        dst_bytes: dst_pos,
    }
}

/// Integer step part zero: each source bracket yields one or more output
/// samples before the cursor moves on.
fn upsample<const SRC_BITS: u32, const DST_BITS: u32, const ACCEL: bool>(
    p: &Params,
    st: &mut ChannelState,
    src: &[u8],
    dst: &mut [u8],
) -> Advance {
    let src_len = src.len();
    let dst_len = dst.len();

    let mut base0 = st.base0;
    let mut base1 = st.base1;
    let mut src_pos = 0usize;
    let mut dst_pos = 0usize;

    if st.count & SAMPLE_CONTINUE == 0 {
        if st.count & LACK_FIRST_SAMPLE == 0 {
            base0 = read_sample::<SRC_BITS>(src);
            src_pos += p.src_frame;
            if src_pos >= src_len {
                st.base0 = base0;
                st.count = LACK_FIRST_SAMPLE;
                return Advance {
                    src_bytes: p.src_frame,
                    dst_bytes: 0,
                };
            }
        }
        base1 = read_sample::<SRC_BITS>(&src[src_pos..]);
        src_pos += p.src_frame;
    }
    let mut total_steps = st.count & !COUNT_FLAGS_MASK;

    while src_pos < src_len && dst_pos < dst_len {
        while total_steps >> 8 == 0 && dst_pos < dst_len {
            let value = interpolate::<SRC_BITS, ACCEL>(base0, base1, (total_steps & 0xff) as u8);
            write_sample::<DST_BITS>(
                &mut dst[dst_pos..],
                convert_depth::<SRC_BITS, DST_BITS>(value),
            );
            dst_pos += p.dst_frame;
            total_steps += p.step;
        }

        if total_steps >> 8 != 0 {
            base0 = base1;
            base1 = read_sample::<SRC_BITS>(&src[src_pos..]);
            src_pos += p.src_frame;
            total_steps &= 0xff;
        }
    }

    st.base0 = base0;
    st.base1 = base1;
    st.count = total_steps | SAMPLE_CONTINUE;
    Advance {
        src_bytes: src_pos,
        dst_bytes: dst_pos,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::bits_to_bytes as sample_bytes;
    use std::vec;
    use std::vec::Vec;

    fn write_ramp(bits: u8, samples: u32) -> Vec<u8> {
        let stride = sample_bytes(bits as u32);
        let mut data = vec![0u8; stride * samples as usize];
        for i in 0..samples {
            let value =
                ((samples as i32 / 2 - i as i32) * (65535 / samples as i32)) << (bits - 16);
            let out = &mut data[i as usize * stride..];
            match bits {
                16 => write_sample::<16>(out, value as u32),
                20 => write_sample::<20>(out, value as u32),
                24 => write_sample::<24>(out, value as u32),
                32 => write_sample::<32>(out, value as u32),
                _ => unreachable!(),
            }
        }
        data
    }

    fn read_all(bits: u8, data: &[u8]) -> Vec<i32> {
        let stride = sample_bytes(bits as u32);
        data.chunks_exact(stride)
            .map(|c| match bits {
                16 => read_sample::<16>(c) as i32,
                20 => read_sample::<20>(c) as i32,
                24 => read_sample::<24>(c) as i32,
                32 => read_sample::<32>(c) as i32,
                _ => unreachable!(),
            })
            .collect()
    }

    fn mono_config(src_bits: u8, src_freq: u32, dst_bits: u8, dst_freq: u32, accel: bool) -> ResamplerConfig {
        ResamplerConfig {
            src_bits,
            src_stride: sample_bytes(src_bits as u32) as u8,
            src_freq,
            dst_bits,
            dst_stride: sample_bytes(dst_bits as u32) as u8,
            dst_freq,
            channels: 1,
            accel,
        }
    }

    /// Streams `src` through a freshly configured resampler in windows of
    /// `src_part`/`dst_part` bytes (usize::MAX meaning the whole buffer).
    fn run_chunked(cfg: &ResamplerConfig, src: &[u8], src_part: usize, dst_part: usize) -> Vec<u8> {
        let mut rs = Resampler::new();
        rs.setup(cfg).unwrap();

        let mut dst = vec![0u8; src.len() * 8];
        let mut src_off = 0usize;
        let mut dst_off = 0usize;
        while src_off < src.len() {
            let src_end = src_off.saturating_add(src_part).min(src.len());
            let dst_end = dst_off.saturating_add(dst_part).min(dst.len());
            let adv = rs.apply(&src[src_off..src_end], &mut dst[dst_off..dst_end]);
            src_off += adv.src_bytes;
            dst_off += adv.dst_bytes;
        }
        dst.truncate(dst_off);
        dst
    }

    #[test]
    fn upsample_double_rate_interpolates_midpoints() {
        let cfg = mono_config(16, 1000, 16, 2000, false);
        let mut src = vec![0u8; 8];
        for (i, v) in [0i32, 1000, 2000, 3000].iter().enumerate() {
            write_sample::<16>(&mut src[i * 2..], *v as u32);
        }
        let out = run_chunked(&cfg, &src, usize::MAX, usize::MAX);
        assert_eq!(read_all(16, &out), [0, 500, 1000, 1500]);
    }

    #[test]
    fn upsample_state_carries_across_calls() {
        let cfg = mono_config(16, 1000, 16, 2000, false);
        let mut rs = Resampler::new();
        rs.setup(&cfg).unwrap();

        let mut src = vec![0u8; 12];
        for (i, v) in [0i32, 1000, 2000, 3000, 4000, 5000].iter().enumerate() {
            write_sample::<16>(&mut src[i * 2..], *v as u32);
        }
        let mut dst = [0u8; 32];
        let first = rs.apply(&src[..8], &mut dst);
        assert_eq!(first.src_bytes, 8);
        assert_eq!(read_all(16, &dst[..first.dst_bytes]), [0, 500, 1000, 1500]);

        let second = rs.apply(&src[8..], &mut dst);
        assert_eq!(
            read_all(16, &dst[..second.dst_bytes]),
            [2000, 2500, 3000, 3500]
        );
    }

    #[test]
    fn downsample_double_rate_picks_alternate_samples() {
        let cfg = mono_config(16, 2000, 16, 1000, false);
        let mut src = vec![0u8; 32];
        for i in 0..16 {
            write_sample::<16>(&mut src[i * 2..], (i as i32 * 100) as u32);
        }
        // two-sample bracket latency leaves the last pair unconsumed
        let out = run_chunked(&cfg, &src, usize::MAX, usize::MAX);
        assert_eq!(read_all(16, &out), [0, 200, 400, 600, 800, 1000]);
    }

    #[test]
    fn upsample_single_frame_window_reports_lack() {
        let cfg = mono_config(16, 1000, 16, 2000, false);
        let mut rs = Resampler::new();
        rs.setup(&cfg).unwrap();

        let mut frame = [0u8; 2];
        write_sample::<16>(&mut frame, 700);
        let mut dst = [0u8; 16];
        // a one-frame window cannot complete the bracket pair
        let adv = rs.apply(&frame, &mut dst);
        assert_eq!(adv, Advance { src_bytes: 2, dst_bytes: 0 });

        // the next window completes it and output resumes from sample 0
        let mut more = [0u8; 4];
        write_sample::<16>(&mut more, 900);
        write_sample::<16>(&mut more[2..], 1100);
        let adv = rs.apply(&more, &mut dst);
        assert!(adv.dst_bytes > 0);
        assert_eq!(read_all(16, &dst[..4]), [700, 800]);
    }

    #[test]
    fn chunking_is_transparent() {
        for &(src_freq, dst_freq) in &[(1000u32, 3333u32), (1000, 300)] {
            for &src_bits in &[16u8, 20, 24, 32] {
                for &dst_bits in &[16u8, 20, 24, 32] {
                    let cfg = mono_config(src_bits, src_freq, dst_bits, dst_freq, false);
                    let src = write_ramp(src_bits, 64);
                    let src_one = sample_bytes(src_bits as u32);
                    let dst_one = sample_bytes(dst_bits as u32);

                    let whole = run_chunked(&cfg, &src, usize::MAX, usize::MAX);
                    assert!(!whole.is_empty());
                    for &(sp, dp) in &[
                        (usize::MAX, dst_one),
                        (src_one, usize::MAX),
                        (src_one, dst_one),
                    ] {
                        let chunked = run_chunked(&cfg, &src, sp, dp);
                        assert_eq!(
                            chunked, whole,
                            "src_bits={} dst_bits={} {}->{} parts=({},{})",
                            src_bits, dst_bits, src_freq, dst_freq, sp, dp
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn accel_is_bit_identical() {
        for &(src_freq, dst_freq) in &[(1000u32, 3333u32), (1000, 300)] {
            for &src_bits in &[16u8, 20, 24, 32] {
                for &dst_bits in &[16u8, 20, 24, 32] {
                    let src = write_ramp(src_bits, 64);
                    let plain = run_chunked(
                        &mono_config(src_bits, src_freq, dst_bits, dst_freq, false),
                        &src,
                        usize::MAX,
                        usize::MAX,
                    );
                    let accel = run_chunked(
                        &mono_config(src_bits, src_freq, dst_bits, dst_freq, true),
                        &src,
                        usize::MAX,
                        usize::MAX,
                    );
                    assert_eq!(plain, accel, "src_bits={} dst_bits={}", src_bits, dst_bits);
                }
            }
        }
    }

    #[test]
    fn interpolation_preserves_monotony() {
        // a decreasing ramp upsampled 1000 -> 3333 stays non-increasing
        let cfg = mono_config(16, 1000, 16, 3333, false);
        let src = write_ramp(16, 64);
        let out = read_all(16, &run_chunked(&cfg, &src, usize::MAX, usize::MAX));
        assert!(out.len() > 150);
        assert!(out.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn opposite_ratios_recover_the_ramp() {
        // 1000 -> 3333 followed by 3333 -> 1000 lands back on the source
        // ramp within one source step
        let src = write_ramp(16, 64);
        let up = run_chunked(
            &mono_config(16, 1000, 16, 3333, false),
            &src,
            usize::MAX,
            usize::MAX,
        );
        let down = run_chunked(
            &mono_config(16, 3333, 16, 1000, false),
            &up,
            usize::MAX,
            usize::MAX,
        );
        let original = read_all(16, &src);
        let recovered = read_all(16, &down);
        assert!(recovered.len() >= 60);
        let step = 65535 / 64;
        for (i, &value) in recovered.iter().enumerate() {
            assert!(
                (value - original[i]).abs() <= step,
                "sample {i}: {value} vs {}",
                original[i]
            );
        }
    }

    #[test]
    fn stereo_channels_convert_independently() {
        let cfg = ResamplerConfig {
            channels: 2,
            ..mono_config(16, 1000, 16, 2000, false)
        };
        // left: ascending ramp, right: constant
        let mut src = vec![0u8; 16];
        for i in 0..4 {
            write_sample::<16>(&mut src[i * 4..], (i as i32 * 1000) as u32);
            write_sample::<16>(&mut src[i * 4 + 2..], 4444);
        }
        let out = run_chunked(&cfg, &src, usize::MAX, usize::MAX);
        let samples = read_all(16, &out);
        let left: Vec<i32> = samples.iter().step_by(2).copied().collect();
        let right: Vec<i32> = samples.iter().skip(1).step_by(2).copied().collect();
        assert_eq!(left, [0, 500, 1000, 1500]);
        assert_eq!(right, [4444, 4444, 4444, 4444]);
    }

    #[test]
    fn requirement_counts_bracket_overhead() {
        let mut rs = Resampler::new();
        rs.setup(&mono_config(16, 1000, 16, 3333, false)).unwrap();
        assert_eq!(rs.required_src_samples(0), 0);
        assert_eq!(rs.required_src_samples(1), 2);
        // step = 1000 * 256 / 3333 = 76
        assert_eq!(rs.required_src_samples(100), ((99 * 76) >> 8) + 2);
        assert_eq!(rs.required_src_bytes(200), (((99 * 76) >> 8) + 2) * 2);
    }

    #[test]
    fn setup_rejects_bad_formats() {
        let mut rs = Resampler::new();
        assert_eq!(
            rs.setup(&mono_config(12, 1000, 16, 2000, false)),
            Err(FormatError::UnsupportedBits { src: 12, dst: 16 })
        );
        assert_eq!(
            rs.setup(&ResamplerConfig {
                channels: 5,
                ..mono_config(16, 1000, 16, 2000, false)
            }),
            Err(FormatError::UnsupportedChannels(5))
        );
        assert_eq!(
            rs.setup(&mono_config(16, 1000, 16, 0, false)),
            Err(FormatError::ZeroFrequency)
        );
    }
}
