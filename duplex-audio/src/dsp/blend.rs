//! Fixed-point linear interpolation between two samples.
//!
//! `alpha` is an 8.8 fixed-point fraction's low byte (0..=255); 256 would be
//! unity but unity is expressed by passing `v1` itself. Arithmetic width
//! follows the sample depth: depths below 32 bits run in wrapping 32-bit
//! arithmetic, 32-bit samples widen to a 64-bit accumulator so the
//! intermediate difference cannot wrap.

use super::intrinsics;

/// `v0 + ((v1 - v0) * alpha) >> 8` over sign-extended sample patterns.
#[inline(always)]
pub fn blend<const BITS: u32>(v0: u32, v1: u32, alpha: u8) -> u32 {
    if BITS >= 32 {
        let v0_64 = v0 as i32 as i64;
        let v1_64 = v1 as i32 as i64;
        (v0_64 + (((v1_64 - v0_64) * alpha as i64) >> 8)) as u32
    } else {
        let diff = v1.wrapping_sub(v0).wrapping_mul(alpha as u32);
        v0.wrapping_add(((diff as i32) >> 8) as u32)
    }
}

/// [`blend`] with the multiply routed through the hardware
/// multiply-accumulate on targets that have it. Bit-identical to [`blend`]
/// for every input; depths of 32 bits need the 64-bit accumulator and share
/// the plain path.
#[inline(always)]
pub fn blend_accel<const BITS: u32>(v0: u32, v1: u32, alpha: u8) -> u32 {
    if BITS >= 32 {
        blend::<BITS>(v0, v1, alpha)
    } else {
        let diff = intrinsics::multiply_accumulate(0, v1.wrapping_sub(v0) as i32, alpha as i32);
        v0.wrapping_add((diff >> 8) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints() {
        assert_eq!(blend::<16>(100, 200, 0), 100);
        // alpha 255 lands one step short of v1
        assert_eq!(blend::<16>(0, 256, 255), 255);
    }

    #[test]
    fn midpoint() {
        assert_eq!(blend::<16>(0, 1000, 128), 500);
        assert_eq!(blend::<24>(0xffff_f000, 0, 128), 0xffff_f800);
        // full negative rail to full positive rail lands just below zero
        assert_eq!(blend::<32>(0x8000_0000, 0x7fff_ffff, 128), 0xffff_ffff);
    }

    #[test]
    fn negative_slope() {
        // descending ramp, 16-bit: from 100 down to -100 at alpha 64
        let v = blend::<16>(100, (-100i32) as u32, 64);
        assert_eq!(v as i32, 50);
    }

    #[test]
    fn volume_scaling_form() {
        // blend(0, v, alpha) is the mixer's v * alpha >> 8
        assert_eq!(blend::<16>(0, 0x4000, 0x80), 0x2000);
        assert_eq!(blend::<32>(0, 0x4000_0000, 0x80), 0x2000_0000);
        let v = blend::<16>(0, (-32768i32) as u32, 0x80);
        assert_eq!(v as i32, -16384);
    }

    #[test]
    fn accel_matches_plain() {
        let samples: [(u32, u32); 5] = [
            (0, 0xffff_8000),
            (0x0000_7fff, 0xffff_8000),
            (0xff80_0000, 0x007f_ffff),
            (0x8000_0000, 0x7fff_ffff),
            (123, 456),
        ];
        for &(v0, v1) in &samples {
            for alpha in [0u8, 1, 64, 128, 200, 255] {
                assert_eq!(blend::<16>(v0, v1, alpha), blend_accel::<16>(v0, v1, alpha));
                assert_eq!(blend::<20>(v0, v1, alpha), blend_accel::<20>(v0, v1, alpha));
                assert_eq!(blend::<24>(v0, v1, alpha), blend_accel::<24>(v0, v1, alpha));
                assert_eq!(blend::<32>(v0, v1, alpha), blend_accel::<32>(v0, v1, alpha));
            }
        }
    }
}
