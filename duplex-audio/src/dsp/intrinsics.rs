//! ARM DSP instruction wrappers with pure-Rust fallbacks.
//!
//! On `thumbv7em` targets (Cortex-M4/M7 with DSP extension), these compile to
//! single-cycle ARM instructions. On other targets (host tests, Cortex-M0),
//! bit-identical pure-Rust implementations are used, so the `accel` flag in
//! the resampler and mixer configurations never changes output.

/// Signed saturate to `BITS`-wide two's-complement range.
///
/// Computes `saturate(val, -(2^(BITS-1))..2^(BITS-1)-1)`.
///
/// Maps to ARM `SSAT`. `BITS` must be a compile-time constant because the
/// instruction takes an immediate operand.
#[inline(always)]
pub fn signed_saturate<const BITS: u32>(val: i32) -> i32 {
    #[cfg(all(target_arch = "arm", target_feature = "dsp"))]
    {
        let out: i32;
        unsafe {
            core::arch::asm!(
                "ssat {out}, #{bits}, {val}",
                out = out(reg) out,
                val = in(reg) val,
                bits = const BITS,
            );
        }
        out
    }
    #[cfg(not(all(target_arch = "arm", target_feature = "dsp")))]
    {
        let max = ((1u32 << (BITS - 1)) - 1) as i32;
        let min = -max - 1;
        if val > max {
            max
        } else if val < min {
            min
        } else {
            val
        }
    }
}

/// Saturating 32-bit signed addition.
///
/// Overflow lands on the rail matching the operands' sign. Maps to ARM
/// `QADD`.
#[inline(always)]
pub fn saturating_add(a: i32, b: i32) -> i32 {
    #[cfg(all(target_arch = "arm", target_feature = "dsp"))]
    {
        let out: i32;
        unsafe {
            core::arch::asm!(
                "qadd {out}, {a}, {b}",
                out = out(reg) out,
                a = in(reg) a,
                b = in(reg) b,
            );
        }
        out
    }
    #[cfg(not(all(target_arch = "arm", target_feature = "dsp")))]
    {
        a.saturating_add(b)
    }
}

/// Multiply-accumulate with 32-bit wraparound: `acc + a * b`.
///
/// Maps to ARM `MLA`; the fallback wraps identically.
#[inline(always)]
pub fn multiply_accumulate(acc: i32, a: i32, b: i32) -> i32 {
    #[cfg(all(target_arch = "arm", target_feature = "dsp"))]
    {
        let out: i32;
        unsafe {
            core::arch::asm!(
                "mla {out}, {a}, {b}, {acc}",
                out = out(reg) out,
                a = in(reg) a,
                b = in(reg) b,
                acc = in(reg) acc,
            );
        }
        out
    }
    #[cfg(not(all(target_arch = "arm", target_feature = "dsp")))]
    {
        acc.wrapping_add(a.wrapping_mul(b))
    }
}
