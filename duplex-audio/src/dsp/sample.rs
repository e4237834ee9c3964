//! Raw PCM sample load/store and bit-depth conversion.
//!
//! Samples travel through the pipeline as sign-extended two's-complement
//! values carried in `u32` bit patterns, regardless of their stored width.
//! Storage is little-endian, packed to `bits_to_bytes(BITS)` bytes.

/// Storage bytes for a sample of `bits` width.
pub const fn bits_to_bytes(bits: u32) -> usize {
    ((bits + 7) / 8) as usize
}

/// Loads one sample of `BITS` width from `src` (little-endian), masks it to
/// `BITS` and sign-extends into the full 32-bit pattern.
#[inline(always)]
pub fn read_sample<const BITS: u32>(src: &[u8]) -> u32 {
    let bytes = bits_to_bytes(BITS);
    let mut value: u32 = 0;
    if bytes >= 4 {
        value |= (src[3] as u32) << 24;
    }
    if bytes >= 3 {
        value |= (src[2] as u32) << 16;
    }
    if bytes >= 2 {
        value |= (src[1] as u32) << 8;
    }
    value |= src[0] as u32;

    let mask: u32 = if BITS < 32 { (1u32 << BITS) - 1 } else { u32::MAX };
    value &= mask;
    if BITS < 32 {
        let sign_bit = 1u32 << (BITS - 1);
        value |= ((value & sign_bit) ^ sign_bit).wrapping_sub(1) & !mask;
    }
    value
}

/// Stores the low `bits_to_bytes(BITS)` bytes of `value` into `dst`
/// (little-endian), masked to `BITS`.
#[inline(always)]
pub fn write_sample<const BITS: u32>(dst: &mut [u8], value: u32) {
    let masked = if BITS < 32 {
        value & ((1u32 << BITS) - 1)
    } else {
        value
    };
    let le = masked.to_le_bytes();
    dst[0] = le[0];
    if BITS > 8 {
        dst[1] = le[1];
    }
    if BITS > 16 {
        dst[2] = le[2];
    }
    if BITS > 24 {
        dst[3] = le[3];
    }
}

/// Converts a sign-extended sample between bit depths by arithmetic shift.
/// Widening shifts left, narrowing truncates low bits (no rounding or
/// dithering).
#[inline(always)]
pub fn convert_depth<const SRC_BITS: u32, const DST_BITS: u32>(value: u32) -> u32 {
    if DST_BITS > SRC_BITS {
        ((value as i32) << (DST_BITS - SRC_BITS)) as u32
    } else if SRC_BITS > DST_BITS {
        ((value as i32) >> (SRC_BITS - DST_BITS)) as u32
    } else {
        value
    }
}
