//! NEON backend: 128-bit vectors, 4 `f32` lanes, for aarch64.
//!
//! Gated by the `neon` Cargo feature. NEON is mandatory on aarch64, so this
//! gate exists only to keep the feature matrix symmetric with the x86_64
//! tiers; any aarch64 build is free to enable it unconditionally.

use super::VectorOps;
use crate::dtype::widen_f16;
use std::arch::aarch64::*;

/// Marker type for the NEON (`LANES = 4`) backend.
#[derive(Clone, Copy)]
pub struct Neon;

impl VectorOps for Neon {
    type Vector = float32x4_t;
    const LANES: usize = 4;

    #[inline]
    fn zero() -> float32x4_t {
        unsafe { vdupq_n_f32(0.0) }
    }

    #[inline]
    fn add(x: float32x4_t, y: float32x4_t) -> float32x4_t {
        unsafe { vaddq_f32(x, y) }
    }

    #[inline]
    fn mul(x: float32x4_t, y: float32x4_t) -> float32x4_t {
        unsafe { vmulq_f32(x, y) }
    }

    #[inline]
    fn sub(x: float32x4_t, y: float32x4_t) -> float32x4_t {
        unsafe { vsubq_f32(x, y) }
    }

    #[inline]
    fn madd(a: float32x4_t, b: float32x4_t, c: float32x4_t) -> float32x4_t {
        // `vfmaq_f32(a, b, c)` computes a + b * c.
        unsafe { vfmaq_f32(c, a, b) }
    }

    #[inline]
    fn hsum(v: float32x4_t) -> f32 {
        unsafe { vaddvq_f32(v) }
    }

    #[inline]
    unsafe fn load_f32(ptr: *const f32) -> float32x4_t {
        // SAFETY: caller guarantees `ptr` is valid for 4 `f32` reads.
        unsafe { vld1q_f32(ptr) }
    }

    #[inline]
    unsafe fn load_f16(ptr: *const u16) -> float32x4_t {
        // SAFETY: caller guarantees `ptr` is valid for 4 `u16` reads.
        let widened: [f32; 4] = unsafe { std::array::from_fn(|i| widen_f16(*ptr.add(i))) };
        unsafe { vld1q_f32(widened.as_ptr()) }
    }

    #[inline]
    unsafe fn load_bf16(ptr: *const u16) -> float32x4_t {
        // SAFETY: caller guarantees `ptr` is valid for 4 `u16` reads (8 bytes).
        unsafe {
            let halfs = vld1_u16(ptr);
            let zero = vdup_n_u16(0);
            let lo = vzip1_u16(zero, halfs);
            let hi = vzip2_u16(zero, halfs);
            let combined = vcombine_u16(lo, hi);
            vreinterpretq_f32_u16(combined)
        }
    }
}
