//! SSE2 backend: 128-bit vectors, 4 `f32` lanes.
//!
//! SSE2 is part of the x86_64 baseline ABI, so this module compiles
//! unconditionally for that target and serves as the floor tier beneath
//! `avx2`/`avx512`.
//!
//! # Safety
//!
//! Every function below requires SSE2, which is always available on
//! x86_64; no `#[target_feature]` gate is needed for the intrinsics
//! themselves, only for the pointer-validity contract documented per method.

use super::VectorOps;
use crate::dtype::widen_f16;
use std::arch::x86_64::*;

/// Marker type for the SSE2 (`LANES = 4`) backend.
#[derive(Clone, Copy)]
pub struct Sse2;

impl VectorOps for Sse2 {
    type Vector = __m128;
    const LANES: usize = 4;

    #[inline]
    fn zero() -> __m128 {
        unsafe { _mm_setzero_ps() }
    }

    #[inline]
    fn add(x: __m128, y: __m128) -> __m128 {
        unsafe { _mm_add_ps(x, y) }
    }

    #[inline]
    fn mul(x: __m128, y: __m128) -> __m128 {
        unsafe { _mm_mul_ps(x, y) }
    }

    #[inline]
    fn sub(x: __m128, y: __m128) -> __m128 {
        unsafe { _mm_sub_ps(x, y) }
    }

    #[inline]
    fn madd(a: __m128, b: __m128, c: __m128) -> __m128 {
        // SSE2 has no fused multiply-add; compose it.
        unsafe { _mm_add_ps(_mm_mul_ps(a, b), c) }
    }

    #[inline]
    fn hsum(v: __m128) -> f32 {
        unsafe {
            // [a, b, c, d] -> [c, d, c, d] -> [a+c, b+d, ..] -> [b+d, ..] -> a+b+c+d
            let hi = _mm_movehl_ps(v, v);
            let sum = _mm_add_ps(v, hi);
            let shuf = _mm_shuffle_ps(sum, sum, 1);
            let total = _mm_add_ss(sum, shuf);
            _mm_cvtss_f32(total)
        }
    }

    #[inline]
    unsafe fn load_f32(ptr: *const f32) -> __m128 {
        // SAFETY: caller guarantees `ptr` is valid for 4 `f32` reads.
        unsafe { _mm_loadu_ps(ptr) }
    }

    #[inline]
    unsafe fn load_f16(ptr: *const u16) -> __m128 {
        // No F16C-independent vector widen at this tier: widen the 4 halfs
        // through the scalar conversion table, then vector-load the result.
        // SAFETY: caller guarantees `ptr` is valid for 4 `u16` reads.
        let widened: [f32; 4] = unsafe { std::array::from_fn(|i| widen_f16(*ptr.add(i))) };
        unsafe { _mm_loadu_ps(widened.as_ptr()) }
    }

    #[inline]
    unsafe fn load_bf16(ptr: *const u16) -> __m128 {
        // SAFETY: caller guarantees `ptr` is valid for 4 `u16` reads (8 bytes).
        unsafe {
            let halfs = _mm_loadl_epi64(ptr.cast::<__m128i>());
            let zero = _mm_setzero_si128();
            let widened = _mm_unpacklo_epi16(zero, halfs); // bf16 bits land in the high halfword
            _mm_castsi128_ps(widened)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::widen_bf16;

    #[test]
    fn hsum_matches_naive_sum() {
        let v = unsafe { _mm_setr_ps(1.0, 2.0, 3.0, 4.0) };
        assert_eq!(Sse2::hsum(v), 10.0);
    }

    #[test]
    fn load_bf16_matches_scalar_widen() {
        let bits: [u16; 4] = [0x3f80, 0xbf80, 0x4000, 0x0000]; // 1.0, -1.0, 2.0, 0.0
        let v = unsafe { Sse2::load_bf16(bits.as_ptr()) };
        let mut out = [0f32; 4];
        unsafe { _mm_storeu_ps(out.as_mut_ptr(), v) };
        for (lane, &bits) in bits.iter().enumerate() {
            assert_eq!(out[lane], widen_bf16(bits));
        }
    }
}
