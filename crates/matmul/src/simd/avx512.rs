//! AVX-512 backend: 512-bit vectors, 16 `f32` lanes.
//!
//! Gated by the `avx512` Cargo feature, which also pulls in `avx2` as a
//! prerequisite (see the feature table in `Cargo.toml`). Same build contract
//! as [`super::avx2`]: the enabling `-C target-feature`/`target-cpu` flag is
//! the caller's responsibility, not this crate's.

use super::VectorOps;
use crate::dtype::widen_f16;
use std::arch::x86_64::*;

/// Marker type for the AVX-512F (`LANES = 16`) backend.
#[derive(Clone, Copy)]
pub struct Avx512;

impl VectorOps for Avx512 {
    type Vector = __m512;
    const LANES: usize = 16;

    #[inline]
    fn zero() -> __m512 {
        unsafe { _mm512_setzero_ps() }
    }

    #[inline]
    fn add(x: __m512, y: __m512) -> __m512 {
        unsafe { _mm512_add_ps(x, y) }
    }

    #[inline]
    fn mul(x: __m512, y: __m512) -> __m512 {
        unsafe { _mm512_mul_ps(x, y) }
    }

    #[inline]
    fn sub(x: __m512, y: __m512) -> __m512 {
        unsafe { _mm512_sub_ps(x, y) }
    }

    #[inline]
    fn madd(a: __m512, b: __m512, c: __m512) -> __m512 {
        // AVX-512F guarantees FMA; there is no non-FMA AVX-512 tier.
        unsafe { _mm512_fmadd_ps(a, b, c) }
    }

    #[inline]
    fn hsum(v: __m512) -> f32 {
        unsafe { _mm512_reduce_add_ps(v) }
    }

    #[inline]
    unsafe fn load_f32(ptr: *const f32) -> __m512 {
        // SAFETY: caller guarantees `ptr` is valid for 16 `f32` reads.
        unsafe { _mm512_loadu_ps(ptr) }
    }

    #[inline]
    unsafe fn load_f16(ptr: *const u16) -> __m512 {
        if cfg!(feature = "bf16-hw") {
            // SAFETY: `bf16-hw` implies `avx512`; F16C-style native half
            // conversion is available. Caller guarantees 16 `u16` reads.
            unsafe { load_f16_native(ptr) }
        } else {
            // SAFETY: caller guarantees `ptr` is valid for 16 `u16` reads.
            let widened: [f32; 16] = unsafe { std::array::from_fn(|i| widen_f16(*ptr.add(i))) };
            unsafe { _mm512_loadu_ps(widened.as_ptr()) }
        }
    }

    #[inline]
    unsafe fn load_bf16(ptr: *const u16) -> __m512 {
        // SAFETY: caller guarantees `ptr` is valid for 16 `u16` reads (32 bytes).
        unsafe {
            let halfs = _mm256_loadu_si256(ptr.cast::<__m256i>());
            let zero = _mm256_setzero_si256();
            let lo = _mm256_unpacklo_epi16(zero, halfs);
            let hi = _mm256_unpackhi_epi16(zero, halfs);
            // Interleave the two 256-bit halves' lane order back into sequence:
            // unpacklo/hi operate per-128-bit-lane, so recombine through a
            // permute rather than a straight concatenation.
            let combined = _mm512_inserti64x4(_mm512_castsi256_si512(lo), hi, 1);
            let idx = _mm512_setr_epi32(
                0, 1, 4, 5, 2, 3, 6, 7, 8, 9, 12, 13, 10, 11, 14, 15,
            );
            let fixed = _mm512_permutexvar_epi32(idx, combined);
            _mm512_castsi512_ps(fixed)
        }
    }
}

/// Native half-to-single widen for one 16-lane group, used only when the
/// `bf16-hw` feature (which implies dedicated half-precision hardware) is
/// enabled.
///
/// # Safety
///
/// Requires AVX-512F + F16C; gated by the `bf16-hw` Cargo feature. Caller
/// guarantees `ptr` is valid for 16 `u16` reads.
#[target_feature(enable = "avx512f,f16c")]
unsafe fn load_f16_native(ptr: *const u16) -> __m512 {
    unsafe {
        let halfs = _mm256_loadu_si256(ptr.cast::<__m256i>());
        _mm512_cvtph_ps(halfs)
    }
}
