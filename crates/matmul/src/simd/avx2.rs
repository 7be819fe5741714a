//! AVX2 backend: 256-bit vectors, 8 `f32` lanes.
//!
//! Gated by the `avx2` Cargo feature. The crate's build contract is that
//! whoever enables this feature also passes a matching `-C target-feature`
//! (or `target-cpu`) flag, so every `#[target_feature(enable = "avx2")]`
//! function here is safe to call unconditionally from the rest of the crate.

use super::VectorOps;
use crate::dtype::widen_f16;
use std::arch::x86_64::*;

/// Marker type for the AVX2 (`LANES = 8`) backend.
#[derive(Clone, Copy)]
pub struct Avx2;

impl VectorOps for Avx2 {
    type Vector = __m256;
    const LANES: usize = 8;

    #[inline]
    fn zero() -> __m256 {
        // SAFETY: AVX2 implies AVX; this is available whenever the crate was
        // built with the `avx2` feature.
        unsafe { _mm256_setzero_ps() }
    }

    #[inline]
    fn add(x: __m256, y: __m256) -> __m256 {
        unsafe { _mm256_add_ps(x, y) }
    }

    #[inline]
    fn mul(x: __m256, y: __m256) -> __m256 {
        unsafe { _mm256_mul_ps(x, y) }
    }

    #[inline]
    fn sub(x: __m256, y: __m256) -> __m256 {
        unsafe { _mm256_sub_ps(x, y) }
    }

    #[inline]
    fn madd(a: __m256, b: __m256, c: __m256) -> __m256 {
        if cfg!(feature = "fma") {
            // SAFETY: gated by the `fma` Cargo feature, which the build
            // contract ties to a matching `-C target-feature=+fma`.
            unsafe { fma_madd(a, b, c) }
        } else {
            unsafe { _mm256_add_ps(_mm256_mul_ps(a, b), c) }
        }
    }

    #[inline]
    fn hsum(v: __m256) -> f32 {
        unsafe { hsum_avx2(v) }
    }

    #[inline]
    unsafe fn load_f32(ptr: *const f32) -> __m256 {
        // SAFETY: caller guarantees `ptr` is valid for 8 `f32` reads.
        unsafe { _mm256_loadu_ps(ptr) }
    }

    #[inline]
    unsafe fn load_f16(ptr: *const u16) -> __m256 {
        // SAFETY: caller guarantees `ptr` is valid for 8 `u16` reads.
        let widened: [f32; 8] = unsafe { std::array::from_fn(|i| widen_f16(*ptr.add(i))) };
        unsafe { _mm256_loadu_ps(widened.as_ptr()) }
    }

    #[inline]
    unsafe fn load_bf16(ptr: *const u16) -> __m256 {
        // SAFETY: caller guarantees `ptr` is valid for 8 `u16` reads (16 bytes).
        unsafe {
            let halfs = _mm_loadu_si128(ptr.cast::<__m128i>());
            let zero = _mm_setzero_si128();
            let lo = _mm_unpacklo_epi16(zero, halfs);
            let hi = _mm_unpackhi_epi16(zero, halfs);
            let combined = _mm256_set_m128i(hi, lo);
            _mm256_castsi256_ps(combined)
        }
    }
}

/// Horizontal sum of all 8 lanes of `v`.
///
/// # Safety
///
/// Requires AVX2, guaranteed by this module's `#[cfg(feature = "avx2")]` gate.
#[target_feature(enable = "avx2")]
unsafe fn hsum_avx2(v: __m256) -> f32 {
    unsafe {
        let lo = _mm256_castps256_ps128(v);
        let hi = _mm256_extractf128_ps(v, 1);
        let sum = _mm_add_ps(lo, hi);
        let shuf = _mm_movehdup_ps(sum);
        let sums = _mm_add_ps(sum, shuf);
        let shuf2 = _mm_movehl_ps(shuf, sums);
        let result = _mm_add_ss(sums, shuf2);
        _mm_cvtss_f32(result)
    }
}

/// Fused multiply-add via the `fma` instruction set.
///
/// # Safety
///
/// Requires `avx2,fma`; only called when the `fma` Cargo feature is enabled,
/// which ties to a matching `-C target-feature=+fma` build flag.
#[target_feature(enable = "avx2,fma")]
unsafe fn fma_madd(a: __m256, b: __m256, c: __m256) -> __m256 {
    unsafe { _mm256_fmadd_ps(a, b, c) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::widen_bf16;

    /// `true` once per run when this CPU lacks AVX2, so the intrinsics below
    /// don't SIGILL on CI hardware built with `--features avx2` but running
    /// on an older machine.
    fn skip_without_avx2() -> bool {
        if !is_x86_feature_detected!("avx2") {
            eprintln!("skipping: host CPU does not support AVX2");
            return true;
        }
        false
    }

    #[test]
    fn hsum_matches_naive_sum() {
        if skip_without_avx2() {
            return;
        }
        let v = unsafe { _mm256_setr_ps(1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0) };
        assert_eq!(Avx2::hsum(v), 36.0);
    }

    #[test]
    fn load_bf16_matches_scalar_widen() {
        if skip_without_avx2() {
            return;
        }
        let bits: [u16; 8] = [
            0x3f80, 0xbf80, 0x4000, 0x0000, 0x4040, 0x4080, 0x40a0, 0x40c0,
        ];
        let v = unsafe { Avx2::load_bf16(bits.as_ptr()) };
        let mut out = [0f32; 8];
        unsafe { _mm256_storeu_ps(out.as_mut_ptr(), v) };
        for (lane, &bits) in bits.iter().enumerate() {
            assert_eq!(out[lane], widen_bf16(bits));
        }
    }

    #[test]
    fn madd_matches_add_mul_without_fma_feature() {
        if skip_without_avx2() {
            return;
        }
        let a = unsafe { _mm256_set1_ps(2.0) };
        let b = unsafe { _mm256_set1_ps(3.0) };
        let c = unsafe { _mm256_set1_ps(1.0) };
        let v = Avx2::madd(a, b, c);
        assert_eq!(Avx2::hsum(v), 7.0 * 8.0);
    }
}
