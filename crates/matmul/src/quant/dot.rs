//! Unsigned-by-signed dot primitive `updot` (spec §4.3): a 32-lane `u8 * i8`
//! dot-product returning 8 `f32` partial sums, each lane the reduction of
//! four products.
//!
//! Three tiers, selected entirely at compile time by Cargo feature:
//!
//! 1. `vnni` - dedicated `VPDPBUSD` (AVX512-VNNI, EVEX-encoded, usable on
//!    256-bit registers via AVX512VL).
//! 2. `avxvnni` - the same operation under the non-AVX512 AVX-VNNI
//!    extension, a different mnemonic (`_avx_` suffix) for the same result.
//! 3. Fallback - widen to `i16` pairwise (`maddubs`), horizontal-add
//!    adjacent pairs to `i32` (`madd` against an all-ones vector), convert
//!    to `f32`.
//!
//! All three tiers agree bit-for-bit on any input where `s` has already
//! been sign-folded through [`sign_fold`] so that the VNNI saturation edge
//! case (`u8::MAX * i8::MIN`, the one product that can saturate) never
//! occurs: callers pre-fold the signed operand against itself before
//! calling `updot`, matching the spec's `sign(A,A), sign(B,A)` convention.

/// Applies AVX `sign_epi8` semantics lanewise: `copy_sign(x, y)`, i.e. zero
/// where `y == 0`, negate `x` where `y < 0`, pass `x` through where `y > 0`.
#[must_use]
pub fn sign_fold(x: &[i8; 32], y: &[i8; 32]) -> [i8; 32] {
    std::array::from_fn(|i| match y[i].signum() {
        0 => 0,
        s if s < 0 => x[i].wrapping_neg(),
        _ => x[i],
    })
}

/// Computes the 8-lane partial-sum dot product of `u` (unsigned) against
/// `s` (signed).
#[must_use]
pub fn updot(u: &[u8; 32], s: &[i8; 32]) -> [f32; 8] {
    tier::updot(u, s)
}

#[cfg(all(target_arch = "x86_64", feature = "vnni"))]
mod tier {
    use std::arch::x86_64::*;

    pub fn updot(u: &[u8; 32], s: &[i8; 32]) -> [f32; 8] {
        // SAFETY: gated by the `vnni` Cargo feature, whose build contract
        // requires a matching `-C target-feature=+avx512vnni,+avx512vl`.
        unsafe { dpbusd_vnni(u, s) }
    }

    #[target_feature(enable = "avx512vnni,avx512vl")]
    unsafe fn dpbusd_vnni(u: &[u8; 32], s: &[i8; 32]) -> [f32; 8] {
        unsafe {
            let uv = _mm256_loadu_si256(u.as_ptr().cast());
            let sv = _mm256_loadu_si256(s.as_ptr().cast());
            let acc = _mm256_dpbusd_epi32(_mm256_setzero_si256(), uv, sv);
            let mut out = [0i32; 8];
            _mm256_storeu_si256(out.as_mut_ptr().cast(), acc);
            out.map(|v| v as f32)
        }
    }
}

#[cfg(all(
    target_arch = "x86_64",
    feature = "avxvnni",
    not(feature = "vnni")
))]
mod tier {
    use std::arch::x86_64::*;

    pub fn updot(u: &[u8; 32], s: &[i8; 32]) -> [f32; 8] {
        // SAFETY: gated by the `avxvnni` Cargo feature (`-C
        // target-feature=+avxvnni`).
        unsafe { dpbusd_avxvnni(u, s) }
    }

    #[target_feature(enable = "avxvnni")]
    unsafe fn dpbusd_avxvnni(u: &[u8; 32], s: &[i8; 32]) -> [f32; 8] {
        unsafe {
            let uv = _mm256_loadu_si256(u.as_ptr().cast());
            let sv = _mm256_loadu_si256(s.as_ptr().cast());
            let acc = _mm256_dpbusd_avx_epi32(_mm256_setzero_si256(), uv, sv);
            let mut out = [0i32; 8];
            _mm256_storeu_si256(out.as_mut_ptr().cast(), acc);
            out.map(|v| v as f32)
        }
    }
}

#[cfg(all(
    target_arch = "x86_64",
    not(feature = "vnni"),
    not(feature = "avxvnni"),
    feature = "avx2"
))]
mod tier {
    use std::arch::x86_64::*;

    pub fn updot(u: &[u8; 32], s: &[i8; 32]) -> [f32; 8] {
        // SAFETY: gated by the `avx2` Cargo feature.
        unsafe { maddubs_fallback(u, s) }
    }

    #[target_feature(enable = "avx2")]
    unsafe fn maddubs_fallback(u: &[u8; 32], s: &[i8; 32]) -> [f32; 8] {
        unsafe {
            let uv = _mm256_loadu_si256(u.as_ptr().cast());
            let sv = _mm256_loadu_si256(s.as_ptr().cast());
            // u8 * i8 -> saturating i16, then pairwise-add adjacent i16 to i32.
            let widened = _mm256_maddubs_epi16(uv, sv);
            let ones = _mm256_set1_epi16(1);
            let summed = _mm256_madd_epi16(widened, ones);
            let as_f32 = _mm256_cvtepi32_ps(summed);
            let mut out = [0f32; 8];
            _mm256_storeu_ps(out.as_mut_ptr(), as_f32);
            out
        }
    }
}

#[cfg(not(all(
    target_arch = "x86_64",
    any(feature = "vnni", feature = "avxvnni", feature = "avx2")
)))]
mod tier {
    pub fn updot(u: &[u8; 32], s: &[i8; 32]) -> [f32; 8] {
        super::scalar_reference(u, s)
    }
}

/// Scalar reference tier, also used directly on ISAs with no byte-dot
/// instruction and as the oracle every hardware tier's tests compare against.
#[must_use]
pub fn scalar_reference(u: &[u8; 32], s: &[i8; 32]) -> [f32; 8] {
    let mut out = [0i32; 8];
    for lane in 0..8 {
        let mut acc = 0i32;
        for k in 0..4 {
            let idx = lane * 4 + k;
            acc += i32::from(u[idx]) * i32::from(s[idx]);
        }
        out[lane] = acc;
    }
    out.map(|v| v as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_fold_zeroes_negates_or_passes() {
        let x: [i8; 32] = std::array::from_fn(|i| (i as i8) - 16);
        let y: [i8; 32] = std::array::from_fn(|i| match i % 3 {
            0 => 0,
            1 => 1,
            _ => -1,
        });
        let folded = sign_fold(&x, &y);
        for i in 0..32 {
            match i % 3 {
                0 => assert_eq!(folded[i], 0),
                1 => assert_eq!(folded[i], x[i]),
                _ => assert_eq!(folded[i], x[i].wrapping_neg()),
            }
        }
    }

    #[test]
    fn updot_matches_naive_dot_for_ones() {
        let u = [1u8; 32];
        let s = [2i8; 32];
        let result = updot(&u, &s);
        assert_eq!(result, [8.0f32; 8]);
    }

    #[test]
    fn updot_matches_scalar_reference_on_random_inputs() {
        let u: [u8; 32] = std::array::from_fn(|i| (i * 7 % 251) as u8 % 120);
        let s: [i8; 32] = std::array::from_fn(|i| ((i * 13 % 251) as i32 - 120) as i8 / 2);
        let folded = sign_fold(&s, &s);
        assert_eq!(updot(&u, &folded), scalar_reference(&u, &folded));
    }
}
