//! The scalar/vector arithmetic vocabulary (spec ยง4.1).
//!
//! [`VectorOps`] is implemented once per (ISA, vector width) pair the target
//! enables at compile time. Every tile-engine function that needs
//! arithmetic is generic over a `B: VectorOps` type parameter and is
//! monomorphised per backend - there is no runtime dtype or ISA branch
//! inside a `k`-loop, matching the "compile-time polymorphism over vector
//! types" design note.
//!
//! Backends are selected by Cargo feature, never by
//! `is_x86_feature_detected!`: the crate's contract is that the build itself
//! (Cargo feature plus a matching `-C target-feature`/`target-cpu` flag)
//! guarantees the instructions are available at runtime. This is the one
//! place this crate deliberately departs from the sibling `checksums`
//! crate's `OnceLock`-cached runtime-detection pattern (see
//! `crates/matmul/src/simd/avx2.rs` safety docs).

pub mod scalar;

#[cfg(all(target_arch = "x86_64", feature = "avx2"))]
pub mod avx2;
#[cfg(all(target_arch = "x86_64", feature = "avx512"))]
pub mod avx512;
#[cfg(target_arch = "x86_64")]
pub mod sse2;

#[cfg(all(target_arch = "aarch64", feature = "neon"))]
pub mod neon;

/// Uniform arithmetic vocabulary over one (ISA, vector-width) pair.
///
/// Implementors are zero-sized marker types; all methods are associated
/// functions so the compiler can inline and specialise freely. `Vector` is
/// `Copy` so accumulator arrays (`[[B::Vector; RM]; RN]`) live entirely in
/// registers/stack, never the heap.
pub trait VectorOps: Copy {
    /// The native SIMD vector type for this backend (or `f32` for the
    /// single-lane scalar backend).
    type Vector: Copy;

    /// Number of `f32` lanes per vector.
    const LANES: usize;

    /// The additive identity vector.
    fn zero() -> Self::Vector;

    /// Lanewise `x + y`.
    fn add(x: Self::Vector, y: Self::Vector) -> Self::Vector;

    /// Lanewise `x * y`.
    fn mul(x: Self::Vector, y: Self::Vector) -> Self::Vector;

    /// Lanewise `x - y`.
    fn sub(x: Self::Vector, y: Self::Vector) -> Self::Vector;

    /// Lanewise fused `a * b + c`, using a hardware FMA instruction when the
    /// `fma` feature is enabled, else `add(mul(a, b), c)`.
    fn madd(a: Self::Vector, b: Self::Vector, c: Self::Vector) -> Self::Vector {
        Self::add(Self::mul(a, b), c)
    }

    /// Horizontal reduce-to-scalar. Only ever called after the full `k`
    /// reduction for a tile completes.
    fn hsum(v: Self::Vector) -> f32;

    /// Loads `LANES` contiguous `f32` values.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `LANES` `f32` values.
    unsafe fn load_f32(ptr: *const f32) -> Self::Vector;

    /// Loads `LANES` contiguous `f16` values (raw bit patterns) and widens
    /// them to `f32` lanes.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `LANES` `u16` values.
    unsafe fn load_f16(ptr: *const u16) -> Self::Vector;

    /// Loads `LANES` contiguous `bf16` values (raw bit patterns) and widens
    /// them to `f32` lanes by left-shifting 16 bits.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `LANES` `u16` values.
    unsafe fn load_bf16(ptr: *const u16) -> Self::Vector;
}

/// Number of vector registers the current compile-time ISA tier is assumed
/// to expose, driving the dense tile-shape table in
/// [`crate::tile_f::select_shape`].
#[must_use]
pub const fn vector_register_count() -> u32 {
    if cfg!(all(target_arch = "x86_64", feature = "avx512")) {
        32
    } else if cfg!(target_arch = "aarch64") {
        32
    } else {
        16
    }
}

/// `true` when the compile-time ISA tier exposes a dedicated matrix-multiply
/// or wide-dot instruction (AVX2 and above on x86_64, NEON on aarch64) - the
/// gemv guard (spec ยง4.7 point 2) only applies when this is `false`.
#[must_use]
pub const fn has_matrix_hardware() -> bool {
    cfg!(any(feature = "avx2", feature = "avx512", feature = "neon"))
}
