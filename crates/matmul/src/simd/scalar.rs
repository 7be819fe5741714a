//! Single-lane scalar backend.
//!
//! Used directly when no SIMD feature is enabled for the target, and as the
//! reference implementation every SIMD backend's unit tests compare against.

use super::VectorOps;
use crate::dtype::{widen_bf16, widen_f16};

/// Marker type for the scalar (`LANES = 1`) backend.
#[derive(Clone, Copy)]
pub struct Scalar;

impl VectorOps for Scalar {
    type Vector = f32;
    const LANES: usize = 1;

    #[inline]
    fn zero() -> f32 {
        0.0
    }

    #[inline]
    fn add(x: f32, y: f32) -> f32 {
        x + y
    }

    #[inline]
    fn mul(x: f32, y: f32) -> f32 {
        x * y
    }

    #[inline]
    fn sub(x: f32, y: f32) -> f32 {
        x - y
    }

    #[inline]
    fn madd(a: f32, b: f32, c: f32) -> f32 {
        a.mul_add(b, c)
    }

    #[inline]
    fn hsum(v: f32) -> f32 {
        v
    }

    #[inline]
    unsafe fn load_f32(ptr: *const f32) -> f32 {
        // SAFETY: caller guarantees `ptr` is valid for one `f32` read.
        unsafe { *ptr }
    }

    #[inline]
    unsafe fn load_f16(ptr: *const u16) -> f32 {
        // SAFETY: caller guarantees `ptr` is valid for one `u16` read.
        widen_f16(unsafe { *ptr })
    }

    #[inline]
    unsafe fn load_bf16(ptr: *const u16) -> f32 {
        // SAFETY: caller guarantees `ptr` is valid for one `u16` read.
        widen_bf16(unsafe { *ptr })
    }
}
