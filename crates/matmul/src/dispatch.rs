//! The dispatcher (spec §4.7): the sole public entry point.
//!
//! [`matmul`] validates shapes, picks an engine by `(Atype, Btype, Ctype)`
//! and compile-time ISA, instantiates the right monomorphised kernel, and
//! returns whether a handwritten kernel ran. Returning `false` is a
//! contract, not an error: it means "run the generic fallback yourself".

use crate::dtype::{Iq4NlBlock, MatrixView, MatrixViewMut, Q4_0Block, Q5_0Block, Q8_0Block};
use crate::quant::{load_iq4nl, load_q4, load_q5, load_q8};
use crate::schedule::{self, DenseSchedule, FlatSchedule};
use crate::simd::{self, scalar::Scalar, VectorOps};
use crate::tile_f::{self, Bf16Elem, F16Elem, F32Elem, FloatElem, TileShape};
use crate::tile_q::{self, HasDelta};
use crate::threadpool::Params;

pub use crate::dtype::DType;

#[cfg(all(target_arch = "x86_64", feature = "avx512"))]
type Backend = crate::simd::avx512::Avx512;
#[cfg(all(target_arch = "x86_64", feature = "avx2", not(feature = "avx512")))]
type Backend = crate::simd::avx2::Avx2;
#[cfg(all(target_arch = "x86_64", not(feature = "avx512"), not(feature = "avx2")))]
type Backend = crate::simd::sse2::Sse2;
#[cfg(all(target_arch = "aarch64", feature = "neon"))]
type Backend = crate::simd::neon::Neon;
#[cfg(all(target_arch = "aarch64", not(feature = "neon")))]
type Backend = Scalar;
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
type Backend = Scalar;

/// The left-operand descriptor: dtype tag and payload bundled together so
/// the two can never disagree.
#[derive(Clone, Copy)]
pub enum ADesc<'a> {
    /// Dense `f32`.
    F32(&'a [f32]),
    /// Dense `f16`, raw bit patterns.
    F16(&'a [u16]),
    /// Dense `bf16`, raw bit patterns.
    Bf16(&'a [u16]),
    /// `q8_0` blocks.
    Q8_0(&'a [Q8_0Block]),
    /// `q4_0` blocks.
    Q4_0(&'a [Q4_0Block]),
    /// `q5_0` blocks.
    Q5_0(&'a [Q5_0Block]),
    /// `iq4_nl` blocks.
    IQ4_NL(&'a [Iq4NlBlock]),
}

/// The right-operand descriptor.
#[derive(Clone, Copy)]
pub enum BDesc<'a> {
    /// Dense `f32`.
    F32(&'a [f32]),
    /// Dense `f16`, raw bit patterns.
    F16(&'a [u16]),
    /// Dense `bf16`, raw bit patterns.
    Bf16(&'a [u16]),
    /// `q8_0` blocks, the only right-operand encoding the quantised path accepts.
    Q8_0(&'a [Q8_0Block]),
}

/// Validates shared preconditions (spec §4.7 point 1, §7 point 1).
fn check_preconditions(params: &Params<'_>, lda: usize, ldb: usize, ldc: usize, m: usize, k: usize) {
    debug_assert!(params.ith < params.nth, "ith {} >= nth {}", params.ith, params.nth);
    debug_assert!(params.nth > 0, "nth must be positive");
    debug_assert!(lda >= k, "lda {lda} < k {k}");
    debug_assert!(ldb >= k, "ldb {ldb} < k {k}");
    debug_assert!(ldc >= m, "ldc {ldc} < m {m}");
}

/// The single public entry point.
///
/// Returns `true` iff a handwritten kernel ran to completion and `c` is
/// fully written; returns `false` without touching `c` whenever no kernel
/// matches `(a, b, ctype)` and the current compile-time ISA, per the
/// dispatch table in spec §4.7.
#[allow(clippy::too_many_arguments)]
pub fn matmul(
    params: &Params<'_>,
    m: usize,
    n: usize,
    k: usize,
    a: ADesc<'_>,
    lda: usize,
    b: BDesc<'_>,
    ldb: usize,
    c: &mut [f32],
    ldc: usize,
    ctype: DType,
) -> bool {
    // SAFETY: `c` is exclusively borrowed for the duration of this call, and
    // this function itself does not fan out across threads - callers doing
    // their own multithreaded fan-out over a shared buffer go through
    // `matmul_raw` directly.
    unsafe { matmul_raw(params, m, n, k, a, lda, b, ldb, c.as_mut_ptr(), ldc, ctype) }
}

/// Raw-pointer entry point for hosts that call into a shared output buffer
/// from multiple threads concurrently (the concurrency model spec §5
/// assumes).
///
/// # Safety
///
/// `c` must be valid for `ldc * n` `f32` reads and writes for the duration
/// of the call. When multiple threads call this concurrently with the same
/// `params.pool`, `m`, `n`, `k`, `lda`, `ldb`, `ldc`, the partition scheme
/// in [`crate::schedule`] guarantees their writes never overlap; calling it
/// concurrently with inconsistent shape arguments across threads is
/// undefined behaviour.
#[allow(clippy::too_many_arguments)]
pub unsafe fn matmul_raw(
    params: &Params<'_>,
    m: usize,
    n: usize,
    k: usize,
    a: ADesc<'_>,
    lda: usize,
    b: BDesc<'_>,
    ldb: usize,
    c: *mut f32,
    ldc: usize,
    ctype: DType,
) -> bool {
    check_preconditions(params, lda, ldb, ldc, m, k);

    if !simd::has_matrix_hardware() && n < 2 {
        return false;
    }
    if ctype != DType::F32 {
        return false;
    }

    match (a, b) {
        (ADesc::F32(a), BDesc::F32(b)) => {
            run_dense::<Backend, F32Elem, F32Elem>(params, "f32xf32", m, n, k, a, lda, b, ldb, c, ldc)
        }
        (ADesc::Bf16(a), BDesc::Bf16(b)) => {
            if !bf16_capable() {
                return false;
            }
            run_dense::<Backend, Bf16Elem, Bf16Elem>(params, "bf16xbf16", m, n, k, a, lda, b, ldb, c, ldc)
        }
        (ADesc::F16(a), BDesc::F16(b)) => {
            if !f16_capable() {
                return false;
            }
            run_dense::<Backend, F16Elem, F16Elem>(params, "f16xf16", m, n, k, a, lda, b, ldb, c, ldc)
        }
        (ADesc::F16(a), BDesc::F32(b)) => {
            if !cfg!(all(target_arch = "aarch64", feature = "neon")) {
                return false;
            }
            run_dense::<Backend, F16Elem, F32Elem>(params, "f16xf32", m, n, k, a, lda, b, ldb, c, ldc)
        }
        (ADesc::Q8_0(a), BDesc::Q8_0(b)) => {
            run_quant(params, "q8_0xq8_0", m, n, k, a, lda, load_q8, b, ldb, c, ldc)
        }
        (ADesc::Q4_0(a), BDesc::Q8_0(b)) => {
            run_quant(params, "q4_0xq8_0", m, n, k, a, lda, load_q4, b, ldb, c, ldc)
        }
        (ADesc::Q5_0(a), BDesc::Q8_0(b)) => {
            run_quant(params, "q5_0xq8_0", m, n, k, a, lda, load_q5, b, ldb, c, ldc)
        }
        (ADesc::IQ4_NL(a), BDesc::Q8_0(b)) => {
            run_quant(params, "iq4_nlxq8_0", m, n, k, a, lda, load_iq4nl, b, ldb, c, ldc)
        }
        _ => false,
    }
}

/// `true` when the compile-time ISA tier is assumed to carry a usable `f16`
/// conversion path beyond the portable scalar-widen fallback: any enabled
/// SIMD feature, or the x86_64 SSE2 baseline.
fn f16_capable() -> bool {
    simd::has_matrix_hardware() || cfg!(target_arch = "x86_64")
}

/// `true` when the compile-time ISA tier is assumed to carry a usable
/// `bf16` path; same rule as [`f16_capable`].
fn bf16_capable() -> bool {
    f16_capable()
}

/// Runs the dense floating-point path for one `(TA, TB)` element-kind pair.
#[allow(clippy::too_many_arguments)]
fn run_dense<B, TA, TB>(
    params: &Params<'_>,
    kernel: &str,
    m: usize,
    n: usize,
    k: usize,
    a: &[TA::Storage],
    lda: usize,
    b: &[TB::Storage],
    ldb: usize,
    c: *mut f32,
    ldc: usize,
) -> bool
where
    B: VectorOps,
    TA: FloatElem,
    TB: FloatElem,
{
    if k % B::LANES != 0 {
        return false;
    }
    let Some(shape0) = tile_f::select_shape(m, params.nth, simd::vector_register_count()) else {
        return false;
    };
    let rn_final = tile_f::resolve_column_width(shape0.rn, n);
    let shape = TileShape { rn: rn_final, ..shape0 };
    let sched = DenseSchedule::new(m, n, shape, shape.stripe);
    tracing::debug!(
        kernel,
        rm = shape.rm,
        rn = shape.rn,
        bm = shape.bm,
        nb_job = sched.job_count(),
        "dispatching dense matmul"
    );

    let av = MatrixView::new(a, lda);
    let bv = MatrixView::new(b, ldb);
    let full_rn = shape.rn;
    let tail_rn = shape.rn.saturating_sub(1);

    schedule::run_dense(
        params,
        &sched,
        |row, col| dispatch_tile::<B, TA, TB>(full_rn, av, bv, c, ldc, n, k, row, col),
        |row, col| dispatch_tile::<B, TA, TB>(tail_rn, av, bv, c, ldc, n, k, row, col),
    );
    true
}

/// Dispatches one `4 x rn` tile to the matching [`tile_f::gemm_bloc`]
/// monomorphisation. `rn == 0` is a no-op (happens when a stripe has no
/// tail tiles).
#[allow(clippy::too_many_arguments)]
fn dispatch_tile<B, TA, TB>(
    rn: usize,
    av: MatrixView<'_, TA::Storage>,
    bv: MatrixView<'_, TB::Storage>,
    c: *mut f32,
    ldc: usize,
    n: usize,
    k: usize,
    row: usize,
    col: usize,
) where
    B: VectorOps,
    TA: FloatElem,
    TB: FloatElem,
{
    if rn == 0 {
        return;
    }
    // SAFETY: the partitioner in `schedule::run_dense` guarantees distinct
    // `(row, col)` tiles across all workers never overlap; `c` is valid for
    // `ldc * n` elements per `matmul_raw`'s contract.
    let mut cv = unsafe { MatrixViewMut::from_raw(c, ldc * n, ldc) };
    macro_rules! dispatch_rn {
        ($($w:literal),*) => {
            match rn {
                $($w => tile_f::gemm_bloc::<B, TA, TB, 4, $w>(&av, &bv, &mut cv, k, row, col),)*
                other => unreachable!("unsupported RN {other} reached the tile dispatcher"),
            }
        };
    }
    dispatch_rn!(1, 2, 3, 4, 5, 6)
}

/// Runs the quantised path for one left-operand block type.
///
/// Dispatches each resolved `(mc, nc)` tile from [`tile_q::mnpack`] into the
/// matching [`tile_q::gemm`] monomorphisation - the 4-wide-fast variants when
/// one dimension is exactly 4, the generic kernel otherwise - so the per-cell
/// delta-rescale-and-dot math lives in exactly one place.
#[allow(clippy::too_many_arguments)]
fn run_quant<T>(
    params: &Params<'_>,
    kernel: &str,
    m: usize,
    n: usize,
    k: usize,
    a_blocks: &[T],
    lda_blocks: usize,
    decode_a: impl Fn(&T) -> [i8; 32] + Copy,
    b_blocks: &[Q8_0Block],
    ldb_blocks: usize,
    c: *mut f32,
    ldc: usize,
) -> bool
where
    T: HasDelta,
{
    if k % 32 != 0 {
        return false;
    }
    let nb = k / 32;
    let sched = FlatSchedule::new(m, n);
    tracing::debug!(kernel, nb_job = sched.tile_count(), "dispatching quantised matmul");
    sched.run(params.ith, params.nth, |m0, m1, n0, n1| {
        tile_q::mnpack(m0, m1, n0, n1, simd::vector_register_count(), &mut |ii, jj, mc, nc| {
            // SAFETY: see `dispatch_tile`; regions assigned by `FlatSchedule`
            // never overlap across workers.
            let mut cv = unsafe { MatrixViewMut::from_raw(c, ldc * n, ldc) };
            match (mc, nc) {
                (4, rn) => tile_q::gemm4x_n(a_blocks, lda_blocks, decode_a, b_blocks, ldb_blocks, &mut cv, nb, ii, jj, rn),
                (rm, 4) => tile_q::gemm_mx4(a_blocks, lda_blocks, decode_a, b_blocks, ldb_blocks, &mut cv, nb, ii, jj, rm),
                (rm, rn) => tile_q::gemm(a_blocks, lda_blocks, decode_a, b_blocks, ldb_blocks, &mut cv, nb, ii, jj, rm, rn),
            }
        });
    });
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threadpool::StdThreadPool;
    use half::f16;

    #[test]
    fn scenario_f32_ones_times_ones() {
        let pool = StdThreadPool::new(1);
        let a = vec![1.0f32; 16 * 16];
        let b = vec![1.0f32; 16 * 16];
        let mut c = vec![0.0f32; 16 * 16];
        let ran = matmul(
            &pool.params(0),
            16, 16, 16,
            ADesc::F32(&a), 16,
            BDesc::F32(&b), 16,
            &mut c, 16,
            DType::F32,
        );
        assert!(ran);
        assert!(c.iter().all(|&v| (v - 16.0).abs() < 1e-3));
    }

    #[test]
    fn scenario_q4_times_q8() {
        // Spec §8 scenario 4: m=4,n=4,k=64 (2 blocks), A nibbles all 0xFF
        // (decode -> +7), A delta=1.0; B payload all +1, B delta=1.0 ->
        // every C[i][j] = 64 * 7 = 448.
        let a_delta = f16::from_f32(1.0).to_bits();
        let a_blocks = vec![
            Q4_0Block { delta: a_delta, qs: [0xFF; 16] };
            4 * 2
        ];
        let b_delta = f16::from_f32(1.0).to_bits();
        let b_blocks = vec![Q8_0Block { delta: b_delta, qs: [1; 32] }; 4 * 2];
        let mut c = vec![0.0f32; 16];
        let pool = StdThreadPool::new(1);
        let ran = matmul(
            &pool.params(0),
            4, 4, 64,
            ADesc::Q4_0(&a_blocks), 2,
            BDesc::Q8_0(&b_blocks), 2,
            &mut c, 4,
            DType::F32,
        );
        assert!(ran);
        assert!(c.iter().all(|&v| (v - 448.0).abs() < 1e-2));
    }

    #[test]
    fn dispatcher_rejects_non_f32_output() {
        let pool = StdThreadPool::new(1);
        let a = vec![1.0f32; 16];
        let b = vec![1.0f32; 16];
        let mut c = vec![0.0f32; 16];
        let ran = matmul(
            &pool.params(0),
            4, 4, 4,
            ADesc::F32(&a), 4,
            BDesc::F32(&b), 4,
            &mut c, 4,
            DType::F16,
        );
        assert!(!ran);
        assert!(c.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn dispatcher_rejects_unsupported_dtype_pair() {
        let pool = StdThreadPool::new(1);
        let a = vec![1.0f32; 16];
        let b_blocks = vec![Q8_0Block { delta: 0, qs: [0; 32] }; 1];
        let mut c = vec![0.0f32; 16];
        let ran = matmul(
            &pool.params(0),
            4, 4, 4,
            ADesc::F32(&a), 4,
            BDesc::Q8_0(&b_blocks), 1,
            &mut c, 4,
            DType::F32,
        );
        assert!(!ran);
    }
}
