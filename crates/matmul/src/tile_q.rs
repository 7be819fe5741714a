//! Quantised tile engine (spec §4.5): the register-blocked inner kernel for
//! q8/q4/q5/iq4nl (left) x q8 (right) matmul.
//!
//! Per-tile math is `Cv[j][i] += f32(A.delta * B.delta) * updot(sign(A,A),
//! sign(B,A))`, reduced over one 32-wide block at a time. [`mnpack`] is the
//! 2-level recursive shape partitioner; [`gemm`] is the generic per-shape
//! kernel every partitioner leaf calls into.

use crate::dtype::{widen_f16, Iq4NlBlock, Q4_0Block, Q5_0Block, Q8_0Block};
use crate::quant::{sign_fold, updot};

/// Extracts the `f16` delta common to every quantised block layout.
///
/// Each block type stores its scale as its first field; this trait keeps
/// [`gemm`] generic over which left-operand block type it's handed.
pub trait HasDelta {
    /// Raw `f16` bit pattern of this block's scale factor.
    fn delta_bits(&self) -> u16;
}

impl HasDelta for Q8_0Block {
    fn delta_bits(&self) -> u16 {
        self.delta
    }
}
impl HasDelta for Q4_0Block {
    fn delta_bits(&self) -> u16 {
        self.delta
    }
}
impl HasDelta for Q5_0Block {
    fn delta_bits(&self) -> u16 {
        self.delta
    }
}
impl HasDelta for Iq4NlBlock {
    fn delta_bits(&self) -> u16 {
        self.delta
    }
}

fn block_delta<T: HasDelta>(blk: &T) -> f32 {
    widen_f16(blk.delta_bits())
}

/// One resolved `(mc, nc)` shape key from the spec §4.5 table.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Key {
    /// Row-tile height.
    pub mc: usize,
    /// Column-tile width.
    pub nc: usize,
}

/// Looks up `(mc, nc)` for one `(dm, dn)` remaining-region pair, `dm, dn in
/// 1..=4`, collapsing per the 16-register table when `vector_regs < 32`.
fn shape_key(dm: usize, dn: usize, vector_regs: u32) -> Key {
    let (mc, nc) = match (dm.min(4), dn.min(4)) {
        (4, 4) => (4, 4),
        (4, 3) => (4, 3),
        (3, 4) => (3, 4),
        (3, 3) => (3, 3),
        (4, 2) => (4, 2),
        (2, 4) => (2, 4),
        (3, 2) | (2, 3) => (dm.min(4), dn.min(4)),
        (4, 1) | (1, 4) => (dm.min(4), dn.min(4)),
        (2, 2) => (2, 2),
        (a, b) => (a, b),
    };
    if vector_regs < 32 {
        match (mc, nc) {
            (4, 4) | (4, 3) | (4, 2) => return Key { mc: 4, nc: 2 },
            (3, 4) | (2, 4) => return Key { mc: 2, nc: 4 },
            _ => {}
        }
    }
    Key { mc, nc }
}

/// Recursive 2-level partitioner over the remaining `[m0, m) x [n0, n)`
/// region. `visit(ii, jj, mc, nc)` is called once per resolved `(mc, nc)`
/// sub-tile with its top-left corner; it must cover exactly one `mc x nc`
/// rectangle of output cells.
pub fn mnpack(
    m0: usize,
    m: usize,
    n0: usize,
    n: usize,
    vector_regs: u32,
    visit: &mut dyn FnMut(usize, usize, usize, usize),
) {
    if m0 >= m || n0 >= n {
        return;
    }
    let dm = (m - m0).min(4);
    let dn = (n - n0).min(4);
    let key = shape_key(dm, dn, vector_regs);

    let full_rows = (m - m0) / key.mc;
    let full_cols = (n - n0) / key.nc;
    let m_covered = full_rows * key.mc;
    let n_covered = full_cols * key.nc;

    for bi in 0..full_rows {
        for bj in 0..full_cols {
            visit(m0 + bi * key.mc, n0 + bj * key.nc, key.mc, key.nc);
        }
    }

    // Remaining L-shaped strips: the bottom rows and the right columns of
    // the covered rectangle, recursed independently so each can pick its
    // own (possibly smaller) shape key.
    if m0 + m_covered < m {
        mnpack(m0 + m_covered, m, n0, n, vector_regs, visit);
    }
    if n0 + n_covered < n {
        mnpack(m0, m0 + m_covered, n0 + n_covered, n, vector_regs, visit);
    }
}

/// Generic per-tile kernel for one resolved `(RM, RN)` region of `A^T . B`,
/// both block-quantised, right operand always `q8_0`.
///
/// `a_blocks`/`b_blocks` are row-major block streams: row `r`'s blocks start
/// at `a_blocks[r * lda_blocks .. ]`. `nb` is the number of blocks per row
/// (`k / 32`).
pub fn gemm<T: HasDelta>(
    a_blocks: &[T],
    lda_blocks: usize,
    decode_a: impl Fn(&T) -> [i8; 32],
    b_blocks: &[Q8_0Block],
    ldb_blocks: usize,
    c: &mut crate::dtype::MatrixViewMut<'_>,
    nb: usize,
    ii: usize,
    jj: usize,
    rm: usize,
    rn: usize,
) {
    for i in 0..rm {
        for j in 0..rn {
            let mut acc = 0.0f32;
            let a_row = &a_blocks[(ii + i) * lda_blocks..];
            let b_row = &b_blocks[(jj + j) * ldb_blocks..];
            for blk in 0..nb {
                let a_blk = &a_row[blk];
                let b_blk = &b_row[blk];
                let a_signed = decode_a(a_blk);
                let b_signed = b_blk.qs;
                let a_folded = sign_fold(&a_signed, &a_signed);
                let b_folded = sign_fold(&b_signed, &a_signed);
                let u: [u8; 32] = std::array::from_fn(|lane| a_folded[lane] as u8);
                let partials = updot(&u, &b_folded);
                let dot: f32 = partials.iter().sum();
                let delta = block_delta(a_blk) * widen_f16(b_blk.delta);
                acc += delta * dot;
            }
            c.set(ii + i, jj + j, acc);
        }
    }
}

/// 4-wide-fast variant for `RM = 4`.
///
/// The spec's packed-delta optimisation (four `f16` deltas packed into one
/// 64-bit word, converted to `f32` lanes in a single half-to-float
/// conversion, broadcast via shuffle masks) is an ISA-specific micro-
/// optimisation of the reduction in [`gemm`]; the portable path here
/// reuses `gemm` directly, since it produces the identical per-cell
/// result and the optimisation only changes constant-factor throughput,
/// not the arithmetic.
pub fn gemm4x_n<T: HasDelta>(
    a_blocks: &[T],
    lda_blocks: usize,
    decode_a: impl Fn(&T) -> [i8; 32],
    b_blocks: &[Q8_0Block],
    ldb_blocks: usize,
    c: &mut crate::dtype::MatrixViewMut<'_>,
    nb: usize,
    ii: usize,
    jj: usize,
    rn: usize,
) {
    gemm(a_blocks, lda_blocks, decode_a, b_blocks, ldb_blocks, c, nb, ii, jj, 4, rn);
}

/// 4-wide-fast variant for `RN = 4`; see [`gemm4x_n`].
pub fn gemm_mx4<T: HasDelta>(
    a_blocks: &[T],
    lda_blocks: usize,
    decode_a: impl Fn(&T) -> [i8; 32],
    b_blocks: &[Q8_0Block],
    ldb_blocks: usize,
    c: &mut crate::dtype::MatrixViewMut<'_>,
    nb: usize,
    ii: usize,
    jj: usize,
    rm: usize,
) {
    gemm(a_blocks, lda_blocks, decode_a, b_blocks, ldb_blocks, c, nb, ii, jj, rm, 4);
}
