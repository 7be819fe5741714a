#![forbid(unsafe_op_in_unsafe_fn)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `matmul` is a multithreaded, cache-resident CPU matrix-multiplication core
//! specialised for the transposed-left-operand layout `C = A^T . B` used in
//! transformer inference. It accepts dense `f32`/`f16`/`bf16` operands and
//! block-quantised `q8_0`/`q4_0`/`q5_0`/`iq4_nl` left operands paired with a
//! `q8_0` right operand. Output is always `f32`.
//!
//! # Design
//!
//! - [`dtype`] holds the matrix/block data model: [`dtype::MatrixView`],
//!   the quantised block layouts, and the `f16`/`bf16` widening helpers.
//! - [`simd`] is the arithmetic vocabulary: one [`simd::VectorOps`]
//!   implementation per (ISA, vector width), selected entirely at compile
//!   time through Cargo features, never through runtime CPU probing.
//! - [`quant`] holds the quantised block decoders and the `updot` u8xi8 dot
//!   primitive, tiered from a dedicated VNNI instruction down to a scalar
//!   fallback.
//! - [`tile_f`] and [`tile_q`] are the register-tiled inner kernels for the
//!   dense and quantised paths respectively.
//! - [`schedule`] is the two-level work partitioner (dense path) and the flat
//!   partitioner (quantised path) that map an `(M, N)` output grid onto a
//!   fixed worker pool.
//! - [`threadpool`] defines the `barrier` / `chunk_set` / `chunk_add` contract
//!   this crate expects from its host, plus a `std`-backed reference
//!   implementation used by this crate's own tests and benchmarks.
//! - [`dispatch`] is the single public entry point, [`matmul`], that ties the
//!   above together.
//!
//! # Invariants
//!
//! - The core never allocates on the hot path: kernel accumulators are
//!   stack-resident arrays, sized by const generics at monomorphisation time.
//! - [`matmul`] returns `false` rather than erroring whenever no handwritten
//!   kernel matches the requested shape/dtype/ISA combination; callers must
//!   run a generic fallback themselves. A `false` return never writes to `C`.
//! - ISA tier selection is a compile-time choice (Cargo feature + matching
//!   `-C target-feature`/`target-cpu` build flag), not a runtime probe.
//!
//! # Errors
//!
//! There is no recoverable runtime error surface. Precondition violations
//! (bad shapes, `ith >= nth`, aliasing) are caller bugs surfaced as debug
//! assertions; unsupported configurations are reported as a `false` return
//! from [`matmul`].
//!
//! # Examples
//!
//! ```
//! use matmul::{dispatch, dtype::DType, threadpool::StdThreadPool};
//!
//! let pool = StdThreadPool::new(1);
//! let a = vec![1.0f32; 16 * 16];
//! let b = vec![1.0f32; 16 * 16];
//! let mut c = vec![0.0f32; 16 * 16];
//!
//! let ran = dispatch::matmul(
//!     &pool.params(0),
//!     16, 16, 16,
//!     dispatch::ADesc::F32(&a), 16,
//!     dispatch::BDesc::F32(&b), 16,
//!     &mut c, 16,
//!     DType::F32,
//! );
//! assert!(ran);
//! assert!(c.iter().all(|&v| (v - 16.0).abs() < 1e-3));
//! ```

pub mod dispatch;
pub mod dtype;
pub mod quant;
pub mod schedule;
pub mod simd;
pub mod threadpool;
pub mod tile_f;
pub mod tile_q;

pub use dispatch::matmul;
