//! Work partitioner & scheduler (spec §4.6): two-level tiling with dynamic
//! tail balancing for the dense floating-point path, and a flat duty-cycle
//! partitioner for the quantised path.

use crate::threadpool::Params;
use crate::tile_f::TileShape;

/// Base tile granularity the quantised flat scheduler divides the output
/// grid into before handing each worker's region to
/// [`crate::tile_q::mnpack`].
const QUANT_BASE_TILE: usize = 4;

/// Translates tile-position `p` (an index into the `xtiles` column-tile
/// sequence) into the real column offset, accounting for the boundary
/// between full-`RN` tiles and the `RN - 1`-wide tail tiles.
fn tile_col_offset(p: usize, jj_rn: usize, rn: usize) -> usize {
    if p <= jj_rn {
        p * rn
    } else {
        jj_rn * rn + (p - jj_rn) * (rn - 1)
    }
}

/// Precomputed two-level schedule for the dense floating-point path.
pub struct DenseSchedule {
    ytiles: usize,
    xtiles: usize,
    jj_rn: usize,
    nb_bn: usize,
    jj_bn: usize,
    size_bn: usize,
    nb_job: usize,
    shape: TileShape,
}

impl DenseSchedule {
    /// Builds the schedule for an `m x n` output grid under tile `shape`,
    /// grouping column-tiles into stripes targeting width `bn`.
    ///
    /// # Panics
    ///
    /// Panics if `m` is not an exact multiple of `shape.rm * shape.bm`
    /// (the dense engine's preflight guarantees this before scheduling).
    #[must_use]
    pub fn new(m: usize, n: usize, shape: TileShape, bn: usize) -> Self {
        assert!(
            m % (shape.rm * shape.bm) == 0,
            "m={m} not a multiple of rm*bm={}",
            shape.rm * shape.bm
        );
        let ytiles = m / (shape.rm * shape.bm);
        let xtiles = n.div_ceil(shape.rn);
        let jj_rn = xtiles - (xtiles * shape.rn - n);
        let nb_bn = ((xtiles as f64 / bn as f64).round() as usize).max(1);
        let size_bn = xtiles.div_ceil(nb_bn);
        let jj_bn = nb_bn - (nb_bn * size_bn - xtiles);
        let nb_job = ytiles * nb_bn;
        Self {
            ytiles,
            xtiles,
            jj_rn,
            nb_bn,
            jj_bn,
            size_bn,
            nb_job,
            shape,
        }
    }

    /// Total number of jobs (`ytiles * NB_BN`).
    #[must_use]
    pub fn job_count(&self) -> usize {
        self.nb_job
    }

    fn job_to_stripe(&self, job: usize) -> (usize, usize, usize) {
        let ii = (job % self.ytiles) * self.shape.rm * self.shape.bm;
        let jb = job / self.ytiles;
        let (jr0, jr_n) = if jb < self.jj_bn {
            (jb * self.size_bn, (jb + 1) * self.size_bn)
        } else {
            let base = self.jj_bn * self.size_bn;
            let rest = jb - self.jj_bn;
            (
                base + rest * (self.size_bn - 1),
                base + (rest + 1) * (self.size_bn - 1),
            )
        };
        (ii, jr0, jr_n.min(self.xtiles))
    }
}

/// Drives the dense two-level schedule to completion for one worker.
///
/// `full_tile(row, col)` is called for every `RN`-wide tile; `tail_tile`
/// for every `RN - 1`-wide tail tile at the right edge of `n`. Both
/// callbacks receive the real `(row, col)` output-cell offset, not a tile
/// index.
pub fn run_dense(
    params: &Params<'_>,
    sched: &DenseSchedule,
    mut full_tile: impl FnMut(usize, usize),
    mut tail_tile: impl FnMut(usize, usize),
) {
    if params.ith == 0 {
        params.pool.chunk_set(params.nth);
    }
    params.pool.barrier();

    let mut job = params.ith;
    while job < sched.nb_job {
        let (ii, jr0, jr_n) = sched.job_to_stripe(job);
        tracing::trace!(job, ii, jr0, jr_n, "decoded dense job");
        for bi in 0..sched.shape.bm {
            let row = ii + bi * sched.shape.rm;
            let mut p = jr0;
            while p < jr_n {
                let jj = tile_col_offset(p, sched.jj_rn, sched.shape.rn);
                if p < sched.jj_rn {
                    full_tile(row, jj);
                } else {
                    tail_tile(row, jj);
                }
                p += 1;
            }
        }
        job = params.pool.chunk_add(1);
    }

    params.pool.barrier();
}

/// Flat, barrier-free partitioner for the quantised path: each worker
/// claims a contiguous range of `QUANT_BASE_TILE x QUANT_BASE_TILE` output
/// regions by duty cycle, with no shared counter and no synchronisation.
pub struct FlatSchedule {
    ytiles: usize,
    xtiles: usize,
    m: usize,
    n: usize,
}

impl FlatSchedule {
    /// Builds the flat schedule for an `m x n` output grid.
    #[must_use]
    pub fn new(m: usize, n: usize) -> Self {
        Self {
            ytiles: m.div_ceil(QUANT_BASE_TILE),
            xtiles: n.div_ceil(QUANT_BASE_TILE),
            m,
            n,
        }
    }

    /// Total number of base regions.
    #[must_use]
    pub fn tile_count(&self) -> usize {
        self.ytiles * self.xtiles
    }

    /// Runs `region(m0, m1, n0, n1)` once for every base region this worker
    /// owns. Imbalance across workers when `tile_count()` doesn't divide
    /// `nth` evenly is accepted: block decoding dominates the per-tile cost.
    pub fn run(&self, ith: usize, nth: usize, mut region: impl FnMut(usize, usize, usize, usize)) {
        let tiles = self.tile_count();
        if tiles == 0 {
            return;
        }
        let duty = tiles.div_ceil(nth);
        let start = (duty * ith).min(tiles);
        let end = (start + duty).min(tiles);
        for id in start..end {
            let row = id % self.ytiles;
            let col = id / self.ytiles;
            let m0 = row * QUANT_BASE_TILE;
            let n0 = col * QUANT_BASE_TILE;
            let m1 = (m0 + QUANT_BASE_TILE).min(self.m);
            let n1 = (n0 + QUANT_BASE_TILE).min(self.n);
            region(m0, m1, n0, n1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threadpool::StdThreadPool;
    use std::sync::{Arc, Mutex};

    #[test]
    fn tile_col_offset_matches_full_then_tail_layout() {
        // rn=4, jj_rn=2 full tiles then tail tiles of width 3.
        assert_eq!(tile_col_offset(0, 2, 4), 0);
        assert_eq!(tile_col_offset(1, 2, 4), 4);
        assert_eq!(tile_col_offset(2, 2, 4), 8);
        assert_eq!(tile_col_offset(3, 2, 4), 11);
    }

    #[test]
    fn dense_schedule_partition_coverage() {
        let shape = TileShape { rm: 4, rn: 3, bm: 1, stripe: 24 };
        let m = 8;
        let n = 10;
        let sched = DenseSchedule::new(m, n, shape, 24);
        let pool = StdThreadPool::new(2);
        let covered = Arc::new(Mutex::new(vec![vec![false; n]; m]));

        pool.scoped(|ith| {
            let params = pool.params(ith);
            let covered = Arc::clone(&covered);
            run_dense(
                &params,
                &sched,
                |row, col| {
                    let mut grid = covered.lock().unwrap();
                    for i in row..row + shape.rm {
                        grid[i][col] = true;
                    }
                },
                |row, col| {
                    let mut grid = covered.lock().unwrap();
                    for i in row..row + shape.rm {
                        grid[i][col] = true;
                    }
                },
            );
        });

        let grid = covered.lock().unwrap();
        assert!(grid.iter().all(|row| row.iter().all(|&v| v)));
    }

    #[test]
    fn flat_schedule_covers_every_region_exactly_once() {
        let sched = FlatSchedule::new(9, 9);
        let mut seen = vec![false; sched.tile_count()];
        for ith in 0..3 {
            let ytiles = sched.ytiles;
            sched.run(ith, 3, |m0, _m1, n0, _n1| {
                let row = m0 / QUANT_BASE_TILE;
                let col = n0 / QUANT_BASE_TILE;
                let id = col * ytiles + row;
                assert!(!seen[id], "region {id} visited twice");
                seen[id] = true;
            });
        }
        assert!(seen.iter().all(|&v| v));
    }
}
