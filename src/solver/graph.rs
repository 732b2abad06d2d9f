// src/solver/graph.rs - bucketed graph store and parallel edge generation

//! Bucketed graph store and the two graph-construction stages.
//!
//! Edges live in an `nx * nx` matrix of growable buckets addressed by the
//! high bits of one endpoint. The matrix is a flat arena with an explicit
//! row orientation: transposing swaps bucket headers only, so every trim
//! round can hand each worker a contiguous run of rows and stay lock-free.

use std::mem;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crate::params::Params;
use crate::siphash::{SipHasher, PRF_BATCH};

use super::Cuckoo;

/// Flat `nx * nx` matrix of edge buckets.
///
/// When `u_major` is set, `bucket(a, b)` holds edges whose near endpoint has
/// X coordinate `a` and whose far endpoint has X coordinate `b`; transposed
/// otherwise. Every packed word carries the far endpoint in its high 32 bits
/// and the near endpoint (or, during generation, the nonce) in the low 32.
pub(crate) struct Matrix {
    nx: usize,
    u_major: bool,
    buckets: Vec<Vec<u64>>,
}

impl Matrix {
    pub(crate) fn new(nx: usize, capacity: usize) -> Self {
        Matrix {
            nx,
            u_major: true,
            buckets: (0..nx * nx).map(|_| Vec::with_capacity(capacity)).collect(),
        }
    }

    pub(crate) fn bucket(&self, r: usize, c: usize) -> &[u64] {
        &self.buckets[r * self.nx + c]
    }

    pub(crate) fn bucket_mut(&mut self, r: usize, c: usize) -> &mut Vec<u64> {
        &mut self.buckets[r * self.nx + c]
    }

    /// All buckets, row-major in the current orientation.
    pub(crate) fn buckets_mut(&mut self) -> &mut [Vec<u64>] {
        &mut self.buckets
    }

    /// Truncates every bucket and resets the orientation.
    pub(crate) fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.u_major = true;
    }

    /// Makes the row index the U-side X coordinate (`u_major = true`) or
    /// the V-side one, transposing in place if needed. Only bucket headers
    /// move; contents are untouched.
    pub(crate) fn ensure_major(&mut self, u_major: bool) {
        if self.u_major == u_major {
            return;
        }
        for a in 0..self.nx {
            for b in a + 1..self.nx {
                self.buckets.swap(a * self.nx + b, b * self.nx + a);
            }
        }
        self.u_major = u_major;
    }

    pub(crate) fn is_u_major(&self) -> bool {
        self.u_major
    }

    pub(crate) fn live_edges(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }
}

/// Per-worker re-bucketing scratch: one group per Y value plus a row of
/// output buckets and a small degree histogram.
pub(crate) struct Scratch {
    /// Edges grouped by the near endpoint's Y bits.
    pub(crate) groups: Vec<Vec<u64>>,
    /// Replacement row built during `build_v`.
    pub(crate) tmp: Vec<Vec<u64>>,
    /// Degree histogram over the near endpoint's Z bits.
    pub(crate) cnt: Vec<u8>,
}

impl Scratch {
    pub(crate) fn new(params: &Params) -> Self {
        Scratch {
            groups: (0..params.nx)
                .map(|_| Vec::with_capacity(params.big_eps))
                .collect(),
            tmp: (0..params.nx)
                .map(|_| Vec::with_capacity(params.big_eps))
                .collect(),
            cnt: vec![0; params.nz],
        }
    }

    pub(crate) fn clear(&mut self) {
        for group in &mut self.groups {
            group.clear();
        }
        for bucket in &mut self.tmp {
            bucket.clear();
        }
    }
}

/// Splits `0..total` into `parts` contiguous ranges; the last range absorbs
/// the remainder. Ranges may be empty when `parts > total`.
pub(crate) fn partition(total: usize, parts: usize) -> Vec<Range<usize>> {
    let steps = total / parts;
    (0..parts)
        .map(|j| {
            let start = j * steps;
            let end = if j == parts - 1 { total } else { (j + 1) * steps };
            start..end
        })
        .collect()
}

impl Cuckoo {
    /// Enumerates all `easiness` candidate edges and buckets them by the
    /// U endpoint's coordinates. Workers own disjoint nonce ranges and
    /// write to private shards, merged afterwards in worker order so bucket
    /// contents end up in ascending nonce order regardless of parallelism.
    pub(crate) fn build_u(&mut self) {
        let p = self.params;
        let sip = self.sip;
        let stop = self.stop.as_ref();
        let ranges = partition(p.easiness as usize, self.ncpu);
        for shard in &mut self.shards {
            shard.clear();
        }
        thread::scope(|s| {
            for (shard, range) in self.shards.iter_mut().zip(ranges) {
                if range.is_empty() {
                    continue;
                }
                s.spawn(move || build_u_range(&p, &sip, stop, range, shard));
            }
        });
        for shard in &mut self.shards {
            for i in 0..shard.buckets.len() {
                self.matrix.buckets[i].append(&mut shard.buckets[i]);
            }
        }
        self.matrix.u_major = true;
    }

    /// Derives the V endpoint of every edge that survives the same-block
    /// collision check, rewriting each row keyed by the V-side X
    /// coordinate. Rows are independent, so workers take disjoint row
    /// ranges with private scratch.
    pub(crate) fn build_v(&mut self) {
        let p = self.params;
        let sip = self.sip;
        let stop = self.stop.as_ref();
        debug_assert!(self.matrix.is_u_major());
        let ranges = partition(p.nx, self.ncpu);
        thread::scope(|s| {
            let mut rest = self.matrix.buckets.as_mut_slice();
            for (range, scratch) in ranges.iter().zip(self.scratch.iter_mut()) {
                let take = (range.end - range.start) * p.nx;
                let (rows, tail) = rest.split_at_mut(take);
                rest = tail;
                if rows.is_empty() {
                    continue;
                }
                s.spawn(move || build_v_rows(&p, &sip, stop, rows, scratch));
            }
        });
    }
}

fn build_u_range(
    p: &Params,
    sip: &SipHasher,
    stop: &AtomicBool,
    range: Range<usize>,
    shard: &mut Matrix,
) {
    let mut nodes = vec![0u64; PRF_BATCH];
    let mut nonce = range.start as u64;
    let end = range.end as u64;
    while nonce < end {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        let take = ((end - nonce) as usize).min(PRF_BATCH);
        sip.hash_seq(nonce, 0, &mut nodes[..take]);
        for (i, &hash) in nodes[..take].iter().enumerate() {
            let u = hash & p.edge_mask;
            // Endpoint 0 is reserved as "absent" in the adjacency table.
            if u == 0 {
                continue;
            }
            let ux = ((u >> (p.edge_bits - p.x_bits)) & p.x_mask) as usize;
            let uy = ((u >> (p.edge_bits - 2 * p.x_bits)) & p.x_mask) as usize;
            shard
                .bucket_mut(ux, uy)
                .push(((nonce + i as u64) << 32) | u);
        }
        nonce += take as u64;
    }
}

fn build_v_rows(
    p: &Params,
    sip: &SipHasher,
    stop: &AtomicBool,
    rows: &mut [Vec<u64>],
    scratch: &mut Scratch,
) {
    let mut nonces: Vec<u64> = Vec::with_capacity(PRF_BATCH);
    let mut us: Vec<u64> = Vec::with_capacity(PRF_BATCH);
    let mut nodes = vec![0u64; PRF_BATCH];
    for row in rows.chunks_mut(p.nx) {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        for bucket in scratch.tmp.iter_mut() {
            bucket.clear();
        }
        nonces.clear();
        us.clear();
        for bucket in row.iter() {
            let cnt = &mut scratch.cnt;
            cnt.fill(0);
            for &nu in bucket {
                let z = (nu & p.z_mask) as usize;
                cnt[z] = cnt[z].saturating_add(1);
            }
            for &nu in bucket {
                // A unique Z within this bucket is a leaf on the U side
                // already; drop it before ever deriving its V endpoint.
                if cnt[(nu & p.z_mask) as usize] == 1 {
                    continue;
                }
                nonces.push(nu >> 32);
                us.push(nu << 32);
                if nonces.len() == PRF_BATCH {
                    flush_v(p, sip, &mut nonces, &mut us, &mut nodes, &mut scratch.tmp);
                }
            }
        }
        flush_v(p, sip, &mut nonces, &mut us, &mut nodes, &mut scratch.tmp);
        for (bucket, fresh) in row.iter_mut().zip(scratch.tmp.iter_mut()) {
            mem::swap(bucket, fresh);
            fresh.clear();
        }
    }
}

fn flush_v(
    p: &Params,
    sip: &SipHasher,
    nonces: &mut Vec<u64>,
    us: &mut Vec<u64>,
    nodes: &mut [u64],
    tmp: &mut [Vec<u64>],
) {
    let n = nonces.len();
    sip.hash_many(nonces, 1, &mut nodes[..n]);
    for i in 0..n {
        let v = nodes[i] & p.edge_mask;
        let vx = ((v >> (p.edge_bits - p.x_bits)) & p.x_mask) as usize;
        tmp[vx].push(us[i] | v);
    }
    nonces.clear();
    us.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE_KEY: [u8; 16] = [
        101, 230, 247, 169, 126, 136, 45, 25, 128, 175, 81, 243, 52, 69, 208, 99,
    ];

    fn test_params() -> Params {
        Params::new(12, 8, 2).unwrap()
    }

    #[test]
    fn partition_covers_the_range() {
        let ranges = partition(100, 8);
        assert_eq!(ranges.len(), 8);
        assert_eq!(ranges[0], 0..12);
        // The last range absorbs the remainder.
        assert_eq!(ranges[7], 84..100);
        let total: usize = ranges.iter().map(|r| r.end - r.start).sum();
        assert_eq!(total, 100);

        // More parts than work: only the last range is non-empty.
        let tiny = partition(4, 8);
        assert!(tiny[..7].iter().all(|r| r.is_empty()));
        assert_eq!(tiny[7], 0..4);
    }

    #[test]
    fn transpose_swaps_headers() {
        let mut m = Matrix::new(4, 4);
        m.bucket_mut(1, 3).push(42);
        m.bucket_mut(2, 0).push(7);
        m.ensure_major(false);
        assert_eq!(m.bucket(3, 1), &[42]);
        assert_eq!(m.bucket(0, 2), &[7]);
        assert!(m.bucket(1, 3).is_empty());
        m.ensure_major(true);
        assert_eq!(m.bucket(1, 3), &[42]);
        assert_eq!(m.live_edges(), 2);
    }

    #[test]
    fn build_u_buckets_every_nonzero_edge() {
        let p = test_params();
        let mut cuckoo = Cuckoo::new(p);
        cuckoo.prepare(&FIXTURE_KEY);
        cuckoo.build_u();
        // Two of the 4096 candidate edges hash to the reserved endpoint 0.
        assert_eq!(cuckoo.matrix.live_edges(), 4094);
    }

    #[test]
    fn build_v_drops_same_block_singletons() {
        let p = test_params();
        let mut cuckoo = Cuckoo::new(p);
        cuckoo.prepare(&FIXTURE_KEY);
        cuckoo.build_u();
        cuckoo.build_v();
        assert_eq!(cuckoo.matrix.live_edges(), 2603);
    }

    #[test]
    fn build_is_worker_count_independent() {
        let p = test_params();
        let mut single = Cuckoo::with_workers(p, 1);
        let mut wide = Cuckoo::with_workers(p, 7);
        for c in [&mut single, &mut wide] {
            c.prepare(&FIXTURE_KEY);
            c.build_u();
            c.build_v();
        }
        for x in 0..p.nx {
            for y in 0..p.nx {
                assert_eq!(single.matrix.bucket(x, y), wide.matrix.bucket(x, y));
            }
        }
    }
}
