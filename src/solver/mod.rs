// src/solver/mod.rs - Cuckoo Cycle solver: graph build, trim, cycle search

//! Multi-threaded Cuckoo Cycle solver.
//!
//! A [`Cuckoo`] owns every buffer one solve attempt needs: the bucketed
//! graph store, per-worker shards and scratch, the adjacency table and the
//! path buffers. Buffers are allocated once and reset by truncation, so a
//! miner can call [`Cuckoo::solve`] in a tight loop without reallocating.
//!
//! A solve runs four fork-join stages over a fixed worker pool: edge
//! generation by nonce range, V-side bucketing by row range, the trimming
//! rounds, and nonce recovery once a cycle is found. Stages never overlap;
//! the renaming passes between trim phases are single-threaded because they
//! need a globally consistent id space.

mod graph;
mod trim;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::{debug, info, warn};

use crate::params::Params;
use crate::siphash::{SipHasher, PRF_BATCH};

use graph::{partition, Matrix, Scratch};

/// Cap on the worker pool, bounding per-worker buffer memory.
pub const MAX_WORKERS: usize = 32;

/// Reusable solver state for one Cuckoo Cycle instance.
///
/// One `Cuckoo` serves one solve at a time; concurrent mining attempts need
/// independent instances. [`verify`](crate::verify::verify) has no such
/// restriction.
pub struct Cuckoo {
    params: Params,
    ncpu: usize,
    sip: SipHasher,
    /// Bucketed graph store, an nx * nx matrix of packed edge words.
    matrix: Matrix,
    /// Per-worker output shards, used only while generating edges.
    shards: Vec<Matrix>,
    /// Per-worker re-bucketing scratch.
    scratch: Vec<Scratch>,
    /// Adjacency table: compressed node id -> most recently seen partner.
    cuckoo: Vec<u32>,
    us: Vec<u32>,
    vs: Vec<u32>,
    /// Histogram for the renaming passes; count values at or above
    /// `RENAME_MARK` double as "already renamed" entries.
    rename_cnt: Vec<u16>,
    trim2_cnt: Vec<u8>,
    trim2_tmp: Vec<u64>,
    stop: Arc<AtomicBool>,
}

pub(crate) const RENAME_MARK: u16 = 256;

impl Cuckoo {
    /// Creates a solver sized for `params`, with one worker per available
    /// CPU (capped at [`MAX_WORKERS`]).
    pub fn new(params: Params) -> Self {
        let workers = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::with_workers(params, workers)
    }

    /// Creates a solver with an explicit worker count.
    ///
    /// The solved nonce list for a given key does not depend on the worker
    /// count; only throughput does.
    pub fn with_workers(params: Params, workers: usize) -> Self {
        let ncpu = workers.clamp(1, MAX_WORKERS);
        let shard_cap = params.big_eps / ncpu + 1;
        Cuckoo {
            params,
            ncpu,
            sip: SipHasher::from_key(&[0u8; 16]),
            matrix: Matrix::new(params.nx, params.big_eps),
            shards: (0..ncpu).map(|_| Matrix::new(params.nx, shard_cap)).collect(),
            scratch: (0..ncpu).map(|_| Scratch::new(&params)).collect(),
            cuckoo: vec![0; params.cuckoo_len],
            us: Vec::with_capacity(params.max_path),
            vs: Vec::with_capacity(params.max_path),
            rename_cnt: vec![0; params.nz.max(1usize << params.comp0_bits)],
            trim2_cnt: vec![0; 1usize << (params.x_bits + params.comp0_bits)],
            trim2_tmp: Vec::with_capacity(params.big_eps),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The parameter set this solver was built for.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Returns a handle that cancels an in-flight solve when set.
    ///
    /// The flag is checked at stage and round boundaries; a cancelled solve
    /// returns `None`. The flag is sticky: clear it with `store(false)`
    /// before the next attempt.
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    fn aborted(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Resets all buffers (by truncation) and installs the siphash key.
    fn prepare(&mut self, key: &[u8; 16]) {
        self.sip = SipHasher::from_key(key);
        self.matrix.clear();
        for shard in &mut self.shards {
            shard.clear();
        }
        for scratch in &mut self.scratch {
            scratch.clear();
        }
        self.cuckoo.fill(0);
        self.us.clear();
        self.vs.clear();
    }

    /// Searches the graph keyed by `key` for a cycle of exactly
    /// `proof_size` edges.
    ///
    /// Returns the sorted nonce list on success. `None` means no cycle
    /// exists in this graph instance (or the solve was aborted); the caller
    /// picks a new key and retries. This is the expected common outcome,
    /// not an error.
    pub fn solve(&mut self, key: &[u8; 16]) -> Option<Vec<u32>> {
        let p = self.params;
        self.prepare(key);
        if self.aborted() {
            warn!("solve aborted before start");
            return None;
        }

        self.build_u();
        self.build_v();
        debug!(
            "graph built for key {}: {} edges live",
            hex::encode(key),
            self.matrix.live_edges()
        );
        self.trimming();
        if self.aborted() {
            warn!("solve aborted during trimming");
            return None;
        }
        self.matrix.ensure_major(true);
        debug!("trimmed to {} edges", self.matrix.live_edges());

        for x in 0..p.nx {
            for y in 0..p.nx {
                if self.aborted() {
                    warn!("solve aborted during cycle search");
                    return None;
                }
                for k in 0..self.matrix.bucket(x, y).len() {
                    let uv = self.matrix.bucket(x, y)[k];
                    let u = ((uv >> 32) as u32) << 1;
                    let v = ((uv as u32) << 1) | 1;
                    // A walk past max_path signals degenerate structure;
                    // skip this edge, the search goes on.
                    if !path(&self.cuckoo, &p, u, &mut self.us) {
                        continue;
                    }
                    if !path(&self.cuckoo, &p, v, &mut self.vs) {
                        continue;
                    }
                    if self.us[self.us.len() - 1] == self.vs[self.vs.len() - 1] {
                        if let Some(answer) = self.solution() {
                            info!("found {}-cycle", p.proof_size);
                            return Some(answer);
                        }
                        continue;
                    }
                    // No cycle through this edge yet: union the shorter
                    // path under the other root by reversing its parent
                    // pointers.
                    if self.us.len() < self.vs.len() {
                        for nu in (0..self.us.len() - 1).rev() {
                            self.cuckoo[(self.us[nu + 1] & p.xy_comp1_mask) as usize] =
                                self.us[nu];
                        }
                        self.cuckoo[(u & p.xy_comp1_mask) as usize] = v;
                    } else {
                        for nv in (0..self.vs.len() - 1).rev() {
                            self.cuckoo[(self.vs[nv + 1] & p.xy_comp1_mask) as usize] =
                                self.vs[nv];
                        }
                        self.cuckoo[(v & p.xy_comp1_mask) as usize] = u;
                    }
                }
            }
        }
        None
    }

    /// Recovers the nonces of the cycle closed by the two paths.
    ///
    /// Returns `None` when the cycle length is not `proof_size`; the caller
    /// keeps scanning.
    fn solution(&self) -> Option<Vec<u32>> {
        let p = self.params;
        let us = &self.us;
        let vs = &self.vs;
        let mut nu = (us.len() - 1) as i64;
        let mut nv = (vs.len() - 1) as i64;
        let min = nu.min(nv);
        nu -= min;
        nv -= min;
        while us[nu as usize] != vs[nv as usize] {
            nu += 1;
            nv += 1;
        }
        if nu + nv + 1 != p.proof_size as i64 {
            return None;
        }

        // Rebuild the cycle's edges in original node coordinates. A renamed
        // word keeps its [z | x | y] fields, so the pre-rename node id is
        // (xy << z_bits) | z.
        let mut edges: Vec<u64> = Vec::with_capacity(p.proof_size);
        let mut uxymap = vec![false; 1usize << (2 * p.x_bits)];
        let mut add = |u: u32, v: u32| {
            let u = u >> 1;
            let uz = (u >> (2 * p.x_bits + p.comp1_bits)) as u64;
            let uxy = (u >> p.comp1_bits) & p.xy_mask;
            let ru = ((uxy as u64) << p.z_bits) | uz;
            uxymap[uxy as usize] = true;
            let v = v >> 1;
            let vz = (v >> (2 * p.x_bits + p.comp1_bits)) as u64;
            let vxy = (v >> p.comp1_bits) & p.xy_mask;
            let rv = ((vxy as u64) << p.z_bits) | vz;
            edges.push((ru << 32) | rv);
        };
        add(us[0], vs[0]);
        nu -= 1;
        while nu >= 0 {
            add(us[((nu + 1) & !1) as usize], us[(nu | 1) as usize]);
            nu -= 1;
        }
        nv -= 1;
        while nv >= 0 {
            add(vs[(nv | 1) as usize], vs[((nv + 1) & !1) as usize]);
            nv -= 1;
        }
        edges.sort_unstable();

        // Re-derive every candidate edge and match it against the cycle:
        // cheap xy-class filter first, then exact binary search. Workers
        // race to fill the answer; order is restored by the final sort.
        let sip = self.sip;
        let stop = self.stop.as_ref();
        let answer = Mutex::new(Vec::with_capacity(p.proof_size));
        let ranges = partition(p.easiness as usize, self.ncpu);
        thread::scope(|s| {
            for range in ranges {
                if range.is_empty() {
                    continue;
                }
                let edges = &edges;
                let uxymap = &uxymap;
                let answer = &answer;
                s.spawn(move || {
                    let mut nodes = vec![0u64; PRF_BATCH];
                    let mut nonce = range.start as u64;
                    let end = range.end as u64;
                    'range: while nonce < end {
                        if stop.load(Ordering::Relaxed) {
                            return;
                        }
                        let take = ((end - nonce) as usize).min(PRF_BATCH);
                        sip.hash_seq(nonce, 0, &mut nodes[..take]);
                        for i in 0..take {
                            let u0 = nodes[i] & p.edge_mask;
                            if !uxymap[((u0 >> p.z_bits) & (p.xy_mask as u64)) as usize] {
                                continue;
                            }
                            let v0 = sip.hash(((nonce + i as u64) << 1) | 1) & p.edge_mask;
                            if edges.binary_search(&((u0 << 32) | v0)).is_ok() {
                                let mut guard = answer.lock().expect("answer mutex poisoned");
                                guard.push((nonce + i as u64) as u32);
                                if guard.len() >= p.proof_size {
                                    break 'range;
                                }
                            }
                        }
                        nonce += take as u64;
                    }
                });
            }
        });
        let mut answer = answer.into_inner().expect("answer mutex poisoned");
        answer.sort_unstable();
        Some(answer)
    }
}

/// Follows parent pointers from `start` to a root, recording the visited
/// nodes. Returns false when the walk exceeds `max_path`.
fn path(cuckoo: &[u32], p: &Params, mut u: u32, out: &mut Vec<u32>) -> bool {
    out.clear();
    while u != 0 {
        if out.len() >= p.max_path {
            return false;
        }
        out.push(u);
        u = cuckoo[(u & p.xy_comp1_mask) as usize];
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::verify;

    const FIXTURE_KEY: [u8; 16] = [
        101, 230, 247, 169, 126, 136, 45, 25, 128, 175, 81, 243, 52, 69, 208, 99,
    ];
    const FIXTURE_NONCES: [u32; 8] = [558, 616, 1055, 2659, 3327, 3451, 3824, 3868];
    // A key whose graph contains no 8-cycle.
    const BARREN_KEY: [u8; 16] = [
        226, 219, 79, 247, 4, 232, 57, 202, 24, 135, 179, 17, 153, 102, 132, 178,
    ];

    fn test_params() -> Params {
        Params::new(12, 8, 2).unwrap()
    }

    #[test]
    fn solves_fixture_key() {
        let mut cuckoo = Cuckoo::new(test_params());
        let nonces = cuckoo.solve(&FIXTURE_KEY).expect("fixture key has a cycle");
        assert_eq!(nonces, FIXTURE_NONCES);
    }

    #[test]
    fn solve_round_trips_through_verify() {
        let p = test_params();
        let mut cuckoo = Cuckoo::new(p);
        let nonces = cuckoo.solve(&FIXTURE_KEY).unwrap();
        assert_eq!(verify(&p, &FIXTURE_KEY, &nonces), Ok(()));
    }

    #[test]
    fn solve_is_deterministic() {
        let mut cuckoo = Cuckoo::new(test_params());
        let first = cuckoo.solve(&FIXTURE_KEY);
        let second = cuckoo.solve(&FIXTURE_KEY);
        assert_eq!(first, second);
        assert!(first.is_some());
    }

    #[test]
    fn worker_count_does_not_change_the_answer() {
        let p = test_params();
        let mut single = Cuckoo::with_workers(p, 1);
        let mut wide = Cuckoo::with_workers(p, 8);
        assert_eq!(single.solve(&FIXTURE_KEY), wide.solve(&FIXTURE_KEY));
    }

    #[test]
    fn reports_no_cycle_without_error() {
        let mut cuckoo = Cuckoo::new(test_params());
        assert_eq!(cuckoo.solve(&BARREN_KEY), None);
    }

    #[test]
    fn solver_is_reusable_across_keys() {
        let mut cuckoo = Cuckoo::new(test_params());
        assert_eq!(cuckoo.solve(&BARREN_KEY), None);
        assert_eq!(
            cuckoo.solve(&FIXTURE_KEY).as_deref(),
            Some(&FIXTURE_NONCES[..])
        );
        assert_eq!(cuckoo.solve(&BARREN_KEY), None);
    }

    #[test]
    fn aborted_solve_returns_none() {
        let mut cuckoo = Cuckoo::new(test_params());
        let handle = cuckoo.abort_handle();
        handle.store(true, Ordering::Relaxed);
        assert_eq!(cuckoo.solve(&FIXTURE_KEY), None);
        // The flag is sticky until the caller clears it.
        handle.store(false, Ordering::Relaxed);
        assert!(cuckoo.solve(&FIXTURE_KEY).is_some());
    }
}
