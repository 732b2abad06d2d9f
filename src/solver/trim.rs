// src/solver/trim.rs - leaf trimming and node renaming rounds

//! Edge trimming.
//!
//! Alternating rounds remove edges whose endpoint on the active side has
//! degree one; such an edge can never sit on a cycle. Once buckets are
//! sparse enough, two renaming passes compress node ids so the remaining
//! rounds (and the final cycle search) work on narrow keys: the first pass
//! packs a node into `[z | x | y | id0]`, the second into `[z | x | y | id1]`.
//! Renamed words keep their original Z, X and Y fields, which is what lets
//! nonce recovery map a compressed node back to its pre-rename value.
//!
//! Plain trim rounds are row-parallel: after `ensure_major` the active
//! side's X coordinate is the row index, workers own disjoint row ranges
//! and touch nothing else. The renaming passes reuse one shared histogram
//! and run single-threaded; they are two passes out of sixty-odd and never
//! dominate.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use tracing::debug;

use crate::params::Params;

use super::graph::{partition, Scratch};
use super::{Cuckoo, RENAME_MARK};

impl Cuckoo {
    /// One degree-one trim round over the `is_u` side.
    ///
    /// Returns the number of surviving edges and the largest per-(X, Y)
    /// bucket seen; the driver trims until the latter falls under the
    /// renaming threshold. Surviving words are stored swapped, so the far
    /// side becomes the active side of the next round.
    pub(crate) fn trim(&mut self, is_u: bool) -> (usize, usize) {
        let p = self.params;
        self.matrix.ensure_major(is_u);
        let stop = self.stop.as_ref();
        let ranges = partition(p.nx, self.ncpu);
        let mut survivors = 0usize;
        let mut maxbucket = 0usize;
        thread::scope(|s| {
            let mut handles = Vec::with_capacity(self.ncpu);
            let mut rest = self.matrix.buckets_mut();
            for (range, scratch) in ranges.iter().zip(self.scratch.iter_mut()) {
                let take = (range.end - range.start) * p.nx;
                let (rows, tail) = rest.split_at_mut(take);
                rest = tail;
                if rows.is_empty() {
                    continue;
                }
                handles.push(s.spawn(move || trim_rows(&p, stop, rows, scratch)));
            }
            for handle in handles {
                let (num, maxb) = handle.join().expect("trim worker panicked");
                survivors += num;
                maxbucket = maxbucket.max(maxb);
            }
        });
        (survivors, maxbucket)
    }

    /// First renaming pass: the active endpoint `[x | y | z]` becomes
    /// `[z | x | y | id0]`, where `id0` numbers the distinct nodes of one
    /// (X, Y) bucket. After both sides ran, every packed word fits 32 bits
    /// per endpoint exactly.
    pub(crate) fn trim_rename0(&mut self, is_u: bool) -> usize {
        let p = self.params;
        let Cuckoo {
            matrix,
            scratch,
            rename_cnt,
            ..
        } = self;
        matrix.ensure_major(is_u);
        let groups = &mut scratch[0].groups;
        let mut survivors = 0;
        for ux in 0..p.nx {
            for vx in 0..p.nx {
                let bucket = matrix.bucket_mut(ux, vx);
                for &uv in bucket.iter() {
                    let y = ((uv >> (p.edge_bits - 2 * p.x_bits)) & p.x_mask) as usize;
                    groups[y].push(uv);
                }
                bucket.clear();
            }
            for group in groups.iter_mut() {
                let mut next_id: u16 = 0;
                let cnt = &mut rename_cnt[..p.nz];
                cnt.fill(0);
                for &uv in group.iter() {
                    cnt[(uv & p.z_mask) as usize] += 1;
                }
                for &uv in group.iter() {
                    let z = (uv & p.z_mask) as usize;
                    let seen = cnt[z];
                    if seen == 1 {
                        continue;
                    }
                    survivors += 1;
                    let id = if seen >= RENAME_MARK {
                        seen - RENAME_MARK
                    } else {
                        let id = next_id;
                        cnt[z] = RENAME_MARK + next_id;
                        next_id += 1;
                        id
                    };
                    let mut renamed = uv & 0xffff_ffff;
                    renamed >>= p.z_bits;
                    renamed |= (uv & p.z_mask) << (2 * p.x_bits);
                    renamed <<= p.comp0_bits;
                    renamed |= id as u64;
                    let far = uv >> 32;
                    // The far side is still in [x | y | z] form on the first
                    // pass and already renamed on the second.
                    let far_bits = if is_u {
                        2 * p.x_bits + p.comp0_bits
                    } else {
                        p.edge_bits
                    };
                    let fx = ((far >> (far_bits - p.x_bits)) & p.x_mask) as usize;
                    matrix.bucket_mut(ux, fx).push((renamed << 32) | far);
                }
                group.clear();
            }
        }
        survivors
    }

    /// Degree-one trim over renamed nodes, keyed by `[y | id0]` across the
    /// whole row instead of per-bucket Z values.
    pub(crate) fn trim2(&mut self, is_u: bool) -> usize {
        let p = self.params;
        let Cuckoo {
            matrix,
            trim2_cnt,
            trim2_tmp,
            ..
        } = self;
        matrix.ensure_major(is_u);
        let mut survivors = 0;
        trim2_tmp.clear();
        for ux in 0..p.nx {
            trim2_cnt.fill(0);
            for vx in 0..p.nx {
                for &uv in matrix.bucket(ux, vx) {
                    let slot = (uv & p.y_comp0_mask) as usize;
                    trim2_cnt[slot] = trim2_cnt[slot].saturating_add(1);
                }
            }
            for vx in 0..p.nx {
                let bucket = matrix.bucket_mut(ux, vx);
                for i in (0..bucket.len()).rev() {
                    let uv = bucket[i];
                    if trim2_cnt[(uv & p.y_comp0_mask) as usize] == 1 {
                        continue;
                    }
                    survivors += 1;
                    trim2_tmp.push((uv << 32) | (uv >> 32));
                }
                mem::swap(bucket, trim2_tmp);
                trim2_tmp.clear();
            }
        }
        survivors
    }

    /// Second renaming pass: `[z | x | y | id0]` becomes `[z | x | y | id1]`
    /// with ids narrow enough for the adjacency table.
    pub(crate) fn trim_rename1(&mut self, is_u: bool) -> usize {
        let p = self.params;
        let Cuckoo {
            matrix,
            scratch,
            rename_cnt,
            ..
        } = self;
        matrix.ensure_major(is_u);
        let groups = &mut scratch[0].groups;
        let mut survivors = 0;
        for ux in 0..p.nx {
            for vx in 0..p.nx {
                let bucket = matrix.bucket_mut(ux, vx);
                for &uv in bucket.iter() {
                    let y = ((uv >> p.comp0_bits) & p.x_mask) as usize;
                    groups[y].push(uv);
                }
                bucket.clear();
            }
            for group in groups.iter_mut() {
                let mut next_id: u16 = 0;
                let cnt = &mut rename_cnt[..1usize << p.comp0_bits];
                cnt.fill(0);
                for &uv in group.iter() {
                    cnt[(uv & p.comp0_mask) as usize] += 1;
                }
                for &uv in group.iter() {
                    let slot = (uv & p.comp0_mask) as usize;
                    let seen = cnt[slot];
                    if seen == 1 {
                        continue;
                    }
                    survivors += 1;
                    let id = if seen >= RENAME_MARK {
                        seen - RENAME_MARK
                    } else {
                        let id = next_id;
                        cnt[slot] = RENAME_MARK + next_id;
                        next_id += 1;
                        id
                    };
                    let mut renamed = uv & 0xffff_ffff;
                    renamed >>= p.comp0_bits;
                    renamed <<= p.comp1_bits;
                    renamed |= id as u64;
                    let far = uv >> 32;
                    let far_bits = if is_u { p.comp1_bits } else { p.comp0_bits };
                    let fx = ((far >> (far_bits + p.x_bits)) & p.x_mask) as usize;
                    matrix.bucket_mut(ux, fx).push((renamed << 32) | far);
                }
                group.clear();
            }
        }
        survivors
    }

    /// Runs the full trim schedule: plain rounds until the largest bucket
    /// fits the first rename's id space, the first rename pair, compressed
    /// rounds up to a fixed round budget, then the second rename pair.
    pub(crate) fn trimming(&mut self) {
        let p = self.params;
        let threshold = 1usize << (p.comp0_bits + 1);
        let (_, mut maxv) = self.trim(false);
        let (_, mut maxu) = self.trim(true);
        let mut round = 3;
        while maxu > threshold || maxv > threshold {
            if self.aborted() {
                return;
            }
            maxv = self.trim(false).1;
            maxu = self.trim(true).1;
            round += 2;
        }
        debug!(
            "largest bucket under {} after {} trim rounds",
            threshold,
            round - 1
        );
        self.trim_rename0(false);
        let live = self.trim_rename0(true);
        debug!("first rename: {} edges live", live);
        round += 2;
        while round < 65 {
            if self.aborted() {
                return;
            }
            self.trim2(false);
            self.trim2(true);
            round += 2;
        }
        self.trim_rename1(false);
        let live = self.trim_rename1(true);
        debug!("second rename: {} edges live", live);
    }
}

fn trim_rows(
    p: &Params,
    stop: &AtomicBool,
    rows: &mut [Vec<u64>],
    scratch: &mut Scratch,
) -> (usize, usize) {
    let mut survivors = 0;
    let mut maxbucket = 0;
    let Scratch { groups, cnt, .. } = scratch;
    for row in rows.chunks_mut(p.nx) {
        if stop.load(Ordering::Relaxed) {
            return (survivors, maxbucket);
        }
        for bucket in row.iter_mut() {
            for &uv in bucket.iter() {
                let y = ((uv >> (p.edge_bits - 2 * p.x_bits)) & p.x_mask) as usize;
                groups[y].push(uv);
            }
            bucket.clear();
        }
        for group in groups.iter_mut() {
            cnt.fill(0);
            for &uv in group.iter() {
                let z = (uv & p.z_mask) as usize;
                cnt[z] = cnt[z].saturating_add(1);
            }
            let mut kept = 0;
            for &uv in group.iter() {
                if cnt[(uv & p.z_mask) as usize] == 1 {
                    continue;
                }
                kept += 1;
                let far = uv >> 32;
                let fx = ((far >> (p.edge_bits - p.x_bits)) & p.x_mask) as usize;
                row[fx].push((uv << 32) | far);
            }
            group.clear();
            maxbucket = maxbucket.max(kept);
        }
        survivors += row.iter().map(Vec::len).sum::<usize>();
    }
    (survivors, maxbucket)
}
