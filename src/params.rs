// src/params.rs - Cuckoo Cycle graph parameters and derived bucket geometry

//! Parameter set for the Cuckoo Cycle graph.
//!
//! Everything the solver and verifier need is derived from three inputs:
//! `edge_bits` (the 2-log of the number of candidate edges), `proof_size`
//! (the required cycle length) and `x_bits` (the width of one bucket
//! coordinate). The production values are consensus parameters and must not
//! be tuned locally; reduced sets exist so a full solve/verify cycle can run
//! in test time.

use thiserror::Error;

/// Errors from [`Params::new`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParamsError {
    /// `edge_bits` outside the supported range.
    #[error("edge_bits {0} not supported (need x_bits + 10 <= edge_bits <= 25)")]
    EdgeBitsOutOfRange(u32),

    /// `x_bits` outside the supported range.
    #[error("x_bits {0} not supported (need 1 <= x_bits <= 7 and 2*x_bits < edge_bits)")]
    XBitsOutOfRange(u32),

    /// `proof_size` must be an even cycle length of at least 4.
    #[error("proof_size {0} is not an even number >= 4")]
    BadProofSize(usize),
}

/// Graph size, cycle length and bucket geometry for one Cuckoo Cycle
/// instance.
///
/// Node ids are `edge_bits` wide and split into three fields, high to low:
/// an X coordinate (`x_bits`), a Y coordinate (`x_bits`) and a Z remainder
/// (`z_bits`). The two renaming passes of the trimmer replace the dense id
/// suffix with progressively narrower compressed ids (`comp0_bits`, then
/// `comp1_bits`) while keeping the original `[z|x|y]` fields alongside, so
/// solution edges can be mapped back to full node ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Params {
    /// 2-log of the number of candidate edges.
    pub edge_bits: u32,
    /// Required cycle length (number of proof nonces).
    pub proof_size: usize,
    /// Width of one bucket coordinate; the bucket matrix is `nx * nx`.
    pub x_bits: u32,

    /// Number of candidate edges, `1 << edge_bits`.
    pub n_edges: u64,
    /// Mask selecting one endpoint from a PRF output.
    pub edge_mask: u64,
    /// Number of nodes, twice the edge count.
    pub n_nodes: u64,
    /// Number of nonces enumerated per solve attempt.
    pub easiness: u64,

    /// Buckets per matrix side, `1 << x_bits`.
    pub nx: usize,
    /// Width of the Z field of a node id.
    pub z_bits: u32,
    /// Number of distinct Z values, `1 << z_bits`.
    pub nz: usize,
    /// Initial bucket capacity, `nz` plus slack for uneven hashing.
    pub big_eps: usize,

    /// Width of the first-stage compressed node id.
    pub comp0_bits: u32,
    /// Width of the second-stage compressed node id.
    pub comp1_bits: u32,

    /// Mask for one bucket coordinate.
    pub x_mask: u64,
    /// Mask for the Z field.
    pub z_mask: u64,
    /// Mask for the combined X and Y coordinates.
    pub xy_mask: u32,
    /// Mask for `[y | id0]` on a stage-one renamed node.
    pub y_comp0_mask: u64,
    /// Mask for the stage-one compressed id.
    pub comp0_mask: u64,
    /// Mask addressing the adjacency table: `[x | y | id1]` plus the side bit.
    pub xy_comp1_mask: u32,

    /// Adjacency table length.
    pub cuckoo_len: usize,
    /// Upper bound on one parent-chain walk during cycle search.
    pub max_path: usize,
}

impl Params {
    /// Builds and validates a parameter set.
    ///
    /// The bounds keep every packed word inside 64 bits: a stage-one renamed
    /// node occupies exactly 32 bits (`comp0_bits = 32 - edge_bits`), and a
    /// stage-two renamed node shifted by its side bit must still fit in a
    /// `u32`, which caps `edge_bits` at 25. The lower bound on `edge_bits`
    /// keeps the per-row histogram of `[y | id0]` values to at most 4 MiB.
    pub fn new(edge_bits: u32, proof_size: usize, x_bits: u32) -> Result<Self, ParamsError> {
        if !(1..=7).contains(&x_bits) || 2 * x_bits >= edge_bits {
            return Err(ParamsError::XBitsOutOfRange(x_bits));
        }
        if edge_bits > 25 || edge_bits < x_bits + 10 {
            return Err(ParamsError::EdgeBitsOutOfRange(edge_bits));
        }
        if proof_size < 4 || proof_size % 2 != 0 {
            return Err(ParamsError::BadProofSize(proof_size));
        }

        let n_edges = 1u64 << edge_bits;
        let n_nodes = 2 * n_edges;
        let nx = 1usize << x_bits;
        let z_bits = edge_bits - 2 * x_bits;
        let nz = 1usize << z_bits;
        let comp0_bits = 32 - edge_bits;
        let comp1_bits = 6;

        Ok(Params {
            edge_bits,
            proof_size,
            x_bits,
            n_edges,
            edge_mask: n_edges - 1,
            n_nodes,
            easiness: n_nodes * 50 / 100,
            nx,
            z_bits,
            nz,
            big_eps: nz + nz * 3 / 64,
            comp0_bits,
            comp1_bits,
            x_mask: (nx - 1) as u64,
            z_mask: (nz - 1) as u64,
            xy_mask: (1u32 << (2 * x_bits)) - 1,
            y_comp0_mask: (1u64 << (x_bits + comp0_bits)) - 1,
            comp0_mask: (1u64 << comp0_bits) - 1,
            xy_comp1_mask: (1u32 << (2 * x_bits + comp1_bits + 1)) - 1,
            cuckoo_len: (1usize << (2 * x_bits + comp1_bits + 1)) + 1,
            max_path: 8192,
        })
    }

    /// The production parameter set: 2^24 candidate edges, 20-cycles,
    /// a 32x32 bucket matrix. Wire-compatible with already-issued proofs.
    pub fn qitmeer() -> Self {
        // Validated by construction; the expect cannot fire.
        Self::new(24, 20, 5).expect("production parameters are valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_geometry() {
        let p = Params::qitmeer();
        assert_eq!(p.n_edges, 1 << 24);
        assert_eq!(p.easiness, 1 << 24);
        assert_eq!(p.nx, 32);
        assert_eq!(p.z_bits, 14);
        assert_eq!(p.z_mask, 0x3fff);
        assert_eq!(p.big_eps, 16384 + 16384 * 3 / 64);
        assert_eq!(p.comp0_bits, 8);
        assert_eq!(p.comp0_mask, 0xff);
        assert_eq!(p.y_comp0_mask, 0x1fff);
        assert_eq!(p.xy_mask, 0x3ff);
        assert_eq!(p.xy_comp1_mask, 0x1ffff);
        assert_eq!(p.cuckoo_len, (1 << 17) + 1);
        assert_eq!(p.max_path, 8192);
    }

    #[test]
    fn reduced_test_set() {
        let p = Params::new(12, 8, 2).unwrap();
        assert_eq!(p.easiness, 4096);
        assert_eq!(p.nx, 4);
        assert_eq!(p.z_bits, 8);
        assert_eq!(p.comp0_bits, 20);
        assert_eq!(p.cuckoo_len, (1 << 11) + 1);
    }

    #[test]
    fn rejects_bad_geometry() {
        assert!(matches!(
            Params::new(26, 20, 5),
            Err(ParamsError::EdgeBitsOutOfRange(26))
        ));
        assert!(matches!(
            Params::new(24, 20, 0),
            Err(ParamsError::XBitsOutOfRange(0))
        ));
        assert!(matches!(
            Params::new(12, 8, 6),
            Err(ParamsError::XBitsOutOfRange(6))
        ));
        assert!(matches!(
            Params::new(24, 21, 5),
            Err(ParamsError::BadProofSize(21))
        ));
        assert!(matches!(
            Params::new(24, 2, 5),
            Err(ParamsError::BadProofSize(2))
        ));
    }
}
