// src/verify.rs - single-threaded re-check of a claimed cycle

//! Proof verification.
//!
//! [`verify`] is a pure function: it re-derives every proof edge from its
//! nonce and the siphash key, checks the cycle XOR invariant, then traces the
//! endpoint pairing to confirm one simple cycle of exactly `proof_size`
//! edges. It holds no state and is safe to call from any number of threads.

use thiserror::Error;

use crate::params::Params;
use crate::siphash::SipHasher;

/// Reasons a proof is rejected. Each is a distinct kind so callers can
/// count malformed and malicious proofs separately.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// The nonce list is not exactly `proof_size` long.
    #[error("proof has {actual} nonces, expected {expected}")]
    WrongProofLength {
        /// Required nonce count.
        expected: usize,
        /// Count actually supplied.
        actual: usize,
    },

    /// The largest nonce lies outside the enumerated edge range.
    #[error("nonce {0} is too big")]
    NonceTooBig(u32),

    /// Nonces must be strictly increasing.
    #[error("nonces are not in ascending order")]
    NoncesOutOfOrder,

    /// The U endpoints do not cancel: not every node is visited twice.
    #[error("U endpoints don't match")]
    UEndpointsMismatch,

    /// The V endpoints do not cancel.
    #[error("V endpoints don't match")]
    VEndpointsMismatch,

    /// A node value occurs more than twice: the edge set branches.
    #[error("branch in the cycle")]
    Branch,

    /// A node value occurs only once: the edge set has a dead end.
    #[error("dead end in the cycle")]
    DeadEnd,

    /// The trace closes after a number of hops other than `proof_size`.
    #[error("cycle has the wrong length")]
    WrongCycleLength,
}

/// Checks that `nonces` is a valid cycle proof for `key`.
///
/// Fail-fast: the first violated check is returned and nothing else is
/// evaluated.
pub fn verify(params: &Params, key: &[u8; 16], nonces: &[u32]) -> Result<(), VerifyError> {
    let proof_size = params.proof_size;
    if nonces.len() != proof_size {
        return Err(VerifyError::WrongProofLength {
            expected: proof_size,
            actual: nonces.len(),
        });
    }
    if nonces[proof_size - 1] as u64 > params.easiness {
        return Err(VerifyError::NonceTooBig(nonces[proof_size - 1]));
    }

    let sip = SipHasher::from_key(key);
    let mut uvs = vec![0u32; 2 * proof_size];
    let mut xor0 = 0u32;
    let mut xor1 = 0u32;

    for n in 0..proof_size {
        if n > 0 && nonces[n] <= nonces[n - 1] {
            return Err(VerifyError::NoncesOutOfOrder);
        }
        let (u, v) = sip.edge(nonces[n] as u64, params.edge_mask);
        let u0 = (u as u32) << 1;
        let v0 = ((v as u32) << 1) | 1;
        xor0 ^= u0;
        xor1 ^= v0;
        uvs[2 * n] = u0;
        uvs[2 * n + 1] = v0;
    }
    if xor0 != 0 {
        return Err(VerifyError::UEndpointsMismatch);
    }
    if xor1 != 0 {
        return Err(VerifyError::VEndpointsMismatch);
    }

    // Pair up equal endpoint values: each node must occur exactly twice,
    // and hopping partner -> sibling slot must close at slot 0 after
    // exactly proof_size steps.
    let mut n = 0;
    let mut i = 0;
    loop {
        let mut another = i;
        let mut k = (i + 2) % (2 * proof_size);
        while k != i {
            if uvs[k] == uvs[i] {
                if another != i {
                    return Err(VerifyError::Branch);
                }
                another = k;
            }
            k = (k + 2) % (2 * proof_size);
        }
        if another == i {
            return Err(VerifyError::DeadEnd);
        }
        i = another ^ 1;
        n += 1;
        if i == 0 {
            break;
        }
    }
    if n != proof_size {
        return Err(VerifyError::WrongCycleLength);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Known-good pair for the reduced parameter set, generated with the
    // reference algorithm.
    const FIXTURE_KEY: [u8; 16] = [
        101, 230, 247, 169, 126, 136, 45, 25, 128, 175, 81, 243, 52, 69, 208, 99,
    ];
    const FIXTURE_NONCES: [u32; 8] = [558, 616, 1055, 2659, 3327, 3451, 3824, 3868];

    fn test_params() -> Params {
        Params::new(12, 8, 2).unwrap()
    }

    #[test]
    fn accepts_known_good_proof() {
        let p = test_params();
        assert_eq!(verify(&p, &FIXTURE_KEY, &FIXTURE_NONCES), Ok(()));
    }

    #[test]
    fn is_idempotent_and_pure() {
        let p = test_params();
        let first = verify(&p, &FIXTURE_KEY, &FIXTURE_NONCES);
        let second = verify(&p, &FIXTURE_KEY, &FIXTURE_NONCES);
        assert_eq!(first, second);
        assert_eq!(first, Ok(()));
    }

    #[test]
    fn rejects_wrong_length() {
        let p = test_params();
        let short = &FIXTURE_NONCES[..7];
        assert_eq!(
            verify(&p, &FIXTURE_KEY, short),
            Err(VerifyError::WrongProofLength {
                expected: 8,
                actual: 7
            })
        );

        let mut long = FIXTURE_NONCES.to_vec();
        long.push(4000);
        assert_eq!(
            verify(&p, &FIXTURE_KEY, &long),
            Err(VerifyError::WrongProofLength {
                expected: 8,
                actual: 9
            })
        );

        assert!(matches!(
            verify(&p, &FIXTURE_KEY, &[]),
            Err(VerifyError::WrongProofLength { .. })
        ));
    }

    #[test]
    fn rejects_out_of_range_nonce() {
        let p = test_params();
        let mut nonces = FIXTURE_NONCES;
        nonces[7] = 5000;
        assert_eq!(
            verify(&p, &FIXTURE_KEY, &nonces),
            Err(VerifyError::NonceTooBig(5000))
        );
    }

    #[test]
    fn rejects_reordered_nonces() {
        let p = test_params();
        let mut reversed = FIXTURE_NONCES;
        reversed.reverse();
        assert_eq!(
            verify(&p, &FIXTURE_KEY, &reversed),
            Err(VerifyError::NoncesOutOfOrder)
        );
    }

    #[test]
    fn rejects_duplicated_nonce() {
        let p = test_params();
        let mut nonces = FIXTURE_NONCES;
        nonces[1] = nonces[0];
        assert_eq!(
            verify(&p, &FIXTURE_KEY, &nonces),
            Err(VerifyError::NoncesOutOfOrder)
        );
    }

    #[test]
    fn rejects_flipped_nonce() {
        let p = test_params();
        let mut flipped = FIXTURE_NONCES;
        flipped[3] ^= 1;
        assert_eq!(
            verify(&p, &FIXTURE_KEY, &flipped),
            Err(VerifyError::UEndpointsMismatch)
        );

        let mut bumped = FIXTURE_NONCES;
        bumped[2] = 1056;
        assert_eq!(
            verify(&p, &FIXTURE_KEY, &bumped),
            Err(VerifyError::UEndpointsMismatch)
        );
    }

    #[test]
    fn rejects_wrong_key() {
        let p = test_params();
        let mut key = FIXTURE_KEY;
        key[0] ^= 0xff;
        assert!(verify(&p, &key, &FIXTURE_NONCES).is_err());
    }
}
