// src/siphash.rs - SipHash-2-4 keyed PRF for edge generation

//! SipHash-2-4 pseudorandom function used to derive graph edges.
//!
//! The two endpoints of the edge generated by nonce `n` are
//! `prf(2n) & edge_mask` (U side) and `prf(2n + 1) & edge_mask` (V side).
//! The construction must stay bit-exact with existing proofs, so the key
//! schedule and round structure follow the reference exactly.

use blake2::{
    digest::{Update, VariableOutput},
    Blake2bVar,
};

/// Nonces hashed per batched PRF call.
pub const PRF_BATCH: usize = 8192;

/// Expanded SipHash-2-4 state for one 128-bit key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SipHasher {
    v: [u64; 4],
}

impl SipHasher {
    /// Expands a 128-bit key into the four-word initial state.
    pub fn from_key(key: &[u8; 16]) -> Self {
        let k0 = u64::from_le_bytes(key[0..8].try_into().expect("8-byte slice"));
        let k1 = u64::from_le_bytes(key[8..16].try_into().expect("8-byte slice"));
        SipHasher {
            v: [
                k0 ^ 0x736f6d6570736575,
                k1 ^ 0x646f72616e646f6d,
                k0 ^ 0x6c7967656e657261,
                k1 ^ 0x7465646279746573,
            ],
        }
    }

    /// One SipHash-2-4 evaluation: two compression rounds, the `0xff`
    /// finalization xor, then four more rounds.
    pub fn hash(&self, b: u64) -> u64 {
        let [mut v0, mut v1, mut v2, mut v3] = self.v;
        v3 ^= b;
        sipround(&mut v0, &mut v1, &mut v2, &mut v3);
        sipround(&mut v0, &mut v1, &mut v2, &mut v3);
        v0 ^= b;
        v2 ^= 0xff;
        for _ in 0..4 {
            sipround(&mut v0, &mut v1, &mut v2, &mut v3);
        }
        v0 ^ v1 ^ v2 ^ v3
    }

    /// Derives one edge: `(prf(2n) & edge_mask, prf(2n+1) & edge_mask)`.
    pub fn edge(&self, nonce: u64, edge_mask: u64) -> (u64, u64) {
        (
            self.hash(nonce << 1) & edge_mask,
            self.hash((nonce << 1) | 1) & edge_mask,
        )
    }

    /// Batched PRF over a contiguous nonce block: fills `out[i]` with
    /// `prf(((start + i) << 1) | side)`.
    pub fn hash_seq(&self, start: u64, side: u64, out: &mut [u64]) {
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.hash(((start + i as u64) << 1) | side);
        }
    }

    /// Batched PRF over gathered nonces: fills `out[i]` with
    /// `prf((nonces[i] << 1) | side)`.
    pub fn hash_many(&self, nonces: &[u64], side: u64, out: &mut [u64]) {
        for (slot, &nonce) in out.iter_mut().zip(nonces) {
            *slot = self.hash((nonce << 1) | side);
        }
    }
}

#[inline(always)]
fn sipround(v0: &mut u64, v1: &mut u64, v2: &mut u64, v3: &mut u64) {
    *v0 = v0.wrapping_add(*v1);
    *v1 = v1.rotate_left(13);
    *v1 ^= *v0;
    *v0 = v0.rotate_left(32);

    *v2 = v2.wrapping_add(*v3);
    *v3 = v3.rotate_left(16);
    *v3 ^= *v2;

    *v0 = v0.wrapping_add(*v3);
    *v3 = v3.rotate_left(21);
    *v3 ^= *v0;

    *v2 = v2.wrapping_add(*v1);
    *v1 = v1.rotate_left(17);
    *v1 ^= *v2;
    *v2 = v2.rotate_left(32);
}

/// Derives a 128-bit siphash key from arbitrary header bytes:
/// BLAKE2b-256 of the header, truncated to 16 bytes.
pub fn key_from_header(header: &[u8]) -> [u8; 16] {
    let mut hasher = Blake2bVar::new(32).expect("32 is a valid blake2b length");
    hasher.update(header);
    let mut hash = [0u8; 32];
    hasher
        .finalize_variable(&mut hash)
        .expect("output length matches");
    let mut key = [0u8; 16];
    key.copy_from_slice(&hash[..16]);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; 16] {
        let mut key = [0u8; 16];
        for (i, b) in key.iter_mut().enumerate() {
            *b = i as u8;
        }
        key
    }

    #[test]
    fn state_expansion() {
        let sip = SipHasher::from_key(&test_key());
        assert_eq!(
            sip.v,
            [
                0x7469686173716475,
                0x6b617f6d656e6665,
                0x6b7f62616d677361,
                0x7b6b696e727e6c7b,
            ]
        );
    }

    #[test]
    fn known_digests() {
        let sip = SipHasher::from_key(&test_key());
        assert_eq!(sip.hash(0), 0x726fdb47dd0e0e31);
        assert_eq!(sip.hash(1), 0xb85d811482955ea3);
        assert_eq!(sip.hash(42), 0x4461371ad004323b);
        assert_eq!(sip.hash(123456789), 0x5f7b64f35b23c7c4);
    }

    #[test]
    fn batches_match_single_calls() {
        let sip = SipHasher::from_key(&test_key());
        let mut seq = [0u64; 64];
        sip.hash_seq(1000, 1, &mut seq);
        for (i, &h) in seq.iter().enumerate() {
            assert_eq!(h, sip.hash(((1000 + i as u64) << 1) | 1));
        }

        let nonces: Vec<u64> = (0..64).map(|i| i * 37).collect();
        let mut many = [0u64; 64];
        sip.hash_many(&nonces, 0, &mut many);
        for (i, &h) in many.iter().enumerate() {
            assert_eq!(h, sip.hash(nonces[i] << 1));
        }
    }

    #[test]
    fn edge_is_deterministic() {
        let sip = SipHasher::from_key(&test_key());
        let mask = (1u64 << 24) - 1;
        let (u1, v1) = sip.edge(99, mask);
        let (u2, v2) = sip.edge(99, mask);
        assert_eq!((u1, v1), (u2, v2));
        assert!(u1 <= mask && v1 <= mask);
        assert_ne!(sip.edge(100, mask), (u1, v1));
    }

    #[test]
    fn header_key_derivation() {
        let key = key_from_header(b"qitmeer");
        assert_eq!(
            key,
            [
                104, 246, 222, 26, 155, 9, 42, 93, 109, 155, 238, 198, 165, 152, 164, 130
            ]
        );
    }
}
