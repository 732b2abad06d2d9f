// src/lib.rs - Cuckoo Cycle proof-of-work library

//! Cuckoo Cycle proof of work: a multi-threaded solver and a cheap verifier.
//!
//! A proof instance is a bipartite graph keyed by a 16-byte siphash key;
//! each nonce below the easiness bound names one edge. A valid proof is the
//! sorted nonce list of a cycle of exactly `proof_size` edges. Solving is
//! memory-bound graph trimming; verification is quadratic in the proof size
//! and needs no solver state.
//!
//! ```no_run
//! use cuckoo_pow::{Cuckoo, Params, verify};
//!
//! let params = Params::qitmeer();
//! let key = cuckoo_pow::siphash::key_from_header(b"block header bytes");
//! let mut solver = Cuckoo::new(params);
//! if let Some(nonces) = solver.solve(&key) {
//!     assert!(verify(&params, &key, &nonces).is_ok());
//! }
//! ```

#![warn(missing_docs)]

/// Solver settings and file loading
pub mod config;
/// Parameter sets and derived graph geometry
pub mod params;
/// Keyed edge generation (siphash-2-4)
pub mod siphash;
/// The multi-threaded solver
pub mod solver;
/// Proof verification
pub mod verify;

// Re-export main types for convenience
pub use config::{ConfigError, SolverConfig};
pub use params::{Params, ParamsError};
pub use solver::{Cuckoo, MAX_WORKERS};
pub use verify::{verify, VerifyError};

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum CuckooError {
    /// Invalid parameter set
    #[error("parameter error: {0}")]
    Params(#[from] ParamsError),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Proof rejected by the verifier
    #[error("verification error: {0}")]
    Verify(#[from] VerifyError),

    /// IO operation errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Hex decoding errors
    #[error("hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Result type alias for crate operations
pub type Result<T> = std::result::Result<T, CuckooError>;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Application name from Cargo.toml
pub const NAME: &str = env!("CARGO_PKG_NAME");
/// Application description from Cargo.toml
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Initialize the solver binary with logging
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("{} v{} - {}", NAME, VERSION, DESCRIPTION);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_metadata_is_populated() {
        assert_eq!(NAME, "cuckoo-pow");
        assert!(!VERSION.is_empty());
        assert!(!DESCRIPTION.is_empty());
    }
}
