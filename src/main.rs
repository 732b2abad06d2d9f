// src/main.rs - Command-line solver and verifier

//! Command-line entry point.
//!
//! `solve` scans a range of header nonces for a proof; `verify` checks a
//! proof someone else produced. The proof key is derived the way the chain
//! does it: an 80-byte header with a little-endian u32 header nonce in the
//! last four bytes, hashed down to a 16-byte siphash key.

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use cuckoo_pow::{init, siphash, verify, Cuckoo, Params, Result, SolverConfig};

#[derive(Parser)]
#[command(name = "cuckoo-pow")]
#[command(about = "Cuckoo Cycle proof-of-work solver and verifier")]
struct Cli {
    /// Path to a JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search a range of header nonces for a proof
    Solve {
        /// Header seed (hex, at most 76 bytes once decoded)
        #[arg(long, default_value = "00")]
        header: String,
        /// First header nonce to try
        #[arg(long, default_value = "0")]
        start_nonce: u32,
        /// Number of header nonces to try
        #[arg(short = 'n', long, default_value = "100")]
        count: u32,
    },
    /// Verify a proof against a header nonce
    Verify {
        /// Header seed (hex)
        #[arg(long, default_value = "00")]
        header: String,
        /// Header nonce the proof was found for
        #[arg(long)]
        nonce: u32,
        /// Proof nonces, comma separated
        #[arg(long, value_delimiter = ',')]
        proof: Vec<u32>,
    },
}

fn main() -> Result<()> {
    init()?;
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => SolverConfig::load(path)?,
        None => SolverConfig::default(),
    };
    let params = config.params()?;

    match cli.command {
        Commands::Solve {
            header,
            start_nonce,
            count,
        } => solve(params, &config, &header, start_nonce, count),
        Commands::Verify {
            header,
            nonce,
            proof,
        } => check(params, &header, nonce, &proof),
    }
}

/// Derives the 16-byte proof key for one header nonce.
fn pow_key(header: &str, nonce: u32) -> Result<[u8; 16]> {
    let seed = hex::decode(header)?;
    let mut block = [0u8; 80];
    let len = seed.len().min(76);
    block[..len].copy_from_slice(&seed[..len]);
    block[76..].copy_from_slice(&nonce.to_le_bytes());
    Ok(siphash::key_from_header(&block))
}

fn solve(
    params: Params,
    config: &SolverConfig,
    header: &str,
    start_nonce: u32,
    count: u32,
) -> Result<()> {
    let mut solver = match config.workers {
        Some(workers) => Cuckoo::with_workers(params, workers),
        None => Cuckoo::new(params),
    };
    info!(
        "solving edge_bits={} proof_size={}: {} header nonces from {}",
        params.edge_bits, params.proof_size, count, start_nonce
    );
    let started = Instant::now();
    for nonce in start_nonce..start_nonce.saturating_add(count) {
        let key = pow_key(header, nonce)?;
        if let Some(proof) = solver.solve(&key) {
            verify(&params, &key, &proof)?;
            info!(
                "header nonce {}: {}-cycle found in {:.2?}",
                nonce,
                params.proof_size,
                started.elapsed()
            );
            let nonces = proof
                .iter()
                .map(|n| format!("{:#x}", n))
                .collect::<Vec<_>>()
                .join(",");
            println!("{} {}", nonce, nonces);
            return Ok(());
        }
    }
    warn!(
        "no solution in {} attempts ({:.2?})",
        count,
        started.elapsed()
    );
    Ok(())
}

fn check(params: Params, header: &str, nonce: u32, proof: &[u32]) -> Result<()> {
    let key = pow_key(header, nonce)?;
    verify(&params, &key, proof)?;
    println!("OK");
    Ok(())
}
