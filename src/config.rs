// src/config.rs - Solver configuration

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::params::{Params, ParamsError};

/// Errors reading or applying a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("config read error: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid JSON for [`SolverConfig`].
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// The configured values do not form a valid parameter set.
    #[error("config rejected: {0}")]
    Params(#[from] ParamsError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Solver settings, loadable from a JSON file.
pub struct SolverConfig {
    /// log2 of the number of graph edges
    pub edge_bits: u32,
    /// Required cycle length
    pub proof_size: usize,
    /// Bits of each endpoint used for X/Y bucketing
    pub x_bits: u32,
    /// Worker threads; `None` means one per available CPU
    pub workers: Option<usize>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        // Mainnet geometry: 2^24-node graph, 20-cycle proofs.
        Self {
            edge_bits: 24,
            proof_size: 20,
            x_bits: 5,
            workers: None,
        }
    }
}

impl SolverConfig {
    /// Reads a configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Validates the configured geometry into a [`Params`].
    pub fn params(&self) -> Result<Params, ConfigError> {
        Ok(Params::new(self.edge_bits, self.proof_size, self.x_bits)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_mainnet_geometry() {
        let params = SolverConfig::default().params().unwrap();
        assert_eq!(params.edge_bits, 24);
        assert_eq!(params.proof_size, 20);
        assert_eq!(params.easiness, 1 << 24);
    }

    #[test]
    fn parses_json() {
        let config: SolverConfig = serde_json::from_str(
            r#"{"edge_bits": 12, "proof_size": 8, "x_bits": 2, "workers": 4}"#,
        )
        .unwrap();
        assert_eq!(config.workers, Some(4));
        assert!(config.params().is_ok());
    }

    #[test]
    fn bad_geometry_is_rejected() {
        let config = SolverConfig {
            edge_bits: 30,
            ..SolverConfig::default()
        };
        assert!(matches!(config.params(), Err(ConfigError::Params(_))));
    }
}
