//! Configuration management for the witness service

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::dispatcher::ProverSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP API binds to
    pub listen_addr: String,

    /// Directory holding witnesses, results and prover logs
    pub data_dir: String,

    /// Prover executable, resolved against the working directory
    pub prover_binary: String,

    /// Proof system passed to the prover (`--system`)
    pub prover_system: String,

    /// Prover backend, exported as SP1_PROVER
    pub prover_network: String,

    /// Prover network credential, exported as SP1_PRIVATE_KEY
    pub prover_private_key: String,

    pub prover_log_level: String,

    /// Base URL for tracking links reported by the status endpoint
    pub explorer_base_url: String,

    /// Timeout for outbound HTTP requests in seconds
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            data_dir: ".".to_string(),
            prover_binary: "./bin/sp1-prover".to_string(),
            prover_system: "groth16".to_string(),
            prover_network: "network".to_string(),
            prover_private_key: String::new(),
            prover_log_level: "info".to_string(),
            explorer_base_url: "https://explorer.succinct.xyz".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if std::path::Path::new(path).exists() {
            let contents = fs::read_to_string(path)?;
            toml::from_str(&contents).with_context(|| format!("invalid config file {}", path))?
        } else {
            Config::default()
        };

        config.apply_overrides(|key| env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_overrides(|key| env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = var("LISTEN_ADDR") {
            self.listen_addr = addr;
        }

        if let Some(dir) = var("DATA_DIR") {
            self.data_dir = dir;
        }

        if let Some(binary) = var("PROVER_BINARY") {
            self.prover_binary = binary;
        }

        if let Some(system) = var("PROVER_SYSTEM") {
            self.prover_system = system;
        }

        if let Some(network) = var("SP1_PROVER") {
            self.prover_network = network;
        }

        if let Some(key) = var("PRIVATE_KEY") {
            self.prover_private_key = key;
        }

        if let Some(level) = var("PROVER_LOG_LEVEL") {
            self.prover_log_level = level;
        }

        if let Some(url) = var("EXPLORER_BASE_URL") {
            self.explorer_base_url = url;
        }

        if let Some(timeout) = var("REQUEST_TIMEOUT_SECS") {
            if let Ok(secs) = timeout.parse() {
                self.request_timeout_secs = secs;
            }
        }
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.prover_private_key.is_empty() {
            return Err(anyhow::anyhow!("Prover private key is required"));
        }

        if self.prover_binary.is_empty() {
            return Err(anyhow::anyhow!("Prover binary path is required"));
        }

        self.socket_addr()?;

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.listen_addr
            .parse()
            .with_context(|| format!("invalid listen address {:?}", self.listen_addr))
    }

    /// Prover invocation settings. The binary path is made absolute because
    /// the prover runs with the data directory as its working directory.
    pub fn prover_settings(&self) -> Result<ProverSettings> {
        let mut binary = PathBuf::from(&self.prover_binary);
        if binary.is_relative() && binary.components().count() > 1 {
            binary = env::current_dir()?.join(binary);
        }

        Ok(ProverSettings {
            binary,
            system: self.prover_system.clone(),
            network: self.prover_network.clone(),
            private_key: self.prover_private_key.clone(),
            log_level: self.prover_log_level.clone(),
        })
    }
}
