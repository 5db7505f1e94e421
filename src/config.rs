//! Configuration Module
//!
//! This module defines all configuration structures for the dispatcher.
//! Configuration is loaded from TOML files and parsed using serde, then
//! passed by value into the orchestrator at construction so independent
//! runs with different settings can coexist.
//!
//! # Example TOML
//! ```toml
//! [provider]
//! cnpj = "32649500000145"
//! municipal_registration = "123"
//! municipality_code = "2700102"
//!
//! [endpoints]
//! environment = "homologation"
//! submit_url = "https://enfs-hom.example.gov.br/servlet/arecepcionarloterps"
//! status_url = "https://enfs-hom.example.gov.br/servlet/aconsultarsituacaoloterps"
//! results_url = "https://enfs-hom.example.gov.br/servlet/aconsultarloterps"
//! timeout_secs = 30
//!
//! [signing]
//! certificate_path = "certs/provider.pfx"
//! skip_signature = false
//!
//! [transport]
//! mock = false
//!
//! [submission]
//! max_attempts = 3
//! initial_backoff_ms = 500
//! max_backoff_ms = 8000
//!
//! [polling]
//! interval_secs = 30
//! max_attempts = 20
//! max_wall_clock_secs = 900
//! ```

use serde::Deserialize;
use std::fs;

/// Main configuration structure
///
/// Contains all configuration sections for the dispatcher.
/// Loaded from a TOML file (e.g. config/default.toml).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub provider: ProviderConfig,
    pub endpoints: EndpointConfig,
    pub signing: SigningConfig,
    pub transport: TransportConfig,
    pub submission: SubmissionConfig,
    pub polling: PollingConfig,
}

/// Service provider identity used in batch headers and status queries
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Provider tax id (CNPJ), digits only
    pub cnpj: String,
    /// Municipal registration number
    pub municipal_registration: String,
    /// IBGE municipality code
    pub municipality_code: String,
}

/// Web service endpoint configuration
///
/// One URL per remote operation; the authority exposes submission, status
/// query and result fetch as separate servlets.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// "production" or "homologation" (the authority's staging environment)
    pub environment: String,
    pub submit_url: String,
    pub status_url: String,
    pub results_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

/// Digital signature configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SigningConfig {
    /// Path to the PKCS#12 (.pfx) certificate bundle
    pub certificate_path: String,
    /// Bundle passphrase; omit for unprotected bundles
    pub certificate_password: Option<String>,
    /// When true, documents are forwarded unsigned (development only).
    /// The mode used is always surfaced in the outcome report.
    pub skip_signature: bool,
}

/// Transport selection
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// When true, a deterministic in-process mock replaces the SOAP client
    pub mock: bool,
}

/// Submission retry policy
///
/// Only network-layer failures are retried; a batch is submitted at most
/// once successfully per run.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionConfig {
    /// Maximum submit attempts before the run fails
    pub max_attempts: u32,
    /// First backoff delay; doubles after every failed attempt
    pub initial_backoff_ms: u64,
    /// Upper bound on a single backoff delay
    pub max_backoff_ms: u64,
}

/// Status polling policy
#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    /// Fixed wait between status checks
    pub interval_secs: u64,
    /// Maximum number of status checks per run
    pub max_attempts: u32,
    /// Overall wall-clock budget for the polling stage, independent of the
    /// per-call timeout
    pub max_wall_clock_secs: u64,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    /// * `path` - Path to the TOML configuration file
    ///
    /// # Returns
    /// * `Ok(Config)` if the file was successfully loaded and parsed
    /// * `Err` if the file couldn't be read or the TOML is invalid
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
