//! Configuration for the mailer.
//!
//! ```toml
//! [smtp]
//! host = "smtp.example.com"
//! port = 465
//! tls = "implicit"
//! max_idle = 4
//!
//! [smtp.timeouts]
//! data_secs = 60
//!
//! [credentials]
//! username = "mailer@example.com"
//! password = "..."
//! ```

pub mod timeouts;
pub mod tls;

use std::path::Path;

use serde::Deserialize;

pub use timeouts::ClientTimeouts;
pub use tls::TlsPolicy;

use crate::{client::Credentials, error::ConfigError};

/// Top level configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

impl Config {
    /// Reads and parses a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Ok(toml::from_str(&contents)?)
    }
}

/// The remote endpoint and how sessions to it are pooled.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    /// Defaults to the well-known port of the TLS policy.
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default = "defaults::helo_domain")]
    pub helo_domain: String,
    /// Maximum number of idle sessions kept for reuse.
    #[serde(default = "defaults::max_idle")]
    pub max_idle: usize,
    #[serde(default)]
    pub tls: TlsPolicy,
    /// **SECURITY WARNING**: disables certificate validation. Testing only.
    #[serde(default)]
    pub accept_invalid_certs: bool,
    #[serde(default)]
    pub timeouts: ClientTimeouts,
}

impl SmtpConfig {
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            helo_domain: defaults::helo_domain(),
            max_idle: defaults::max_idle(),
            tls: TlsPolicy::default(),
            accept_invalid_certs: false,
            timeouts: ClientTimeouts::default(),
        }
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.tls.default_port())
    }

    /// `host:port`, as dialed.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port())
    }
}

mod defaults {
    pub fn helo_domain() -> String {
        "localhost".to_string()
    }

    pub const fn max_idle() -> usize {
        4
    }
}
