//! Typed errors for pooled sending.
//!
//! Three layers:
//! - [`ConnectionError`]: a session could not be established
//! - [`SendError`]: one `send()` call failed, tagged with the protocol phase
//! - [`ConfigError`]: the configuration file could not be loaded

use core::fmt::{self, Display};

use thiserror::Error;

use crate::client::ClientError;

/// Establishing a new session failed.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// TCP connect or TLS handshake failed.
    #[error("Failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: ClientError,
    },

    /// The greeting or EHLO/HELO exchange failed.
    #[error("Handshake with {endpoint} failed: {source}")]
    Handshake {
        endpoint: String,
        #[source]
        source: ClientError,
    },

    /// STARTTLS was required but the server does not advertise it.
    #[error("{endpoint} does not advertise STARTTLS")]
    StarttlsUnavailable { endpoint: String },
}

/// The protocol step a send failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    SenderDeclaration,
    RecipientDeclaration,
    PayloadOpen,
    PayloadWrite,
    PayloadClose,
}

impl Display for Phase {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Self::SenderDeclaration => "failed to set sender",
            Self::RecipientDeclaration => "failed to set recipient",
            Self::PayloadOpen => "failed to open data transfer",
            Self::PayloadWrite => "failed to write body",
            Self::PayloadClose => "failed to close data transfer",
        })
    }
}

/// A single `send()` call failed. None of these are retried.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("Failed to get connection from pool: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Failed to authenticate: {0}")]
    Authentication(#[source] ClientError),

    #[error("{phase}: {source}")]
    Protocol {
        phase: Phase,
        #[source]
        source: ClientError,
    },

    #[error("Message has no recipients")]
    NoRecipients,

    /// The composed message exceeds the limit the server advertised in `SIZE`.
    #[error("Message of {size} bytes exceeds the server limit of {limit} bytes")]
    TooLarge { size: usize, limit: usize },
}

impl SendError {
    pub(crate) fn protocol(phase: Phase) -> impl FnOnce(ClientError) -> Self {
        move |source| Self::Protocol { phase, source }
    }

    /// The phase a protocol failure happened in, if any.
    #[must_use]
    pub const fn phase(&self) -> Option<Phase> {
        match self {
            Self::Protocol { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// The underlying client error, for failures that reached the server.
    #[must_use]
    pub const fn client_error(&self) -> Option<&ClientError> {
        match self {
            Self::Authentication(source) | Self::Protocol { source, .. } => Some(source),
            Self::Connection(_) | Self::NoRecipients | Self::TooLarge { .. } => None,
        }
    }
}

/// Loading the configuration file failed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Toml(#[from] toml::de::Error),
}
