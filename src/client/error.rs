//! Error types for the SMTP client primitives.

use std::io;

use thiserror::Error;

/// Errors raised while talking to the remote server over one session.
#[derive(Error, Debug)]
pub enum ClientError {
    /// IO error occurred during network operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The server did not answer within the configured limit.
    #[error("{command} timed out after {after:?}")]
    Timeout {
        command: &'static str,
        after: std::time::Duration,
    },

    /// Failed to parse an SMTP reply from the server.
    #[error("Failed to parse SMTP response: {0}")]
    Parse(String),

    /// The server answered with a status code the command does not accept.
    #[error("SMTP error: {code} - {message}")]
    Rejected { code: u16, message: String },

    /// TLS/SSL error occurred.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Connection was closed unexpectedly.
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    /// The server advertised AUTH without a mechanism this client speaks.
    #[error("No supported authentication mechanism (server offers: {0})")]
    NoSupportedMechanism(String),

    /// Credentials would travel in the clear to a non-loopback host.
    #[error("Refusing to authenticate over an unencrypted connection to {0}")]
    InsecureAuth(String),
}

impl ClientError {
    /// Returns `true` if the server answered with a well-formed reply.
    ///
    /// Rejections leave the session usable; every other variant means the
    /// stream is in an unknown state.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Rejected { .. } | Self::NoSupportedMechanism(_) | Self::InsecureAuth(_)
        )
    }

    /// The SMTP status code, if the server sent one.
    #[must_use]
    pub const fn code(&self) -> Option<u16> {
        match self {
            Self::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Specialized `Result` type for SMTP client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
