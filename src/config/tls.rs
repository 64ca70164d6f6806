//! TLS settings for client sessions.

use serde::Deserialize;

/// How a session is encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TlsPolicy {
    /// TLS from the first byte (submissions port 465).
    #[default]
    Implicit,

    /// Connect in plaintext, then upgrade with STARTTLS (port 587).
    ///
    /// The session fails if the server does not advertise STARTTLS.
    Starttls,

    /// Never use TLS.
    ///
    /// **WARNING**: Only for local relays and testing.
    Disabled,
}

impl TlsPolicy {
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Implicit => 465,
            Self::Starttls => 587,
            Self::Disabled => 25,
        }
    }
}
