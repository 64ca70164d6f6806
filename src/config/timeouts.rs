//! Per-command timeouts for client sessions.
//!
//! Every network step runs under one of these limits, so a hung server
//! fails the step instead of blocking its caller forever.

use std::time::Duration;

use serde::Deserialize;

/// Client-side SMTP timeout configuration, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientTimeouts {
    /// Establishing TCP and, for implicit TLS, the TLS handshake.
    ///
    /// Default: 30 seconds
    pub connect_secs: u64,

    /// Waiting for the 220 greeting.
    ///
    /// Default: 30 seconds
    pub greeting_secs: u64,

    /// EHLO/HELO command.
    ///
    /// Default: 30 seconds
    pub ehlo_secs: u64,

    /// STARTTLS command and the following handshake.
    ///
    /// Default: 30 seconds
    pub starttls_secs: u64,

    /// Each step of the AUTH exchange.
    ///
    /// Default: 30 seconds
    pub auth_secs: u64,

    /// MAIL FROM command, also used for RSET.
    ///
    /// Default: 30 seconds
    pub mail_from_secs: u64,

    /// Each RCPT TO command.
    ///
    /// Default: 30 seconds
    pub rcpt_to_secs: u64,

    /// DATA command, payload transfer, and the final reply.
    ///
    /// Default: 120 seconds (2 minutes)
    pub data_secs: u64,

    /// QUIT command when closing a session.
    ///
    /// Default: 10 seconds
    pub quit_secs: u64,
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: 30,
            greeting_secs: 30,
            ehlo_secs: 30,
            starttls_secs: 30,
            auth_secs: 30,
            mail_from_secs: 30,
            rcpt_to_secs: 30,
            data_secs: 120,
            quit_secs: 10,
        }
    }
}

impl ClientTimeouts {
    #[must_use]
    pub const fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    #[must_use]
    pub const fn greeting(&self) -> Duration {
        Duration::from_secs(self.greeting_secs)
    }

    #[must_use]
    pub const fn ehlo(&self) -> Duration {
        Duration::from_secs(self.ehlo_secs)
    }

    #[must_use]
    pub const fn starttls(&self) -> Duration {
        Duration::from_secs(self.starttls_secs)
    }

    #[must_use]
    pub const fn auth(&self) -> Duration {
        Duration::from_secs(self.auth_secs)
    }

    #[must_use]
    pub const fn mail_from(&self) -> Duration {
        Duration::from_secs(self.mail_from_secs)
    }

    #[must_use]
    pub const fn rcpt_to(&self) -> Duration {
        Duration::from_secs(self.rcpt_to_secs)
    }

    #[must_use]
    pub const fn data(&self) -> Duration {
        Duration::from_secs(self.data_secs)
    }

    #[must_use]
    pub const fn quit(&self) -> Duration {
        Duration::from_secs(self.quit_secs)
    }
}
