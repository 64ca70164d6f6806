//! SMTP client primitives the pool and mailer are built on.
//!
//! - [`SmtpConnector`] dials the configured endpoint, applies the TLS policy
//!   and performs the greeting and EHLO exchange
//! - [`SmtpSession`] issues commands over one established session, each
//!   under its configured timeout

pub mod auth;
pub mod connection;
pub mod error;
pub mod extensions;
pub mod response;
pub mod session;

pub use auth::{Credentials, Mechanism};
pub use error::{ClientError, Result};
pub use extensions::Capabilities;
pub use response::{ReplyLine, Response};
pub use session::SmtpSession;

use self::connection::{BoxedStream, Tls};
use crate::{
    config::{ClientTimeouts, SmtpConfig, TlsPolicy},
    error::ConnectionError,
    internal,
    traits::{Connector, Session},
};

/// Dials new sessions to one endpoint.
pub struct SmtpConnector {
    host: String,
    endpoint: String,
    helo_domain: String,
    policy: TlsPolicy,
    tls: Option<Tls>,
    timeouts: ClientTimeouts,
}

impl SmtpConnector {
    /// Prepares a connector from configuration. No connection is made yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS configuration cannot be built.
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let tls = match config.tls {
            TlsPolicy::Disabled => None,
            TlsPolicy::Implicit | TlsPolicy::Starttls => {
                Some(Tls::new(config.accept_invalid_certs)?)
            }
        };

        Ok(Self {
            host: config.host.clone(),
            endpoint: config.endpoint(),
            helo_domain: config.helo_domain.clone(),
            policy: config.tls,
            tls,
            timeouts: config.timeouts,
        })
    }

    /// TCP connect, plus the TLS handshake under implicit TLS.
    async fn open(&self) -> Result<(BoxedStream, bool)> {
        let stream: BoxedStream = Box::new(connection::dial(&self.endpoint).await?);

        match (&self.tls, self.policy) {
            (Some(tls), TlsPolicy::Implicit) => Ok((tls.wrap(&self.host, stream).await?, true)),
            _ => Ok((stream, false)),
        }
    }

    fn handshake_error(&self) -> impl FnOnce(ClientError) -> ConnectionError + '_ {
        |source| ConnectionError::Handshake {
            endpoint: self.endpoint.clone(),
            source,
        }
    }
}

impl Connector for SmtpConnector {
    type Session = SmtpSession;

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[tracing::instrument(level = "debug", skip(self), fields(endpoint = %self.endpoint))]
    async fn connect(&self) -> std::result::Result<SmtpSession, ConnectionError> {
        let limit = self.timeouts.connect();
        let opened = match tokio::time::timeout(limit, self.open()).await {
            Ok(opened) => opened,
            Err(_) => Err(ClientError::Timeout {
                command: "connect",
                after: limit,
            }),
        };
        let (stream, encrypted) = opened.map_err(|source| ConnectionError::Connect {
            endpoint: self.endpoint.clone(),
            source,
        })?;

        let mut session = SmtpSession::new(self.host.clone(), stream, encrypted, self.timeouts);
        session
            .handshake(&self.helo_domain)
            .await
            .map_err(self.handshake_error())?;

        if self.policy == TlsPolicy::Starttls {
            if !session.capabilities().supports_starttls() {
                return Err(ConnectionError::StarttlsUnavailable {
                    endpoint: self.endpoint.clone(),
                });
            }

            if let Some(tls) = &self.tls {
                session = session
                    .starttls(tls, &self.helo_domain)
                    .await
                    .map_err(self.handshake_error())?;
            }
        }

        internal!(
            level = DEBUG,
            "Session {} established to {} (tls: {}, extensions: {})",
            session.id(),
            self.endpoint,
            session.is_encrypted(),
            session.capabilities()
        );

        Ok(session)
    }
}
