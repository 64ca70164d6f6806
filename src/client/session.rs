//! A single SMTP session: command/reply exchange over a buffered stream.

use std::{
    net::IpAddr,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};

use super::{
    auth::{Credentials, Mechanism},
    connection::{BoxedStream, Tls},
    error::{ClientError, Result},
    extensions::Capabilities,
    response::{ReplyLine, Response},
};
use crate::{config::ClientTimeouts, incoming, outgoing, traits::Session};

/// Longest reply line accepted from the server.
const MAX_LINE_LENGTH: u64 = 8192;

/// Maximum size of a complete, possibly multi-line, reply (1MB).
const MAX_REPLY_SIZE: usize = 1024 * 1024;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Encodes the DATA stream: bare LF becomes CRLF and lines starting with
/// `.` get an extra `.` (RFC 5321 section 4.5.2).
#[derive(Debug)]
struct DotStuffer {
    at_line_start: bool,
    after_cr: bool,
}

impl Default for DotStuffer {
    fn default() -> Self {
        Self {
            at_line_start: true,
            after_cr: false,
        }
    }
}

impl DotStuffer {
    fn encode(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut encoded = Vec::with_capacity(chunk.len() + chunk.len() / 64 + 2);

        for &byte in chunk {
            if byte == b'\n' {
                if !self.after_cr {
                    encoded.push(b'\r');
                }
                encoded.push(b'\n');
                self.at_line_start = true;
            } else {
                if self.at_line_start && byte == b'.' {
                    encoded.push(b'.');
                }
                encoded.push(byte);
                self.at_line_start = false;
            }
            self.after_cr = byte == b'\r';
        }

        encoded
    }

    /// The end-of-data marker, preceded by a line break if the body lacks one.
    const fn finish(&self) -> &'static [u8] {
        if self.at_line_start {
            b".\r\n"
        } else {
            b"\r\n.\r\n"
        }
    }
}

/// An established (and possibly authenticated) SMTP session.
pub struct SmtpSession {
    id: u64,
    host: String,
    stream: BufStream<BoxedStream>,
    capabilities: Capabilities,
    timeouts: ClientTimeouts,
    encrypted: bool,
    authenticated_as: Option<String>,
    broken: bool,
    data: Option<DotStuffer>,
}

impl SmtpSession {
    /// Wraps a connected stream. Nothing is sent until [`Self::handshake`].
    pub fn new(
        host: impl Into<String>,
        stream: BoxedStream,
        encrypted: bool,
        timeouts: ClientTimeouts,
    ) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            host: host.into(),
            stream: BufStream::new(stream),
            capabilities: Capabilities::default(),
            timeouts,
            encrypted,
            authenticated_as: None,
            broken: false,
            data: None,
        }
    }

    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Reads the 220 greeting, then introduces the client.
    ///
    /// # Errors
    ///
    /// Returns an error if the greeting is not 220 or EHLO and HELO both fail.
    pub async fn handshake(&mut self, helo_domain: &str) -> Result<()> {
        let limit = self.timeouts.greeting();
        let greeting = match tokio::time::timeout(limit, self.read_reply()).await {
            Ok(reply) => reply,
            Err(_) => Err(ClientError::Timeout {
                command: "greeting",
                after: limit,
            }),
        };
        self.track(greeting)?.expect(|reply| reply.code == 220)?;

        self.hello(helo_domain).await
    }

    /// Sends EHLO, falling back to HELO when the server rejects it.
    ///
    /// # Errors
    ///
    /// Returns an error if neither greeting is accepted.
    pub async fn hello(&mut self, helo_domain: &str) -> Result<()> {
        let limit = self.timeouts.ehlo();
        let reply = self
            .exchange("EHLO", &format!("EHLO {helo_domain}"), limit)
            .await?;

        if reply.is_success() {
            self.capabilities = Capabilities::from_ehlo(&reply);
            return Ok(());
        }

        self.exchange("HELO", &format!("HELO {helo_domain}"), limit)
            .await?
            .expect(Response::is_success)?;
        self.capabilities = Capabilities::default();
        Ok(())
    }

    /// Upgrades the session with STARTTLS and repeats EHLO over TLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the server refuses STARTTLS, the handshake fails,
    /// or EHLO over the new channel fails.
    pub async fn starttls(mut self, tls: &Tls, helo_domain: &str) -> Result<Self> {
        let limit = self.timeouts.starttls();
        self.exchange("STARTTLS", "STARTTLS", limit)
            .await?
            .expect(|reply| reply.code == 220)?;

        let Self {
            host,
            stream,
            timeouts,
            ..
        } = self;

        let stream = match tokio::time::timeout(limit, tls.wrap(&host, stream.into_inner())).await
        {
            Ok(stream) => stream?,
            Err(_) => {
                return Err(ClientError::Timeout {
                    command: "TLS handshake",
                    after: limit,
                });
            }
        };

        let mut upgraded = Self::new(host, stream, true, timeouts);
        upgraded.hello(helo_domain).await?;
        Ok(upgraded)
    }

    /// Sends one command line and reads the reply under a time limit.
    ///
    /// Transport failures mark the session broken; a rejection is returned
    /// as a reply for the caller to judge.
    async fn exchange(
        &mut self,
        command: &'static str,
        line: &str,
        limit: Duration,
    ) -> Result<Response> {
        if command == "AUTH" {
            outgoing!("{} <redacted>", command);
        } else {
            outgoing!("{}", line);
        }

        let result = match tokio::time::timeout(limit, self.roundtrip(line)).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout {
                command,
                after: limit,
            }),
        };

        self.track(result)
    }

    async fn roundtrip(&mut self, line: &str) -> Result<Response> {
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\r\n").await?;
        self.stream.flush().await?;
        self.read_reply().await
    }

    async fn read_reply(&mut self) -> Result<Response> {
        let mut lines = Vec::new();
        let mut total = 0;

        loop {
            let mut buffer = String::new();
            let read = (&mut self.stream)
                .take(MAX_LINE_LENGTH)
                .read_line(&mut buffer)
                .await?;

            if read == 0 {
                return Err(ClientError::ConnectionClosed);
            }
            if !buffer.ends_with('\n') {
                return Err(if read as u64 >= MAX_LINE_LENGTH {
                    ClientError::Parse(format!("Reply line exceeds {MAX_LINE_LENGTH} bytes"))
                } else {
                    ClientError::ConnectionClosed
                });
            }

            total += read;
            if total > MAX_REPLY_SIZE {
                return Err(ClientError::Parse(format!(
                    "Reply too large (exceeds {MAX_REPLY_SIZE} bytes)"
                )));
            }

            incoming!("{}", buffer.trim_end());
            let line = ReplyLine::parse(&buffer)?;
            let is_last = line.is_last;
            lines.push(line);

            if is_last {
                return Response::from_lines(lines);
            }
        }
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(error) = &result
            && !error.is_rejection()
        {
            self.broken = true;
        }
        result
    }

    async fn auth_plain(&mut self, credentials: &Credentials) -> Result<()> {
        let limit = self.timeouts.auth();
        self.exchange("AUTH", &format!("AUTH PLAIN {}", credentials.plain()), limit)
            .await?
            .expect(|reply| reply.code == 235)?;
        Ok(())
    }

    async fn auth_login(&mut self, credentials: &Credentials) -> Result<()> {
        let limit = self.timeouts.auth();
        self.exchange("AUTH", "AUTH LOGIN", limit)
            .await?
            .expect(|reply| reply.code == 334)?;
        self.exchange("AUTH", &credentials.login_username(), limit)
            .await?
            .expect(|reply| reply.code == 334)?;
        self.exchange("AUTH", &credentials.login_password(), limit)
            .await?
            .expect(|reply| reply.code == 235)?;
        Ok(())
    }

    fn is_loopback(&self) -> bool {
        self.host.eq_ignore_ascii_case("localhost")
            || self
                .host
                .trim_start_matches('[')
                .trim_end_matches(']')
                .parse::<IpAddr>()
                .is_ok_and(|ip| ip.is_loopback())
    }
}

impl Session for SmtpSession {
    fn id(&self) -> u64 {
        self.id
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn authenticated_as(&self) -> Option<&str> {
        self.authenticated_as.as_deref()
    }

    fn is_broken(&self) -> bool {
        self.broken
    }

    async fn authenticate(&mut self, credentials: &Credentials) -> Result<()> {
        let Some(mechanism) = Mechanism::select(&self.capabilities.auth_mechanisms()) else {
            return Err(ClientError::NoSupportedMechanism(
                self.capabilities
                    .params("AUTH")
                    .unwrap_or_default()
                    .join(" "),
            ));
        };

        if !self.encrypted && !self.is_loopback() {
            return Err(ClientError::InsecureAuth(self.host.clone()));
        }

        match mechanism {
            Mechanism::Plain => self.auth_plain(credentials).await?,
            Mechanism::Login => self.auth_login(credentials).await?,
        }

        self.authenticated_as = Some(credentials.username().to_string());
        Ok(())
    }

    async fn mail_from(&mut self, sender: &str) -> Result<()> {
        let limit = self.timeouts.mail_from();
        self.exchange("MAIL", &format!("MAIL FROM:<{sender}>"), limit)
            .await?
            .expect(Response::is_success)?;
        Ok(())
    }

    async fn rcpt_to(&mut self, recipient: &str) -> Result<()> {
        let limit = self.timeouts.rcpt_to();
        self.exchange("RCPT", &format!("RCPT TO:<{recipient}>"), limit)
            .await?
            .expect(Response::is_success)?;
        Ok(())
    }

    async fn data(&mut self) -> Result<()> {
        let limit = self.timeouts.data();
        self.exchange("DATA", "DATA", limit)
            .await?
            .expect(Response::is_intermediate)?;
        self.data = Some(DotStuffer::default());
        Ok(())
    }

    async fn write_data(&mut self, payload: &[u8]) -> Result<()> {
        let Some(stuffer) = self.data.as_mut() else {
            return self.track(Err(ClientError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "DATA has not been accepted",
            ))));
        };
        let encoded = stuffer.encode(payload);

        let limit = self.timeouts.data();
        let result = match tokio::time::timeout(limit, self.stream.write_all(&encoded)).await {
            Ok(written) => written.map_err(ClientError::from),
            Err(_) => Err(ClientError::Timeout {
                command: "message body",
                after: limit,
            }),
        };
        self.track(result)
    }

    async fn end_data(&mut self) -> Result<()> {
        let Some(stuffer) = self.data.take() else {
            return self.track(Err(ClientError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "DATA has not been accepted",
            ))));
        };
        outgoing!("{}", "<end of data>");

        let limit = self.timeouts.data();
        let result = match tokio::time::timeout(limit, async {
            self.stream.write_all(stuffer.finish()).await?;
            self.stream.flush().await?;
            self.read_reply().await
        })
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout {
                command: "end of data",
                after: limit,
            }),
        };

        self.track(result)?.expect(Response::is_success)?;
        Ok(())
    }

    async fn reset(&mut self) -> Result<()> {
        let limit = self.timeouts.mail_from();
        let result = match self.exchange("RSET", "RSET", limit).await {
            Ok(reply) => reply.expect(Response::is_success).map(drop),
            Err(error) => Err(error),
        };

        if result.is_err() {
            self.broken = true;
        }
        result
    }

    async fn close(mut self) -> Result<()> {
        if !self.broken {
            let limit = self.timeouts.quit();
            self.exchange("QUIT", "QUIT", limit).await?;
        }

        self.stream.shutdown().await?;
        Ok(())
    }
}
