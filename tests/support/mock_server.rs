//! Mock SMTP submission server for end-to-end tests
//!
//! Speaks just enough SMTP for the mailer: greeting, EHLO/HELO, AUTH PLAIN,
//! MAIL, RCPT, DATA, RSET and QUIT. Every command (and every message body,
//! exactly as it arrived on the wire) is recorded for later inspection.
#![allow(dead_code)]

use std::{
    collections::HashSet,
    fmt::Write,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
    time::timeout,
};

/// SMTP command received by the mock server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    Ehlo(String),
    Helo(String),
    /// The decoded `authzid\0authcid\0passwd` triple
    AuthPlain(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    /// Raw body bytes after DATA, still dot-stuffed, without the final `.`
    MessageContent(Vec<u8>),
    Rset,
    Quit,
    Other(String),
}

#[derive(Debug, Clone)]
struct SmtpResponse {
    code: u16,
    message: String,
}

impl SmtpResponse {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

#[derive(Clone)]
struct MockServerConfig {
    capabilities: Vec<String>,
    credentials: Option<(String, String)>,
    rejected_recipients: HashSet<String>,
    drop_on_data: bool,
    silent_on_mail: bool,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            capabilities: vec!["localhost".to_string(), "SIZE 10000000".to_string()],
            credentials: None,
            rejected_recipients: HashSet::new(),
            drop_on_data: false,
            silent_on_mail: false,
        }
    }
}

impl MockServerConfig {
    fn ehlo_response(&self) -> Vec<u8> {
        let mut response = String::new();
        let last = self.capabilities.len() - 1;

        for (i, capability) in self.capabilities.iter().enumerate() {
            let separator = if i < last { '-' } else { ' ' };
            let _ = write!(&mut response, "250{separator}{capability}\r\n");
        }

        response.into_bytes()
    }

    fn auth_response(&self, decoded: &str) -> SmtpResponse {
        let mut parts = decoded.split('\0').skip(1);
        let presented = (parts.next(), parts.next());

        match &self.credentials {
            Some((user, pass)) if presented == (Some(user.as_str()), Some(pass.as_str())) => {
                SmtpResponse::new(235, "2.7.0 Authentication successful")
            }
            _ => SmtpResponse::new(535, "5.7.8 Authentication credentials invalid"),
        }
    }
}

#[derive(Default)]
struct Recorded {
    commands: RwLock<Vec<SmtpCommand>>,
    connections: AtomicUsize,
    shutdown: AtomicBool,
}

/// Mock SMTP server for testing
pub struct MockSmtpServer {
    addr: SocketAddr,
    recorded: Arc<Recorded>,
}

impl MockSmtpServer {
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder {
            config: MockServerConfig::default(),
        }
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.recorded.commands.read().await.clone()
    }

    /// Bodies received so far, in arrival order.
    pub async fn messages(&self) -> Vec<Vec<u8>> {
        self.commands()
            .await
            .into_iter()
            .filter_map(|command| match command {
                SmtpCommand::MessageContent(content) => Some(content),
                _ => None,
            })
            .collect()
    }

    /// Number of TCP connections accepted.
    #[must_use]
    pub fn connections(&self) -> usize {
        self.recorded.connections.load(Ordering::SeqCst)
    }

    pub fn shutdown(&self) {
        self.recorded.shutdown.store(true, Ordering::Relaxed);
    }

    async fn handle_client(
        mut stream: TcpStream,
        config: Arc<MockServerConfig>,
        recorded: Arc<Recorded>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        writer
            .write_all(&SmtpResponse::new(220, "Mock SMTP Server").to_bytes())
            .await?;
        writer.flush().await?;

        loop {
            line.clear();

            let Ok(read) = timeout(Duration::from_secs(10), reader.read_line(&mut line)).await
            else {
                return Ok(());
            };
            if read? == 0 {
                return Ok(());
            }

            let cmd_line = line.trim_end();
            let (verb, argument) = cmd_line.split_once(' ').unwrap_or((cmd_line, ""));

            let (response, command) = match verb.to_uppercase().as_str() {
                "EHLO" => (config.ehlo_response(), SmtpCommand::Ehlo(argument.to_string())),
                "HELO" => (
                    SmtpResponse::new(250, "Hello").to_bytes(),
                    SmtpCommand::Helo(argument.to_string()),
                ),
                "AUTH" => {
                    let encoded = argument
                        .strip_prefix("PLAIN ")
                        .ok_or("only AUTH PLAIN with an initial response is supported")?;
                    let decoded = String::from_utf8(
                        base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded)?,
                    )?;
                    (
                        config.auth_response(&decoded).to_bytes(),
                        SmtpCommand::AuthPlain(decoded),
                    )
                }
                "MAIL" => {
                    if config.silent_on_mail {
                        recorded
                            .commands
                            .write()
                            .await
                            .push(SmtpCommand::MailFrom(argument.to_string()));
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        return Ok(());
                    }
                    (
                        SmtpResponse::new(250, "OK").to_bytes(),
                        SmtpCommand::MailFrom(argument.to_string()),
                    )
                }
                "RCPT" => {
                    let address = argument
                        .trim_start_matches("TO:")
                        .trim_matches(|c| c == '<' || c == '>');
                    let response = if config.rejected_recipients.contains(address) {
                        SmtpResponse::new(550, "5.1.1 User unknown")
                    } else {
                        SmtpResponse::new(250, "OK")
                    };
                    (
                        response.to_bytes(),
                        SmtpCommand::RcptTo(argument.to_string()),
                    )
                }
                "DATA" => {
                    recorded.commands.write().await.push(SmtpCommand::Data);
                    if config.drop_on_data {
                        return Ok(());
                    }

                    writer
                        .write_all(
                            &SmtpResponse::new(354, "Start mail input; end with <CRLF>.<CRLF>")
                                .to_bytes(),
                        )
                        .await?;
                    writer.flush().await?;

                    let mut content = Vec::new();
                    let mut data_line = Vec::new();
                    loop {
                        data_line.clear();
                        if reader.read_until(b'\n', &mut data_line).await? == 0 {
                            return Ok(());
                        }
                        if data_line == b".\r\n" {
                            break;
                        }
                        content.extend_from_slice(&data_line);
                    }

                    recorded
                        .commands
                        .write()
                        .await
                        .push(SmtpCommand::MessageContent(content));
                    writer
                        .write_all(&SmtpResponse::new(250, "OK: Message accepted").to_bytes())
                        .await?;
                    writer.flush().await?;
                    continue;
                }
                "RSET" => (SmtpResponse::new(250, "OK").to_bytes(), SmtpCommand::Rset),
                "QUIT" => {
                    recorded.commands.write().await.push(SmtpCommand::Quit);
                    writer
                        .write_all(&SmtpResponse::new(221, "Bye").to_bytes())
                        .await?;
                    writer.flush().await?;
                    return Ok(());
                }
                _ => (
                    SmtpResponse::new(500, "Unknown command").to_bytes(),
                    SmtpCommand::Other(cmd_line.to_string()),
                ),
            };

            recorded.commands.write().await.push(command);
            writer.write_all(&response).await?;
            writer.flush().await?;
        }
    }
}

/// Builder for configuring a `MockSmtpServer`
pub struct MockSmtpServerBuilder {
    config: MockServerConfig,
}

impl MockSmtpServerBuilder {
    /// Advertise `AUTH PLAIN` and accept exactly these credentials.
    #[must_use]
    pub fn with_auth(mut self, username: &str, password: &str) -> Self {
        self.config.capabilities.push("AUTH PLAIN".to_string());
        self.config.credentials = Some((username.to_string(), password.to_string()));
        self
    }

    /// Answer `RCPT TO` for this address with 550.
    #[must_use]
    pub fn with_rejected_recipient(mut self, address: &str) -> Self {
        self.config.rejected_recipients.insert(address.to_string());
        self
    }

    /// Close the connection instead of answering DATA.
    #[must_use]
    pub const fn with_drop_on_data(mut self) -> Self {
        self.config.drop_on_data = true;
        self
    }

    /// Read `MAIL FROM` and never answer it.
    #[must_use]
    pub const fn with_silent_mail_from(mut self) -> Self {
        self.config.silent_on_mail = true;
        self
    }

    /// Bind to a random loopback port and start serving.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to a port
    pub async fn build(self) -> Result<MockSmtpServer, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = Arc::new(self.config);
        let recorded = Arc::new(Recorded::default());

        let server = Arc::clone(&recorded);
        tokio::spawn(async move {
            while !server.shutdown.load(Ordering::Relaxed) {
                let accepted = timeout(Duration::from_millis(100), listener.accept()).await;

                if let Ok(Ok((stream, _peer))) = accepted {
                    server.connections.fetch_add(1, Ordering::SeqCst);
                    let config = Arc::clone(&config);
                    let recorded = Arc::clone(&server);

                    tokio::spawn(async move {
                        let _ = MockSmtpServer::handle_client(stream, config, recorded).await;
                    });
                }
            }
        });

        Ok(MockSmtpServer { addr, recorded })
    }
}
