//! In-memory doubles for the pool and mailer tests.
//!
//! An [`Endpoint`] plays the remote server: it records every command issued
//! by any of its sessions and can be told to refuse connections, reject a
//! recipient, or break a session at a given command.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
};

use parking_lot::Mutex;
use tokio::sync::{Notify, watch};

use crate::{
    client::{Capabilities, ClientError, Credentials, Response},
    error::ConnectionError,
    traits::{Connector, Session},
};

static NEXT_MOCK_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Default)]
struct State {
    dialed: AtomicUsize,
    refuse: AtomicBool,
    advertise_auth: AtomicBool,
    size_limit: Mutex<Option<usize>>,
    reject_auth: AtomicBool,
    reject_recipient: Mutex<Option<String>>,
    break_on: Mutex<Option<&'static str>>,
    commands: Mutex<Vec<(u64, String)>>,
    payloads: Mutex<Vec<Vec<u8>>>,
    closed: Mutex<Vec<u64>>,
    pending_dial: Notify,
    gate: Mutex<Option<watch::Sender<bool>>>,
}

/// Shared, scriptable server state.
#[derive(Clone, Default)]
pub struct Endpoint(Arc<State>);

impl Endpoint {
    pub fn refuse_connections(&self) {
        self.0.refuse.store(true, Ordering::SeqCst);
    }

    pub fn advertise_auth(&self) {
        self.0.advertise_auth.store(true, Ordering::SeqCst);
    }

    pub fn advertise_size(&self, limit: usize) {
        *self.0.size_limit.lock() = Some(limit);
    }

    pub fn reject_auth(&self) {
        self.0.reject_auth.store(true, Ordering::SeqCst);
    }

    pub fn reject_recipient(&self, recipient: &str) {
        *self.0.reject_recipient.lock() = Some(recipient.to_string());
    }

    /// The named command fails with a transport error instead of a reply.
    pub fn break_on(&self, command: &'static str) {
        *self.0.break_on.lock() = Some(command);
    }

    pub fn dialed(&self) -> usize {
        self.0.dialed.load(Ordering::SeqCst)
    }

    /// Commands in the order they were received, without session ids.
    pub fn commands(&self) -> Vec<String> {
        self.0
            .commands
            .lock()
            .iter()
            .map(|(_, command)| command.clone())
            .collect()
    }

    /// Ids of the sessions each command arrived on.
    pub fn sessions_used(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.0.commands.lock().iter().map(|(id, _)| *id).collect();
        ids.dedup();
        ids
    }

    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.0.payloads.lock().clone()
    }

    pub fn closed(&self) -> Vec<u64> {
        self.0.closed.lock().clone()
    }

    /// New dials wait until [`Self::release_dials`].
    pub fn hold_dials(&self) {
        let (sender, _) = watch::channel(true);
        *self.0.gate.lock() = Some(sender);
    }

    pub fn release_dials(&self) {
        if let Some(sender) = self.0.gate.lock().take() {
            sender.send_replace(false);
        }
    }

    pub async fn wait_for_pending_dial(&self) {
        self.0.pending_dial.notified().await;
    }

    fn record(&self, id: u64, command: String) -> Result<(), ClientError> {
        let name = command.split_whitespace().next().unwrap_or_default().to_string();
        self.0.commands.lock().push((id, command));

        if self.0.break_on.lock().is_some_and(|broken| broken == name) {
            return Err(ClientError::ConnectionClosed);
        }
        Ok(())
    }
}

pub struct MockConnector {
    endpoint: Endpoint,
}

impl MockConnector {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    pub fn dialed(&self) -> usize {
        self.endpoint.dialed()
    }
}

impl Connector for MockConnector {
    type Session = MockSession;

    fn endpoint(&self) -> &str {
        "mock.example.com:465"
    }

    async fn connect(&self) -> Result<MockSession, ConnectionError> {
        let gate = self
            .endpoint
            .0
            .gate
            .lock()
            .as_ref()
            .map(watch::Sender::subscribe);
        if let Some(mut gate) = gate {
            self.endpoint.0.pending_dial.notify_one();
            let _ = gate.wait_for(|held| !held).await;
        }

        if self.endpoint.0.refuse.load(Ordering::SeqCst) {
            return Err(ConnectionError::Connect {
                endpoint: self.endpoint().to_string(),
                source: ClientError::ConnectionClosed,
            });
        }

        self.endpoint.0.dialed.fetch_add(1, Ordering::SeqCst);

        let mut extensions = vec!["mock.example.com".to_string()];
        if self.endpoint.0.advertise_auth.load(Ordering::SeqCst) {
            extensions.push("AUTH PLAIN LOGIN".to_string());
        }
        if let Some(limit) = *self.endpoint.0.size_limit.lock() {
            extensions.push(format!("SIZE {limit}"));
        }

        Ok(MockSession {
            id: NEXT_MOCK_ID.fetch_add(1, Ordering::Relaxed),
            endpoint: self.endpoint.clone(),
            capabilities: Capabilities::from_ehlo(&Response::new(250, extensions)),
            authenticated_as: None,
            broken: false,
            data: None,
        })
    }
}

pub struct MockSession {
    id: u64,
    endpoint: Endpoint,
    capabilities: Capabilities,
    authenticated_as: Option<String>,
    broken: bool,
    data: Option<Vec<u8>>,
}

impl MockSession {
    pub fn break_session(&mut self) {
        self.broken = true;
    }

    fn command(&mut self, command: String) -> Result<(), ClientError> {
        let result = self.endpoint.record(self.id, command);
        if result.is_err() {
            self.broken = true;
        }
        result
    }
}

fn rejected(code: u16, message: &str) -> ClientError {
    ClientError::Rejected {
        code,
        message: message.to_string(),
    }
}

impl Session for MockSession {
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

    async fn authenticate(&mut self, credentials: &Credentials) -> Result<(), ClientError> {
        self.command(format!("AUTH {}", credentials.username()))?;
        if self.endpoint.0.reject_auth.load(Ordering::SeqCst) {
            return Err(rejected(535, "Authentication credentials invalid"));
        }
        self.authenticated_as = Some(credentials.username().to_string());
        Ok(())
    }

    async fn mail_from(&mut self, sender: &str) -> Result<(), ClientError> {
        self.command(format!("MAIL FROM:<{sender}>"))
    }

    async fn rcpt_to(&mut self, recipient: &str) -> Result<(), ClientError> {
        self.command(format!("RCPT TO:<{recipient}>"))?;
        if self
            .endpoint
            .0
            .reject_recipient
            .lock()
            .as_deref()
            .is_some_and(|address| address == recipient)
        {
            return Err(rejected(550, "User unknown"));
        }
        Ok(())
    }

    async fn data(&mut self) -> Result<(), ClientError> {
        self.command("DATA".to_string())?;
        self.data = Some(Vec::new());
        Ok(())
    }

    async fn write_data(&mut self, payload: &[u8]) -> Result<(), ClientError> {
        match self.data.as_mut() {
            Some(data) => {
                data.extend_from_slice(payload);
                Ok(())
            }
            None => Err(ClientError::ConnectionClosed),
        }
    }

    async fn end_data(&mut self) -> Result<(), ClientError> {
        self.command(".".to_string())?;
        let payload = self.data.take().ok_or(ClientError::ConnectionClosed)?;
        self.endpoint.0.payloads.lock().push(payload);
        Ok(())
    }

    async fn reset(&mut self) -> Result<(), ClientError> {
        self.command("RSET".to_string())
    }

    async fn close(self) -> Result<(), ClientError> {
        self.endpoint.0.closed.lock().push(self.id);
        Ok(())
    }
}
