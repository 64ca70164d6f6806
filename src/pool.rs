//! Reuse of established sessions to one endpoint.
//!
//! Idle sessions are kept on a stack, so the most recently returned (and
//! most likely still warm) session is handed out first. The capacity bounds
//! only how many idle sessions are *retained*; concurrent borrowers beyond
//! it each get a freshly dialed session, which is closed on return if the
//! stack is already full.
//!
//! The lock guards only the push/pop of the stack. Dialing and closing
//! happen outside it, so a slow handshake never blocks other borrowers.

use parking_lot::Mutex;

use crate::{
    error::ConnectionError,
    internal,
    traits::{Connector, Session},
};

pub struct ConnectionPool<C: Connector> {
    connector: C,
    max_idle: usize,
    idle: Mutex<Vec<C::Session>>,
}

impl<C: Connector> ConnectionPool<C> {
    #[must_use]
    pub fn new(connector: C, max_idle: usize) -> Self {
        Self {
            connector,
            max_idle,
            idle: Mutex::new(Vec::with_capacity(max_idle)),
        }
    }

    /// Borrows a session: the most recently released idle one, or a new one.
    ///
    /// Every successful call must be paired with one [`Self::release`].
    ///
    /// # Errors
    ///
    /// Returns an error if no idle session exists and dialing fails.
    pub async fn acquire(&self) -> Result<C::Session, ConnectionError> {
        let reused = self.idle.lock().pop();

        if let Some(session) = reused {
            internal!(
                level = DEBUG,
                "Reusing session {} to {}",
                session.id(),
                self.connector.endpoint()
            );
            return Ok(session);
        }

        self.acquire_new().await
    }

    /// Dials a new session without looking at the idle stack.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or handshake fails.
    pub async fn acquire_new(&self) -> Result<C::Session, ConnectionError> {
        internal!(
            level = DEBUG,
            "Dialing new session to {}",
            self.connector.endpoint()
        );
        self.connector.connect().await
    }

    /// Returns a borrowed session.
    ///
    /// Healthy sessions are kept while there is room; broken sessions and
    /// overflow are closed. Close failures are logged and otherwise ignored.
    pub async fn release(&self, session: C::Session) {
        let overflow = if session.is_broken() {
            internal!(level = DEBUG, "Discarding broken session {}", session.id());
            Some(session)
        } else {
            let mut idle = self.idle.lock();
            if idle.len() < self.max_idle {
                internal!(
                    "Returning session {} (idle: {})",
                    session.id(),
                    idle.len() + 1
                );
                idle.push(session);
                None
            } else {
                Some(session)
            }
        };

        if let Some(session) = overflow {
            Self::close(session).await;
        }
    }

    /// Closes every idle session. Sessions currently borrowed are not
    /// affected and will still be accepted by [`Self::release`].
    pub async fn shutdown(&self) {
        let drained = std::mem::take(&mut *self.idle.lock());

        internal!(
            level = DEBUG,
            "Closing {} idle sessions to {}",
            drained.len(),
            self.connector.endpoint()
        );

        for session in drained {
            Self::close(session).await;
        }
    }

    /// Number of sessions currently idle.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    #[must_use]
    pub const fn max_idle(&self) -> usize {
        self.max_idle
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        self.connector.endpoint()
    }

    #[must_use]
    pub const fn connector(&self) -> &C {
        &self.connector
    }

    async fn close(session: C::Session) {
        let id = session.id();
        if let Err(err) = session.close().await {
            internal!(level = DEBUG, "Error closing session {}: {}", id, err);
        } else {
            internal!("Closed session {}", id);
        }
    }
}
