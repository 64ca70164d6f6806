//! Pushes composed messages through pooled sessions.

use std::sync::Arc;

use crate::{
    client::{ClientError, Credentials},
    compose::compose,
    error::{Phase, SendError},
    internal,
    message::Message,
    pool::ConnectionPool,
    traits::{Connector, Session},
};

/// Sends messages over sessions borrowed from a shared pool.
///
/// Every borrowed session goes back to the pool whatever the outcome.
/// After a rejection the transaction is reset first; a session left in an
/// unknown state is closed instead of being reused.
pub struct Mailer<C: Connector> {
    pool: Arc<ConnectionPool<C>>,
}

impl<C: Connector> Clone for Mailer<C> {
    fn clone(&self) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
        }
    }
}

impl<C: Connector> Mailer<C> {
    #[must_use]
    pub const fn new(pool: Arc<ConnectionPool<C>>) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &ConnectionPool<C> {
        &self.pool
    }

    /// Sends one message, authenticating first if credentials are given and
    /// the server advertises AUTH.
    ///
    /// # Errors
    ///
    /// Returns the first failure, tagged with the step it happened in.
    /// Nothing is retried.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(
            from = %message.from,
            recipients = message.to.len(),
            session = tracing::field::Empty
        )
    )]
    pub async fn send(
        &self,
        message: &Message,
        credentials: Option<&Credentials>,
    ) -> Result<(), SendError> {
        if message.to.is_empty() {
            return Err(SendError::NoRecipients);
        }

        let mut session = self.pool.acquire().await?;

        if let Some(credentials) = credentials
            && session
                .authenticated_as()
                .is_some_and(|identity| identity != credentials.username())
        {
            internal!(
                level = DEBUG,
                "Session {} belongs to another identity, dialing a new one",
                session.id()
            );
            let stale = session.id();
            if let Err(err) = session.close().await {
                internal!(level = DEBUG, "Error closing session {}: {}", stale, err);
            }
            session = self.pool.acquire_new().await?;
        }

        tracing::Span::current().record("session", session.id());
        let outcome = Self::transact(&mut session, message, credentials).await;

        if let Err(error) = &outcome {
            internal!(
                level = DEBUG,
                "Send on session {} failed: {}",
                session.id(),
                error
            );

            if error.client_error().is_some_and(ClientError::is_rejection)
                && !session.is_broken()
                && let Err(err) = session.reset().await
            {
                internal!(
                    level = DEBUG,
                    "Reset of session {} failed: {}",
                    session.id(),
                    err
                );
            }
        }

        self.pool.release(session).await;
        outcome
    }

    async fn transact(
        session: &mut C::Session,
        message: &Message,
        credentials: Option<&Credentials>,
    ) -> Result<(), SendError> {
        if let Some(credentials) = credentials {
            if !session.capabilities().supports_auth() {
                internal!(
                    "Session {} does not advertise AUTH, sending unauthenticated",
                    session.id()
                );
            } else if session.authenticated_as().is_none() {
                session
                    .authenticate(credentials)
                    .await
                    .map_err(SendError::Authentication)?;
            }
        }

        let payload = compose(message);
        if let Some(limit) = session.capabilities().max_size()
            && limit > 0
            && payload.len() > limit
        {
            return Err(SendError::TooLarge {
                size: payload.len(),
                limit,
            });
        }

        session
            .mail_from(&message.from)
            .await
            .map_err(SendError::protocol(Phase::SenderDeclaration))?;

        for recipient in &message.to {
            session
                .rcpt_to(recipient)
                .await
                .map_err(SendError::protocol(Phase::RecipientDeclaration))?;
        }

        session
            .data()
            .await
            .map_err(SendError::protocol(Phase::PayloadOpen))?;

        session
            .write_data(&payload)
            .await
            .map_err(SendError::protocol(Phase::PayloadWrite))?;

        session
            .end_data()
            .await
            .map_err(SendError::protocol(Phase::PayloadClose))?;

        internal!(
            level = DEBUG,
            "Session {} delivered {} bytes to {} recipients",
            session.id(),
            payload.len(),
            message.to.len()
        );

        Ok(())
    }
}
