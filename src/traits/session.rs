use std::future::Future;

use crate::{
    client::{Capabilities, ClientError, Credentials},
    error::ConnectionError,
};

/// One established connection to the remote endpoint.
///
/// Each command either completes with a successful reply or fails with the
/// reply's code. Commands on a session are issued strictly in order.
pub trait Session: Send + Sized + 'static {
    /// Unique within the process, stable for the session's lifetime.
    fn id(&self) -> u64;

    fn capabilities(&self) -> &Capabilities;

    /// The username this session authenticated as, if any.
    fn authenticated_as(&self) -> Option<&str>;

    /// Set once the stream is in an unknown state (I/O error, timeout,
    /// unparsable reply). A broken session is never reused.
    fn is_broken(&self) -> bool;

    fn authenticate(
        &mut self,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn mail_from(&mut self, sender: &str) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn rcpt_to(&mut self, recipient: &str)
    -> impl Future<Output = Result<(), ClientError>> + Send;

    /// Sends `DATA` and waits for the 354 go-ahead.
    fn data(&mut self) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// Writes part of the message body. May be called repeatedly.
    fn write_data(&mut self, payload: &[u8])
    -> impl Future<Output = Result<(), ClientError>> + Send;

    /// Terminates the body and waits for the server to accept the message.
    fn end_data(&mut self) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// Aborts the current transaction.
    fn reset(&mut self) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// Ends the session. Best-effort.
    fn close(self) -> impl Future<Output = Result<(), ClientError>> + Send;
}

/// Establishes new sessions to one endpoint.
pub trait Connector: Send + Sync + 'static {
    type Session: Session;

    /// `host:port` of the remote endpoint.
    fn endpoint(&self) -> &str;

    fn connect(&self) -> impl Future<Output = Result<Self::Session, ConnectionError>> + Send;
}
