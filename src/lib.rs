pub mod client;
pub mod compose;
pub mod config;
pub mod error;
pub mod logging;
pub mod mailer;
pub mod message;
pub mod pool;
pub mod traits;

#[cfg(test)]
mod testing;

pub use tracing;

pub use self::{
    client::{Credentials, SmtpConnector, SmtpSession},
    compose::compose,
    config::{Config, SmtpConfig},
    error::{ConfigError, ConnectionError, Phase, SendError},
    mailer::Mailer,
    message::Message,
    pool::ConnectionPool,
};
