//! SASL credentials and the mechanisms the client can drive.

use core::fmt::{self, Display};
use std::str::FromStr;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::Deserialize;

/// Username and password for `AUTH`.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// `PLAIN` initial response: `base64("\0" username "\0" password)`.
    pub(crate) fn plain(&self) -> String {
        STANDARD.encode(format!("\0{}\0{}", self.username, self.password))
    }

    pub(crate) fn login_username(&self) -> String {
        STANDARD.encode(&self.username)
    }

    pub(crate) fn login_password(&self) -> String {
        STANDARD.encode(&self.password)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// SASL mechanisms, in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Mechanism {
    Plain,
    Login,
}

impl Mechanism {
    /// Picks the preferred mechanism from what the server advertised.
    #[must_use]
    pub fn select(advertised: &[Self]) -> Option<Self> {
        advertised.iter().min().copied()
    }
}

impl FromStr for Mechanism {
    type Err = ();

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_uppercase().as_str() {
            "PLAIN" => Ok(Self::Plain),
            "LOGIN" => Ok(Self::Login),
            _ => Err(()),
        }
    }
}

impl Display for Mechanism {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
        })
    }
}
