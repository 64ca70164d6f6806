//! SMTP reply parsing and representation.

use super::error::{ClientError, Result};

/// One line of an SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyLine {
    /// The SMTP status code (e.g., 220, 250, 550).
    pub code: u16,
    /// Whether this is the last line in a multi-line reply.
    pub is_last: bool,
    /// The text following the status code and separator.
    pub text: String,
}

impl ReplyLine {
    /// Parses a single reply line, with or without its trailing CRLF.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Parse` if the line doesn't match SMTP format.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);

        let Some(code) = line.get(..3) else {
            return Err(ClientError::Parse(format!("Reply line too short: '{line}'")));
        };
        let code = code
            .bytes()
            .all(|b| b.is_ascii_digit())
            .then(|| code.parse::<u16>().ok())
            .flatten()
            .ok_or_else(|| ClientError::Parse(format!("Invalid status code: '{code}'")))?;

        let is_last = match line.as_bytes().get(3) {
            None | Some(b' ') => true,
            Some(b'-') => false,
            Some(other) => {
                return Err(ClientError::Parse(format!(
                    "Invalid separator character: '{}'",
                    char::from(*other)
                )));
            }
        };

        Ok(Self {
            code,
            is_last,
            text: line.get(4..).unwrap_or_default().to_string(),
        })
    }
}

/// A complete SMTP reply, which may span several lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// The SMTP status code.
    pub code: u16,
    /// The text of every line, in order.
    pub lines: Vec<String>,
}

impl Response {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// Assembles a reply from its parsed lines.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Parse` when the lines disagree on the status code
    /// or no line was supplied.
    pub fn from_lines(lines: Vec<ReplyLine>) -> Result<Self> {
        let Some(first) = lines.first() else {
            return Err(ClientError::Parse("Empty reply".to_string()));
        };
        let code = first.code;

        if let Some(mismatch) = lines.iter().find(|line| line.code != code) {
            return Err(ClientError::Parse(format!(
                "Status code mismatch in multi-line reply: expected {code}, got {}",
                mismatch.code
            )));
        }

        Ok(Self::new(code, lines.into_iter().map(|line| line.text).collect()))
    }

    /// Returns the reply text with lines joined by newlines.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    /// Returns `true` for a 2xx reply.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// Returns `true` for a 3xx reply.
    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    /// Converts a reply into an error unless `accept` holds for its code.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Rejected` carrying the code and text.
    pub fn expect(self, accept: impl FnOnce(&Self) -> bool) -> Result<Self> {
        if accept(&self) {
            Ok(self)
        } else {
            Err(ClientError::Rejected {
                code: self.code,
                message: self.message(),
            })
        }
    }
}
