use core::fmt::{self, Display};

use super::{auth::Mechanism, response::Response};

/// SMTP service extensions advertised in the EHLO reply.
///
/// The first reply line is the server's greeting and carries no extension.
/// Each following line is a keyword with optional space separated
/// parameters, e.g. `AUTH PLAIN LOGIN` or `SIZE 35882577`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    extensions: Vec<(String, Vec<String>)>,
}

impl Capabilities {
    /// Parses the capability set from a successful EHLO reply.
    #[must_use]
    pub fn from_ehlo(response: &Response) -> Self {
        let extensions = response
            .lines
            .iter()
            .skip(1)
            .filter_map(|line| {
                let mut words = line.split_whitespace();
                let keyword = words.next()?.to_ascii_uppercase();
                Some((keyword, words.map(str::to_string).collect()))
            })
            .collect();

        Self { extensions }
    }

    /// Returns `true` if the keyword was advertised. Case insensitive.
    #[must_use]
    pub fn supports(&self, keyword: &str) -> bool {
        self.params(keyword).is_some()
    }

    /// The parameters advertised alongside a keyword.
    #[must_use]
    pub fn params(&self, keyword: &str) -> Option<&[String]> {
        self.extensions
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(keyword))
            .map(|(_, params)| params.as_slice())
    }

    #[must_use]
    pub fn supports_auth(&self) -> bool {
        self.supports("AUTH")
    }

    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports("STARTTLS")
    }

    /// The advertised SASL mechanisms this client understands.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<Mechanism> {
        self.params("AUTH")
            .unwrap_or_default()
            .iter()
            .filter_map(|name| name.parse().ok())
            .collect()
    }

    /// The maximum message size from `SIZE`, where `0` means no limit.
    #[must_use]
    pub fn max_size(&self) -> Option<usize> {
        self.params("SIZE")
            .map(|params| params.first().and_then(|max| max.parse().ok()).unwrap_or(0))
    }
}

impl Display for Capabilities {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (keyword, params) in &self.extensions {
            if !first {
                fmt.write_str(", ")?;
            }
            first = false;

            fmt.write_str(keyword)?;
            for param in params {
                write!(fmt, " {param}")?;
            }
        }
        Ok(())
    }
}
