//! Renders a [`Message`] as a `multipart/alternative` body.
//!
//! The layout is fixed:
//!
//! ```text
//! From: <sender>
//! Subject: <subject>
//! MIME-Version: 1.0
//! Content-Type: multipart/alternative; boundary=boundary
//!
//! --boundary
//! Content-Type: text/plain; charset=UTF-8
//!
//! <text>
//! --boundary
//! Content-Type: text/html; charset=UTF-8
//!
//! <html>
//! --boundary--
//! ```
//!
//! Headers are written from an ordered list, so the same message always
//! renders to the same bytes. Bodies are not scanned for the boundary token.

use crate::message::Message;

/// Separator between the body alternatives.
pub const BOUNDARY: &str = "boundary";

/// Builds the payload written after `DATA`.
#[must_use]
pub fn compose(message: &Message) -> Vec<u8> {
    let headers = [
        ("From", header_value(&message.from)),
        ("Subject", header_value(&message.subject)),
        ("MIME-Version", "1.0".to_string()),
        (
            "Content-Type",
            format!("multipart/alternative; boundary={BOUNDARY}"),
        ),
    ];

    let mut payload = String::with_capacity(
        256 + message.subject.len() + message.text.len() + message.html.len(),
    );

    for (name, value) in &headers {
        payload.push_str(name);
        payload.push_str(": ");
        payload.push_str(value);
        payload.push_str("\r\n");
    }
    payload.push_str("\r\n");

    for (content_type, body) in [("text/plain", &message.text), ("text/html", &message.html)] {
        payload.push_str(&format!("--{BOUNDARY}\r\n"));
        payload.push_str(&format!("Content-Type: {content_type}; charset=UTF-8\r\n\r\n"));
        payload.push_str(body);
        payload.push_str("\r\n");
    }

    payload.push_str(&format!("--{BOUNDARY}--"));

    payload.into_bytes()
}

/// Header values are single line; CR and LF become spaces.
fn header_value(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}
