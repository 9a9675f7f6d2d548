//! Mailbox provider abstraction.
//!
//! The scan pipeline only talks to a [`Mailbox`]; the Gmail REST client is the
//! production implementation and tests substitute an in-memory one.

use crate::domain::{MessageDetail, MessagePage};

/// Result type alias for provider calls.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Errors raised by a mailbox provider call.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Credential rejected or expired.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Network or connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// Rate limit exceeded.
    #[error("rate limit exceeded")]
    RateLimited,

    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Response body could not be understood.
    #[error("unexpected response: {0}")]
    Decode(String),

    /// Any other non-success status.
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },
}

impl ProviderError {
    /// Map a non-success HTTP status and its body to an error.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::Authentication(body),
            404 => Self::NotFound(body),
            429 => Self::RateLimited,
            _ => Self::Api { status, body },
        }
    }
}

/// Read-only view of a mailbox.
pub trait Mailbox {
    /// One page of message ids matching `query`.
    fn list_messages(&self, query: &str, page_token: Option<&str>) -> Result<MessagePage>;

    /// Headers and top-level structure of a message.
    fn get_message(&self, id: &str) -> Result<MessageDetail>;

    /// The whole RFC-822 message, base64url-encoded.
    fn get_raw_message(&self, id: &str) -> Result<String>;

    /// Attachment payload, base64url-encoded.
    fn get_attachment(&self, message_id: &str, attachment_id: &str) -> Result<String>;
}
