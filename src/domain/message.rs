use std::collections::HashMap;

pub type MessageId = String;

/// One entry of a search result page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSummary {
    pub id: MessageId,
    pub thread_id: Option<String>,
}

impl MessageSummary {
    pub fn new(id: impl Into<MessageId>) -> Self {
        Self {
            id: id.into(),
            thread_id: None,
        }
    }
}

/// A page of search results plus the cursor for the next one.
#[derive(Debug, Clone, Default)]
pub struct MessagePage {
    pub messages: Vec<MessageSummary>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartBody {
    /// base64url data carried in the message itself
    Inline(String),
    /// attachment id to fetch separately
    Attachment(String),
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePart {
    pub mime_type: String,
    pub filename: String,
    pub body: PartBody,
}

#[derive(Debug, Clone, Default)]
pub struct MessageDetail {
    pub id: MessageId,
    /// epoch milliseconds as reported by the provider
    pub internal_date_ms: i64,
    pub headers: HashMap<String, String>,
    /// top-level parts only
    pub parts: Vec<MessagePart>,
}

impl MessageDetail {
    /// Header value by exact name, empty when absent.
    pub fn header(&self, name: &str) -> &str {
        self.headers.get(name).map(String::as_str).unwrap_or("")
    }

    /// Builds the header map from an ordered list; a repeated name keeps its last value.
    pub fn collect_headers<I>(headers: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        headers.into_iter().collect()
    }
}
