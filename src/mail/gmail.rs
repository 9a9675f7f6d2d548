//! Gmail REST API v1 client (read-only).
//!
//! Uses:
//! - `users.messages.list` for the search pages
//! - `users.messages.get` with `format=full` and `format=raw`
//! - `users.messages.attachments.get` for attachment bytes

use reqwest::blocking::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::cell::RefCell;

use crate::auth::TokenSource;
use crate::domain::{
    Credential, MessageDetail, MessagePage, MessagePart, MessageSummary, PartBody,
};
use crate::mail::provider::{Mailbox, ProviderError, Result};

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListMessagesResponse {
    messages: Option<Vec<MessageRef>>,
    next_page_token: Option<String>,
    #[allow(dead_code)]
    result_size_estimate: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageRef {
    id: String,
    thread_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    id: String,
    internal_date: Option<String>,
    payload: Option<GmailPayload>,
    raw: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GmailPayload {
    headers: Option<Vec<GmailHeader>>,
    parts: Option<Vec<GmailPart>>,
}

#[derive(Debug, Deserialize)]
struct GmailHeader {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailPart {
    mime_type: Option<String>,
    filename: Option<String>,
    body: Option<GmailBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailBody {
    attachment_id: Option<String>,
    data: Option<String>,
}

impl From<ListMessagesResponse> for MessagePage {
    fn from(resp: ListMessagesResponse) -> Self {
        MessagePage {
            messages: resp
                .messages
                .unwrap_or_default()
                .into_iter()
                .map(|m| MessageSummary {
                    id: m.id,
                    thread_id: m.thread_id,
                })
                .collect(),
            next_page_token: resp.next_page_token,
        }
    }
}

impl From<GmailPart> for MessagePart {
    fn from(part: GmailPart) -> Self {
        let body = match part.body {
            Some(GmailBody {
                attachment_id: Some(id),
                ..
            }) => PartBody::Attachment(id),
            Some(GmailBody { data: Some(d), .. }) => PartBody::Inline(d),
            _ => PartBody::Empty,
        };
        MessagePart {
            mime_type: part.mime_type.unwrap_or_default(),
            filename: part.filename.unwrap_or_default(),
            body,
        }
    }
}

impl TryFrom<GmailMessage> for MessageDetail {
    type Error = ProviderError;

    fn try_from(msg: GmailMessage) -> Result<Self> {
        let internal_date_ms = match msg.internal_date.as_deref() {
            Some(s) => s.parse::<i64>().map_err(|e| {
                ProviderError::Decode(format!("message {} internalDate {s:?}: {e}", msg.id))
            })?,
            None => 0,
        };
        let (headers, parts) = match msg.payload {
            Some(p) => (p.headers.unwrap_or_default(), p.parts.unwrap_or_default()),
            None => (Vec::new(), Vec::new()),
        };
        Ok(MessageDetail {
            id: msg.id,
            internal_date_ms,
            headers: MessageDetail::collect_headers(headers.into_iter().map(|h| (h.name, h.value))),
            parts: parts.into_iter().map(MessagePart::from).collect(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct AttachmentBody {
    data: Option<String>,
}

/// Authenticated Gmail client for the `me` user.
///
/// With a [`TokenSource`] attached, the access token is renewed before a call
/// once it has expired, and once more if the API rejects it.
pub struct GmailClient {
    http: Client,
    base_url: String,
    credential: RefCell<Credential>,
    tokens: Option<Box<dyn TokenSource>>,
}

impl GmailClient {
    pub fn new(credential: &Credential) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: GMAIL_API_BASE.to_string(),
            credential: RefCell::new(credential.clone()),
            tokens: None,
        })
    }

    /// Point the client at another API root (e.g. a local test server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_token_source(mut self, tokens: impl TokenSource + 'static) -> Self {
        self.tokens = Some(Box::new(tokens));
        self
    }

    fn can_renew(&self) -> bool {
        self.tokens.is_some() && self.credential.borrow().can_refresh()
    }

    fn renew(&self) -> Result<()> {
        let Some(tokens) = &self.tokens else {
            return Ok(());
        };
        let stale = self.credential.borrow().clone();
        let fresh = tokens
            .renew(&stale)
            .map_err(|e| ProviderError::Authentication(format!("token refresh failed: {e:#}")))?;
        *self.credential.borrow_mut() = fresh;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<T> {
        if self.can_renew() && self.credential.borrow().is_expired() {
            log::info!("Access token expired; refreshing");
            self.renew()?;
        }
        match self.send(endpoint, query) {
            Err(ProviderError::Authentication(body)) if self.can_renew() => {
                log::info!("Access token rejected ({body}); refreshing and retrying");
                self.renew()?;
                self.send(endpoint, query)
            }
            other => other,
        }
    }

    fn send<T: DeserializeOwned>(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, endpoint);
        let access_token = self.credential.borrow().access_token.clone();
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(query)
            .send()
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body));
        }
        response
            .json()
            .map_err(|e| ProviderError::Decode(format!("parse response: {e}")))
    }
}

impl Mailbox for GmailClient {
    fn list_messages(&self, query: &str, page_token: Option<&str>) -> Result<MessagePage> {
        let mut params = vec![("q", query)];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }
        let resp: ListMessagesResponse = self.get("/messages", &params)?;
        Ok(resp.into())
    }

    fn get_message(&self, id: &str) -> Result<MessageDetail> {
        let msg: GmailMessage = self.get(&format!("/messages/{id}"), &[("format", "full")])?;
        msg.try_into()
    }

    fn get_raw_message(&self, id: &str) -> Result<String> {
        let msg: GmailMessage = self.get(&format!("/messages/{id}"), &[("format", "raw")])?;
        msg.raw
            .ok_or_else(|| ProviderError::Decode(format!("message {id} has no raw content")))
    }

    fn get_attachment(&self, message_id: &str, attachment_id: &str) -> Result<String> {
        let body: AttachmentBody = self.get(
            &format!("/messages/{message_id}/attachments/{attachment_id}"),
            &[],
        )?;
        body.data.ok_or_else(|| {
            ProviderError::Decode(format!("attachment {attachment_id} has no data"))
        })
    }
}
