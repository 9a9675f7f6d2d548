use anyhow::{Context, Result};
use std::collections::VecDeque;

use crate::domain::MessageSummary;
use crate::mail::provider::Mailbox;
use crate::mail::query::SearchQuery;

#[derive(Debug, Clone, PartialEq, Eq)]
enum PageState {
    /// no request issued yet
    Start,
    HasToken(String),
    Exhausted,
}

/// Lazily walks all result pages of a search, one request at a time.
///
/// Yields `Err` once if a page request fails and then ends.
pub struct SearchPaginator<'a, M: Mailbox + ?Sized> {
    mailbox: &'a M,
    query: String,
    state: PageState,
    buffered: VecDeque<MessageSummary>,
    pages_fetched: usize,
}

impl<'a, M: Mailbox + ?Sized> SearchPaginator<'a, M> {
    pub fn new(mailbox: &'a M, query: &SearchQuery) -> Self {
        Self {
            mailbox,
            query: query.encode(),
            state: PageState::Start,
            buffered: VecDeque::new(),
            pages_fetched: 0,
        }
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    fn fetch_next_page(&mut self) -> Result<()> {
        let token = match &self.state {
            PageState::Exhausted => return Ok(()),
            PageState::Start => None,
            PageState::HasToken(t) => Some(t.clone()),
        };

        let page = self
            .mailbox
            .list_messages(&self.query, token.as_deref())
            .with_context(|| {
                format!(
                    "Unable to retrieve messages (page {})",
                    self.pages_fetched + 1
                )
            })?;
        self.pages_fetched += 1;
        log::debug!(
            "page {}: {} message(s), next token {:?}",
            self.pages_fetched,
            page.messages.len(),
            page.next_page_token
        );

        // An empty page ends the walk even if the provider hands out another token.
        self.state = match page.next_page_token {
            Some(t) if !t.is_empty() && !page.messages.is_empty() => PageState::HasToken(t),
            _ => PageState::Exhausted,
        };
        self.buffered.extend(page.messages);
        Ok(())
    }
}

impl<M: Mailbox + ?Sized> Iterator for SearchPaginator<'_, M> {
    type Item = Result<MessageSummary>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(m) = self.buffered.pop_front() {
                return Some(Ok(m));
            }
            if self.state == PageState::Exhausted {
                return None;
            }
            if let Err(e) = self.fetch_next_page() {
                self.state = PageState::Exhausted;
                return Some(Err(e));
            }
        }
    }
}
