//! Gmail search-box query strings (`from:someone has:attachment`).
//!
//! See "Refine searches in Gmail" for the operator syntax.

use anyhow::{Result, bail};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Field -> value search operators, encoded in field order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    fields: BTreeMap<String, String>,
}

fn needs_quotes(value: &str) -> bool {
    value.chars().any(|c| c.is_whitespace() || c == ':' || c == '"')
}

/// `say "hi"` -> `say \"hi\"`; backslashes are escaped too.
fn escape_quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Encode as space-separated `field:value` terms, quoting values with spaces,
    /// colons or double quotes.
    pub fn encode(&self) -> String {
        self.fields
            .iter()
            .map(|(k, v)| {
                if needs_quotes(v) {
                    format!("{k}:\"{}\"", escape_quoted(v))
                } else {
                    format!("{k}:{v}")
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Parse an encoded query back into its fields.
    pub fn parse(s: &str) -> Result<Self> {
        let mut query = Self::new();
        let mut chars = s.chars().peekable();
        loop {
            while chars.next_if(|c| c.is_whitespace()).is_some() {}
            if chars.peek().is_none() {
                break;
            }

            let mut field = String::new();
            while let Some(c) = chars.next_if(|c| *c != ':' && !c.is_whitespace()) {
                field.push(c);
            }
            if chars.next() != Some(':') {
                bail!("search term {field:?} is not of the form field:value");
            }

            let mut value = String::new();
            if chars.next_if_eq(&'"').is_some() {
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c) => value.push(c),
                            None => bail!("dangling escape in value of {field:?}"),
                        },
                        Some(c) => value.push(c),
                        None => bail!("unterminated quote in value of {field:?}"),
                    }
                }
            } else {
                while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                    value.push(c);
                }
            }
            query.fields.insert(field, value);
        }
        Ok(query)
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for SearchQuery {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
