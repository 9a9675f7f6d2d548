use anyhow::{Context, Result};
use regex::Regex;

use crate::config::ContractAliases;
use crate::domain::{MessageDetail, MessageId};
use crate::mail::decoders::{DateZone, decode_mime_words, format_date};

/// e.g. "A sua fatura EDP (contrato 100200300200)"
const CONTRACT_PATTERN: &str = r"\(contrato (\d+)\)";

/// Provider tag used in contract-based file names.
const PROVIDER_TAG: &str = "edp";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    pub message_id: MessageId,
    pub date: String,
    pub from: String,
    pub subject: String,
    pub contract: Option<String>,
    pub alias: Option<String>,
    /// file name stem shared by every file written for the message
    pub prefix: String,
}

pub struct MessageClassifier<'a> {
    aliases: &'a ContractAliases,
    zone: DateZone,
    contract_pattern: Regex,
}

impl<'a> MessageClassifier<'a> {
    pub fn new(aliases: &'a ContractAliases, zone: DateZone) -> Result<Self> {
        Ok(Self {
            aliases,
            zone,
            contract_pattern: Regex::new(CONTRACT_PATTERN)?,
        })
    }

    /// First contract id in the subject, if any.
    pub fn contract_in<'s>(&self, subject: &'s str) -> Option<&'s str> {
        self.contract_pattern
            .captures(subject)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    /// Fails only when the message timestamp cannot be rendered as a date.
    pub fn classify(&self, detail: &MessageDetail) -> Result<ClassificationResult> {
        let date = format_date(detail.internal_date_ms, self.zone)
            .with_context(|| format!("message {} has no usable date", detail.id))?;
        let subject = decode_mime_words(detail.header("Subject"));
        let from = decode_mime_words(detail.header("From"));

        let contract = self.contract_in(&subject).map(str::to_string);
        let alias = contract
            .as_deref()
            .and_then(|c| self.aliases.alias(c))
            .map(str::to_string);

        let prefix = match (&contract, &alias) {
            (Some(c), Some(a)) => format!("{date}-{PROVIDER_TAG}-{c}-{a}"),
            (Some(c), None) => format!("{date}-{PROVIDER_TAG}-{c}"),
            (None, _) => format!("{date}-{}", detail.id),
        };

        Ok(ClassificationResult {
            message_id: detail.id.clone(),
            date,
            from,
            subject,
            contract,
            alias,
            prefix,
        })
    }
}
