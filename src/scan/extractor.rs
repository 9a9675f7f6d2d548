use anyhow::{Result, anyhow};
use regex::Regex;

use crate::domain::{MessageDetail, MessagePart, PartBody};
use crate::mail::decoders::decode_base64url;
use crate::mail::provider::Mailbox;
use crate::store::Artifact;

/// e.g. 187008571923.pdf
const INVOICE_FILENAME_PATTERN: &str = r"^\d+\.pdf$";
const PDF_MIME_TYPE: &str = "application/pdf";

/// Pulls invoice PDFs and the raw message out of a classified message.
pub struct AttachmentExtractor<'a, M: Mailbox + ?Sized> {
    mailbox: &'a M,
    invoice_filename: Regex,
}

impl<'a, M: Mailbox + ?Sized> AttachmentExtractor<'a, M> {
    pub fn new(mailbox: &'a M) -> Result<Self> {
        Ok(Self {
            mailbox,
            invoice_filename: Regex::new(INVOICE_FILENAME_PATTERN)?,
        })
    }

    pub fn is_invoice_filename(&self, filename: &str) -> bool {
        self.invoice_filename.is_match(filename)
    }

    pub fn is_invoice_part(&self, part: &MessagePart) -> bool {
        part.mime_type == PDF_MIME_TYPE && self.is_invoice_filename(&part.filename)
    }

    /// Top-level parts that carry an invoice PDF.
    pub fn invoice_parts<'d>(
        &'d self,
        detail: &'d MessageDetail,
    ) -> impl Iterator<Item = &'d MessagePart> + 'd {
        detail.parts.iter().filter(|p| self.is_invoice_part(p))
    }

    /// Fetch and decode one invoice part into `{prefix}-{filename}`.
    pub fn fetch_attachment(
        &self,
        detail: &MessageDetail,
        part: &MessagePart,
        prefix: &str,
    ) -> Result<Artifact> {
        let encoded = match &part.body {
            PartBody::Attachment(attachment_id) => {
                self.mailbox.get_attachment(&detail.id, attachment_id)?
            }
            PartBody::Inline(data) => data.clone(),
            PartBody::Empty => return Err(anyhow!("part {} has no content", part.filename)),
        };
        let bytes = decode_base64url(&encoded)?;
        Ok(Artifact::attachment(prefix, &part.filename, bytes))
    }

    /// Fetch and decode the full RFC-822 message into `{prefix}.eml`.
    pub fn fetch_raw(&self, detail: &MessageDetail, prefix: &str) -> Result<Artifact> {
        let encoded = self.mailbox.get_raw_message(&detail.id)?;
        let bytes = decode_base64url(&encoded)?;
        Ok(Artifact::raw_message(prefix, bytes))
    }
}
