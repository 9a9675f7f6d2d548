use anyhow::Result;
use std::path::PathBuf;

use crate::domain::MessageId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// an invoice PDF taken from a message part
    Attachment,
    /// the whole message as `.eml`
    RawMessage,
}

/// Decoded bytes ready to be written under `file_name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn attachment(prefix: &str, original_filename: &str, bytes: Vec<u8>) -> Self {
        Self {
            kind: ArtifactKind::Attachment,
            file_name: format!("{prefix}-{original_filename}"),
            bytes,
        }
    }

    pub fn raw_message(prefix: &str, bytes: Vec<u8>) -> Self {
        Self {
            kind: ArtifactKind::RawMessage,
            file_name: format!("{prefix}.eml"),
            bytes,
        }
    }
}

/// Destination for the files a scan produces.
pub trait ArtifactSink {
    /// Persist one artifact of `message_id`, returning where it went.
    fn emit(&mut self, message_id: &MessageId, artifact: &Artifact) -> Result<PathBuf>;
}
