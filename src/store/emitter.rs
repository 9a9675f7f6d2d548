use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::MessageId;
use crate::store::sink::{Artifact, ArtifactKind, ArtifactSink};

/// Writes artifacts into a directory under deterministic names.
///
/// Names are write-once per run: a `.eml` name already written for another
/// message gets that message's id appended instead of being overwritten.
pub struct Emitter {
    output_dir: PathBuf,
    claimed: HashMap<String, MessageId>,
}

impl Emitter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir)
            .with_context(|| format!("Unable to create output directory {}", output_dir.display()))?;
        Ok(Self {
            output_dir,
            claimed: HashMap::new(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn resolve_name(&mut self, message_id: &MessageId, artifact: &Artifact) -> String {
        let name = sanitize_file_name(&artifact.file_name);
        let name = match self.claimed.get(&name) {
            Some(owner) if owner != message_id => match artifact.kind {
                ArtifactKind::RawMessage => {
                    let alt = with_suffix(&name, message_id);
                    log::warn!(
                        "{name} was already written for message {owner}; saving message {message_id} as {alt}"
                    );
                    alt
                }
                // same invoice number in two messages: a re-sent invoice
                ArtifactKind::Attachment => {
                    log::debug!("{name} also attached to message {message_id}; overwriting");
                    name
                }
            },
            _ => name,
        };
        self.claimed
            .entry(name.clone())
            .or_insert_with(|| message_id.clone());
        name
    }
}

impl ArtifactSink for Emitter {
    fn emit(&mut self, message_id: &MessageId, artifact: &Artifact) -> Result<PathBuf> {
        let name = self.resolve_name(message_id, artifact);
        let path = self.output_dir.join(name);
        fs::write(&path, &artifact.bytes)
            .with_context(|| format!("unable to write {}", path.display()))?;
        Ok(path)
    }
}

/// Keep a name inside the output directory.
fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// `a.eml` + `id` -> `a-id.eml`
fn with_suffix(name: &str, suffix: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}-{suffix}.{ext}"),
        None => format!("{name}-{suffix}"),
    }
}
