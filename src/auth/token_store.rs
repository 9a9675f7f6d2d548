use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::domain::Credential;

/// JSON token file holding the last obtained credential.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved credential, if any. An unreadable or corrupt file counts as absent
    /// so the caller falls back to authorizing again.
    pub fn load(&self) -> Option<Credential> {
        let s = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("Unable to read token file {}: {e}", self.path.display());
                return None;
            }
        };
        match serde_json::from_str(&s) {
            Ok(c) => Some(c),
            Err(e) => {
                log::warn!("Ignoring malformed token file {}: {e}", self.path.display());
                None
            }
        }
    }

    /// Truncate and rewrite the token file (owner-only permissions on unix).
    pub fn save(&self, credential: &Credential) -> Result<()> {
        log::info!("Saving credential file to: {}", self.path.display());
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut f = options
            .open(&self.path)
            .with_context(|| format!("Unable to cache oauth token in {}", self.path.display()))?;
        let s = serde_json::to_string_pretty(credential)?;
        f.write_all(s.as_bytes())?;
        f.write_all(b"\n")?;
        Ok(())
    }
}
