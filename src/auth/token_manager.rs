use anyhow::Result;

use crate::auth::oauth::AuthorizationFlow;
use crate::auth::token_store::TokenStore;
use crate::domain::Credential;
use crate::shutdown::ShutdownSignal;

/// Hands out a replacement once a credential has lapsed or been rejected.
pub trait TokenSource {
    fn renew(&self, stale: &Credential) -> Result<Credential>;
}

/// Decides between the saved credential, a refresh, and the interactive flow.
pub struct TokenManager {
    store: TokenStore,
    flow: AuthorizationFlow,
}

impl TokenManager {
    pub fn new(store: TokenStore, flow: AuthorizationFlow) -> Self {
        Self { store, flow }
    }

    /// Returns a usable credential, authorizing interactively only when needed.
    pub fn credential(&self, shutdown: &ShutdownSignal) -> Result<Credential> {
        // 1) saved & not expired
        let Some(saved) = self.store.load() else {
            log::info!(
                "No saved credential in {}; running interactive authorization",
                self.store.path().display()
            );
            return self.authorize(shutdown);
        };
        if !saved.is_expired() {
            log::debug!("Using saved credential from {}", self.store.path().display());
            return Ok(saved);
        }

        // 2) refresh if possible
        if saved.can_refresh() {
            log::info!("Saved credential expired; refreshing with refresh token...");
            match self.renew(&saved) {
                Ok(fresh) => return Ok(fresh),
                Err(e) => log::warn!("{e:#}; falling back to interactive authorization"),
            }
        } else {
            log::info!("Saved credential expired and has no refresh token");
        }

        // 3) otherwise the browser flow
        self.authorize(shutdown)
    }

    /// Always runs the interactive flow and persists its result.
    pub fn authorize(&self, shutdown: &ShutdownSignal) -> Result<Credential> {
        let credential = self.flow.authorize(shutdown)?;
        self.store.save(&credential)?;
        Ok(credential)
    }
}

impl TokenSource for TokenManager {
    /// Refresh through the token endpoint and persist the result.
    fn renew(&self, stale: &Credential) -> Result<Credential> {
        let fresh = self.flow.refresh(stale)?;
        self.store.save(&fresh)?;
        Ok(fresh)
    }
}
