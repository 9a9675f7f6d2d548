use anyhow::{Result, anyhow};
use chrono::Utc;
use oauth2::basic::{BasicClient, BasicTokenResponse, BasicTokenType};
use oauth2::reqwest::http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret as OAuthSecret, CsrfToken,
    PkceCodeChallenge, RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};
use std::thread;
use url::Url;

use crate::auth::callback::CallbackListener;
use crate::config::ClientSecret;
use crate::domain::Credential;
use crate::shutdown::ShutdownSignal;

/// Fixed anti-forgery value echoed back by the provider on the redirect.
pub const STATE_TOKEN: &str = "state-token";

/// Interactive authorization-code grant against a loopback redirect.
pub struct AuthorizationFlow {
    client: BasicClient,
    redirect: Url,
    scope: String,
    open_browser: bool,
    force_consent: bool,
}

impl AuthorizationFlow {
    pub fn new(secret: &ClientSecret, redirect_uri: &str, scope: &str) -> Result<Self> {
        let redirect = Url::parse(redirect_uri)
            .map_err(|e| anyhow!("Invalid redirect_uri '{redirect_uri}': {e}"))?;

        let client = BasicClient::new(
            ClientId::new(secret.client_id.clone()),
            secret.client_secret.clone().map(OAuthSecret::new),
            AuthUrl::new(secret.auth_uri.clone())?,
            Some(TokenUrl::new(secret.token_uri.clone())?),
        )
        .set_redirect_uri(RedirectUrl::new(redirect_uri.to_string())?);

        Ok(Self {
            client,
            redirect,
            scope: scope.to_string(),
            open_browser: true,
            force_consent: false,
        })
    }

    /// Only print the authorization URL instead of launching a browser.
    pub fn without_browser(mut self) -> Self {
        self.open_browser = false;
        self
    }

    /// Ask the provider to show the consent screen again, which re-issues a refresh token.
    pub fn force_consent(mut self, force: bool) -> Self {
        self.force_consent = force;
        self
    }

    pub fn authorization_url(&self, pkce_challenge: PkceCodeChallenge) -> Url {
        let mut request = self
            .client
            .authorize_url(|| CsrfToken::new(STATE_TOKEN.to_string()))
            .add_scope(Scope::new(self.scope.clone()))
            .add_extra_param("access_type", "offline")
            .set_pkce_challenge(pkce_challenge);
        if self.force_consent {
            request = request.add_extra_param("prompt", "consent");
        }
        request.url().0
    }

    /// Run the full browser round trip and exchange the code for a credential.
    ///
    /// Waits until the callback arrives or `shutdown` is triggered. The
    /// listener is then shut down synchronously: dropping it unblocks the
    /// server and joins its thread before the code exchange starts, so the
    /// port is released by the time the token request goes out.
    pub fn authorize(&self, shutdown: &ShutdownSignal) -> Result<Credential> {
        // Listen first so a fast redirect cannot beat the bind.
        let listener = CallbackListener::bind(&self.redirect, STATE_TOKEN)?;

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let auth_url = self.authorization_url(pkce_challenge);

        if self.open_browser {
            launch_browser(auth_url.to_string());
        } else {
            println!("Please open the following URL in your browser:\n{auth_url}");
        }

        let code = listener.wait_for_code(shutdown)?;
        drop(listener);
        log::info!("Authorization code received, exchanging for a token");

        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request(http_client)
            .map_err(|err| {
                log::debug!("Token exchange failed: {err:#?}");
                anyhow!("Unable to retrieve token from web: {err}")
            })?;

        Ok(credential_from(&token, None))
    }

    /// Trade the credential's refresh token for a fresh access token.
    pub fn refresh(&self, credential: &Credential) -> Result<Credential> {
        let refresh = credential
            .refresh_token
            .as_deref()
            .ok_or_else(|| anyhow!("credential has no refresh token"))?;
        let token = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh.to_string()))
            .request(http_client)
            .map_err(|err| anyhow!("Token refresh failed: {err}"))?;
        // Providers usually omit the refresh token on refresh; keep the old one.
        Ok(credential_from(&token, Some(refresh)))
    }
}

fn launch_browser(url: String) {
    log::info!("Opening browser for authorization at {url}...");
    let fallback = url.clone();
    let spawned = thread::Builder::new()
        .name("browser".into())
        .spawn(move || {
            if let Err(e) = open::that(&url) {
                log::warn!("Unable to open browser automatically: {e}");
                println!("Please open the following URL in your browser:\n{url}");
            }
        });
    if let Err(e) = spawned {
        log::warn!("Unable to start browser launcher: {e}");
        println!("Please open the following URL in your browser:\n{fallback}");
    }
}

fn credential_from(token: &BasicTokenResponse, previous_refresh: Option<&str>) -> Credential {
    let token_type = match token.token_type() {
        BasicTokenType::Bearer => "Bearer".to_string(),
        BasicTokenType::Mac => "MAC".to_string(),
        BasicTokenType::Extension(other) => other.clone(),
    };
    let expiry = token
        .expires_in()
        .and_then(|d| chrono::Duration::from_std(d).ok())
        .map(|d| Utc::now() + d);

    Credential {
        access_token: token.access_token().secret().to_string(),
        token_type,
        refresh_token: token
            .refresh_token()
            .map(|r| r.secret().to_string())
            .or_else(|| previous_refresh.map(str::to_string)),
        expiry,
    }
}
