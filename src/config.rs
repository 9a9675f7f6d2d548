use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
pub const DEFAULT_CREDENTIALS_FILE: &str = "credentials.json";
pub const DEFAULT_TOKEN_FILE: &str = "token.json";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8080/oauth2/callback";
pub const DEFAULT_SENDER: &str = "faturaedp@edp.pt";
pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Contract id -> alias, read from the `contracts` key of the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractAliases(HashMap<String, String>);

impl ContractAliases {
    pub fn alias(&self, contract: &str) -> Option<&str> {
        self.0.get(contract).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ContractAliases {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub contracts: ContractAliases,
}

/// Loads the alias config. A missing file is an empty config; a malformed one is an error.
pub fn load_config(path: &Path) -> Result<Config> {
    let s = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::debug!("no config at {}, using defaults", path.display());
            return Ok(Config::default());
        }
        Err(e) => return Err(anyhow!("error reading {}: {e}", path.display())),
    };
    if s.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = serde_yaml::from_str(&s)
        .with_context(|| format!("error parsing YAML in {}", path.display()))?;
    log::info!(
        "Loaded {} contract alias(es) from {}",
        cfg.contracts.len(),
        path.display()
    );
    Ok(cfg)
}

/// OAuth client descriptor as issued by the Google Cloud console.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

#[derive(Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

pub fn parse_client_secret(json: &str) -> Result<ClientSecret> {
    let file: ClientSecretFile = serde_json::from_str(json)?;
    file.installed
        .or(file.web)
        .ok_or_else(|| anyhow!("client secret has neither an \"installed\" nor a \"web\" section"))
}

pub fn load_client_secret(path: &Path) -> Result<ClientSecret> {
    let s = fs::read_to_string(path)
        .with_context(|| format!("Unable to read client secret file {}", path.display()))?;
    parse_client_secret(&s)
        .with_context(|| format!("Unable to parse client secret file {}", path.display()))
}
