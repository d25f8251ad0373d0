//! Configuration management
//!
//! Layered, lowest precedence first:
//!
//! 1. built-in defaults
//! 2. YAML file (`--config`)
//! 3. `REGISTRY_AUTH_*` environment variables, `__` separating nesting levels
//!    (e.g. `REGISTRY_AUTH_SERVER__PORT=9000`)
//! 4. command-line flags, applied by the binary after [`Config::load`]

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Hash prefixes the credential store understands.
const BCRYPT_PREFIXES: [&str; 4] = ["$2a$", "$2b$", "$2x$", "$2y$"];

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Token issuing configuration
    pub auth: AuthConfig,
    /// Signing certificate configuration
    pub certs: CertConfig,
}

impl Config {
    /// Load configuration from an optional YAML file plus the environment.
    ///
    /// The result is not validated; call [`Config::validate`] once all
    /// overrides have been applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or a value has the wrong
    /// shape.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("REGISTRY_AUTH_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.auth.public_prefixes = normalize_prefixes(&config.auth.public_prefixes);
        Ok(config)
    }

    /// Check the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a stored password that is not a bcrypt
    /// hash or a blank issuer.
    pub fn validate(&self) -> Result<()> {
        if self.auth.issuer.trim().is_empty() {
            return Err(Error::Config("auth.issuer must not be empty".to_string()));
        }

        let mut users: Vec<&String> = self.auth.users.keys().collect();
        users.sort();
        for user in users {
            let hash = &self.auth.users[user];
            if !BCRYPT_PREFIXES.iter().any(|p| hash.starts_with(p)) {
                return Err(Error::Config(format!(
                    "Password for user '{user}' is not a bcrypt hash"
                )));
            }
        }

        Ok(())
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_body_size: 64 * 1024,
        }
    }
}

/// Token issuing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Realm named in `WWW-Authenticate` challenges
    pub realm: String,
    /// `iss` claim; must match the registry's configured issuer
    pub issuer: String,
    /// Service name used for internally issued tokens
    pub service: String,
    /// Repository namespaces anonymous callers may pull from
    pub public_prefixes: Vec<String>,
    /// Username to bcrypt hash
    pub users: HashMap<String, String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            realm: "Registry".to_string(),
            issuer: "Registry".to_string(),
            service: "Registry".to_string(),
            public_prefixes: Vec::new(),
            users: HashMap::new(),
        }
    }
}

/// Signing certificate location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CertConfig {
    /// Directory holding the pair
    pub directory: PathBuf,
    /// Certificate file name inside `directory`
    pub cert_file: String,
    /// Private key file name inside `directory`
    pub key_file: String,
}

impl Default for CertConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("data/certs"),
            cert_file: "cert.pem".to_string(),
            key_file: "key.pem".to_string(),
        }
    }
}

impl CertConfig {
    /// Full path of the certificate.
    #[must_use]
    pub fn cert_path(&self) -> PathBuf {
        self.directory.join(&self.cert_file)
    }

    /// Full path of the private key.
    #[must_use]
    pub fn key_path(&self) -> PathBuf {
        self.directory.join(&self.key_file)
    }
}

/// Parse a comma-separated prefix list.
///
/// Entries are trimmed and lose trailing `/`; blank entries are dropped.
#[must_use]
pub fn parse_prefixes(list: &str) -> Vec<String> {
    normalize_prefixes(&list.split(',').collect::<Vec<_>>())
}

fn normalize_prefixes<S: AsRef<str>>(prefixes: &[S]) -> Vec<String> {
    prefixes
        .iter()
        .map(|p| p.as_ref().trim().trim_end_matches('/').to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Parse a YAML mapping of username to bcrypt hash.
///
/// An empty or blank document yields no users.
///
/// # Errors
///
/// Returns [`Error::Yaml`] if the document is not a string-to-string mapping.
pub fn parse_users(yaml: &str) -> Result<HashMap<String, String>> {
    if yaml.trim().is_empty() {
        return Ok(HashMap::new());
    }
    let users: Option<HashMap<String, String>> = serde_yaml::from_str(yaml)?;
    Ok(users.unwrap_or_default())
}
