//! Error types for the registry auth server

use std::io;

use thiserror::Error;

/// Result type alias for the registry auth server
pub type Result<T> = std::result::Result<T, Error>;

/// Registry auth errors
///
/// Failed credentials and unparseable scope segments are deliberately absent:
/// both are ordinary outcomes of a request, not errors.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Certificate or key material could not be loaded or generated
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// Token signing failed
    #[error("Signing error: {0}")]
    Signing(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Malformed YAML value supplied outside the config file
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<jsonwebtoken::errors::Error> for Error {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Signing(err.to_string())
    }
}
