//! Registry Auth Library
//!
//! Token authentication server for Docker/OCI registries. A registry that
//! delegates authentication sends clients here; they come back with a
//! short-lived RS256 token listing exactly which repository actions they may
//! perform.
//!
//! # Features
//!
//! - **Basic credentials**: bcrypt-hashed users from configuration
//! - **Public namespaces**: anonymous pull under configured prefixes
//! - **Scope filtering**: each requested item judged on its own
//! - **Self-provisioned signing key**: RSA certificate generated on first start
//! - **Audit trail**: every issued or refused token logged as structured JSON

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod certs;
pub mod cli;
pub mod config;
pub mod error;
pub mod server;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// `RUST_LOG` takes precedence over `level`. `format` selects `json` output;
/// anything else is human-readable text.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    };

    installed.map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {e}")))
}
