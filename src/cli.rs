//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Docker registry token server - Basic credentials in, signed bearer tokens out
#[derive(Parser, Debug)]
#[command(name = "registry-auth")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "REGISTRY_AUTH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "REGISTRY_AUTH_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "REGISTRY_AUTH_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "REGISTRY_AUTH_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "REGISTRY_AUTH_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Comma-separated repository prefixes anonymous callers may pull from
    #[arg(long, env = "REGISTRY_AUTH_PUBLIC")]
    pub public: Option<String>,

    /// YAML mapping of username to bcrypt hash
    #[arg(long, env = "REGISTRY_AUTH_USERS")]
    pub users: Option<String>,

    /// Realm named in authentication challenges
    #[arg(long, env = "REGISTRY_AUTH_REALM")]
    pub realm: Option<String>,

    /// Token issuer; must match the registry configuration
    #[arg(long, env = "REGISTRY_AUTH_ISSUER")]
    pub issuer: Option<String>,

    /// Service name for internally issued tokens
    #[arg(long, env = "REGISTRY_AUTH_SERVICE")]
    pub service: Option<String>,

    /// Directory holding the signing certificate and key
    #[arg(long, env = "REGISTRY_AUTH_CERT_DIR")]
    pub cert_dir: Option<PathBuf>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the token server (default)
    Serve,

    /// Read a password from stdin and print its bcrypt hash
    HashPassword {
        /// bcrypt cost factor
        #[arg(long, default_value_t = 7, value_parser = clap::value_parser!(u32).range(4..=31))]
        cost: u32,
    },
}
