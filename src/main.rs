//! Registry Auth - token server for Docker/OCI registries.

use std::io::{self, BufRead};
use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::Parser;
use tracing::{error, info};

use registry_auth::{
    cli::{Cli, Command},
    config::{Config, parse_prefixes, parse_users},
    server::AuthServer,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Some(Command::HashPassword { cost }) => run_hash_password(cost),
        Some(Command::Serve) | None => run_server(cli).await,
    }
}

/// Read one password line from stdin and print its bcrypt hash.
fn run_hash_password(cost: u32) -> ExitCode {
    match hash_password_from(io::stdin().lock(), cost) {
        Ok(hash) => {
            println!("{hash}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to hash password: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn hash_password_from(mut input: impl BufRead, cost: u32) -> anyhow::Result<String> {
    let mut line = String::new();
    input
        .read_line(&mut line)
        .context("reading password from stdin")?;

    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        bail!("empty password");
    }

    bcrypt::hash(password, cost).context("hashing password")
}

/// Run the token server
async fn run_server(cli: Cli) -> ExitCode {
    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        users = config.auth.users.len(),
        public_prefixes = config.auth.public_prefixes.len(),
        "Starting registry auth"
    );

    let server = match AuthServer::new(config) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create server: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.run().await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Registry auth shutdown complete");
    ExitCode::SUCCESS
}

/// Load the layered configuration and apply command-line overrides.
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;

    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(ref host) = cli.host {
        config.server.host = host.clone();
    }
    if let Some(ref public) = cli.public {
        config.auth.public_prefixes = parse_prefixes(public);
    }
    if let Some(ref users) = cli.users {
        config.auth.users = parse_users(users).context("parsing --users")?;
    }
    if let Some(ref realm) = cli.realm {
        config.auth.realm = realm.clone();
    }
    if let Some(ref issuer) = cli.issuer {
        config.auth.issuer = issuer.clone();
    }
    if let Some(ref service) = cli.service {
        config.auth.service = service.clone();
    }
    if let Some(ref dir) = cli.cert_dir {
        config.certs.directory = dir.clone();
    }

    config.validate().context("validating configuration")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_password_reads_first_line() {
        let hash = hash_password_from("test\nignored\n".as_bytes(), 4).unwrap();
        assert!(bcrypt::verify("test", &hash).unwrap());
    }

    #[test]
    fn hash_password_rejects_empty_input() {
        assert!(hash_password_from("\n".as_bytes(), 4).is_err());
        assert!(hash_password_from("".as_bytes(), 4).is_err());
    }

    #[test]
    fn cli_overrides_win() {
        let cli = Cli::try_parse_from([
            "registry-auth",
            "--port",
            "5001",
            "--public",
            "library/,public",
            "--issuer",
            "Example",
        ])
        .unwrap();

        let config = load_config(&cli).unwrap();

        assert_eq!(config.server.port, 5001);
        assert_eq!(config.auth.public_prefixes, vec!["library", "public"]);
        assert_eq!(config.auth.issuer, "Example");
    }

    #[test]
    fn invalid_user_hash_fails_validation() {
        let cli = Cli::try_parse_from(["registry-auth", "--users", "bob: hunter2"]).unwrap();
        assert!(load_config(&cli).is_err());
    }
}
