//! HTTP server: router assembly, startup and graceful shutdown.

use std::sync::Arc;

use axum::{Router, extract::DefaultBodyLimit, http::StatusCode, routing::get};
use tokio::{net::TcpListener, signal};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::auth::{SigningKey, TokenProvider, TokenServer, handler::auth_routes};
use crate::certs::ensure_certificate;
use crate::config::Config;
use crate::{Error, Result};

/// The token server process: configuration plus the shared token service.
pub struct AuthServer {
    config: Config,
    token_server: Arc<TokenServer>,
}

impl AuthServer {
    /// Prepare the signing certificate and build the token service.
    ///
    /// # Errors
    ///
    /// Returns an error if the certificate cannot be provisioned or loaded.
    pub fn new(config: Config) -> Result<Self> {
        let cert_path = config.certs.cert_path();
        let key_path = config.certs.key_path();

        ensure_certificate(&cert_path, &key_path)?;
        let signing_key = Arc::new(SigningKey::load(&cert_path, &key_path)?);
        let token_server = Arc::new(TokenServer::new(&config.auth, signing_key));

        Ok(Self {
            config,
            token_server,
        })
    }

    /// Internal token source for in-process callers.
    #[must_use]
    pub fn token_provider(&self) -> Arc<dyn TokenProvider> {
        Arc::clone(&self.token_server) as Arc<dyn TokenProvider>
    }

    /// Build the router serving this instance.
    #[must_use]
    pub fn router(&self) -> Router {
        create_router(Arc::clone(&self.token_server), self.config.server.max_body_size)
    }

    /// Serve until Ctrl-C or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound or the server fails
    /// while running.
    pub async fn run(self) -> Result<()> {
        let app = self.router();
        let listener =
            TcpListener::bind((self.config.server.host.as_str(), self.config.server.port)).await?;

        info!("============================================================");
        info!("REGISTRY AUTH v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.server.host, port = %self.config.server.port, "Listening");
        info!(
            issuer = %self.config.auth.issuer,
            realm = %self.config.auth.realm,
            key_id = %self.token_server.key_id(),
            "Signing tokens"
        );
        info!(cert = %self.config.certs.cert_path().display(), "Registry root certificate");
        info!(users = self.config.auth.users.len(), "Users configured");

        if self.config.auth.public_prefixes.is_empty() {
            info!("No public prefixes - anonymous callers get no access");
        } else {
            info!(prefixes = ?self.config.auth.public_prefixes, "Anonymous pull allowed");
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        Ok(())
    }
}

/// Assemble the router: token endpoints, index, and middleware.
pub fn create_router(token_server: Arc<TokenServer>, max_body_size: usize) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .merge(auth_routes(token_server))
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
}

async fn index_handler() -> StatusCode {
    StatusCode::OK
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
