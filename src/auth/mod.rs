//! Registry token service: Basic credentials in, signed bearer tokens out.
//!
//! A registry that answers `401` points clients at this service with a
//! `service` and one or more `scope` values. The service:
//!
//! 1. **Authenticates** the optional username/password against the bcrypt
//!    credential store.
//! 2. **Authorizes** each requested scope item independently via [`policy`].
//! 3. **Signs** a short-lived RS256 token listing the approved items.
//!
//! # Decision flow
//!
//! ```text
//! request
//!   -> check credentials (blocking bcrypt, off the async runtime)
//!   -> no scope requested?
//!        valid credentials -> token with empty access (login probe)
//!        otherwise         -> 401 challenge
//!   -> filter scope items (public prefixes, credentials)
//!   -> sign token, possibly with empty access
//! ```
//!
//! A request that asks for scopes but gets none approved still receives a
//! token; the registry then refuses the operation itself.

pub mod audit;
pub mod credentials;
pub mod handler;
pub mod keys;
pub mod policy;
pub mod scope;
pub mod token;

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::Result;
use crate::config::AuthConfig;

pub use audit::AuditEvent;
pub use credentials::CredentialStore;
pub use keys::SigningKey;
pub use scope::{ResourceActions, parse_scope};
pub use token::{Claims, TokenIssuer, TokenProvider};

use scope::{PULL, REGISTRY, REPOSITORY};

/// One normalized token request, independent of how it arrived over HTTP.
#[derive(Clone, Default)]
pub struct AuthRequest {
    /// Presented username, empty when none.
    pub user: String,
    /// Presented password, empty when none.
    pub password: String,
    /// Requested service; becomes the token audience.
    pub service: String,
    /// Parsed scope items in request order.
    pub requested_scope: Vec<ResourceActions>,
}

impl fmt::Debug for AuthRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthRequest")
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("service", &self.service)
            .field("requested_scope", &self.requested_scope)
            .finish()
    }
}

/// Result of processing an [`AuthRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// A signed token to hand back with `200`.
    TokenIssued(String),
    /// Reply `401` with a Basic challenge.
    Unauthorized,
    /// Signing failed; reply `500`.
    Failed,
}

/// Central coordinator for token requests.
///
/// Immutable after construction and shared across request handlers.
pub struct TokenServer {
    credentials: Arc<CredentialStore>,
    public_prefixes: Vec<String>,
    issuer: TokenIssuer,
    realm: String,
    service: String,
}

impl TokenServer {
    /// Create a token server from configuration and a loaded signing key.
    #[must_use]
    pub fn new(config: &AuthConfig, signing_key: Arc<SigningKey>) -> Self {
        Self {
            credentials: Arc::new(CredentialStore::new(config.users.clone())),
            public_prefixes: config.public_prefixes.clone(),
            issuer: TokenIssuer::new(signing_key, config.issuer.clone()),
            realm: config.realm.clone(),
            service: config.service.clone(),
        }
    }

    /// Realm named in `WWW-Authenticate` challenges.
    #[must_use]
    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Key identifier of the signing certificate.
    #[must_use]
    pub fn key_id(&self) -> &str {
        self.issuer.key_id()
    }

    /// Decide a token request.
    pub async fn process(&self, request: AuthRequest) -> AuthOutcome {
        let valid_credentials = self.check_credentials(&request).await;

        if request.requested_scope.is_empty() && !valid_credentials {
            audit::emit(&AuditEvent::denied(
                &request.user,
                "no scope requested and credentials invalid",
            ));
            return AuthOutcome::Unauthorized;
        }

        let approved = policy::authorize(
            &request.requested_scope,
            &self.public_prefixes,
            valid_credentials,
        );

        match self.issuer.issue(&request.user, &request.service, &approved) {
            Ok(token) => {
                audit::emit(&AuditEvent::issued(
                    &request.user,
                    &request.service,
                    valid_credentials,
                    request.requested_scope.len(),
                    &approved,
                ));
                AuthOutcome::TokenIssued(token)
            }
            Err(e) => {
                error!(error = %e, user = %request.user, "Failed to sign token");
                AuthOutcome::Failed
            }
        }
    }

    /// Run the bcrypt check on the blocking pool.
    async fn check_credentials(&self, request: &AuthRequest) -> bool {
        if request.user.is_empty() && request.password.is_empty() {
            debug!("Anonymous request");
            return false;
        }

        let store = Arc::clone(&self.credentials);
        let user = request.user.clone();
        let password = request.password.clone();

        match tokio::task::spawn_blocking(move || store.authenticate(&user, &password)).await {
            Ok(valid) => valid,
            Err(e) => {
                warn!(error = %e, "Credential check task failed");
                false
            }
        }
    }
}

impl TokenProvider for TokenServer {
    fn obtain_token(&self, repositories: &[String]) -> Result<String> {
        let access: Vec<ResourceActions> = if repositories.is_empty() {
            vec![ResourceActions::new(REGISTRY, "catalog", &["*"])]
        } else {
            repositories
                .iter()
                .map(|repo| ResourceActions::new(REPOSITORY, repo.as_str(), &[PULL]))
                .collect()
        };

        self.issuer.issue("", &self.service, &access)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::tests::test_keys;
    use jsonwebtoken::{Algorithm, EncodingKey, Validation};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    /// bcrypt (cost 7) of `test`
    const TEST_HASH: &str = "$2a$07$N/0tVCSbMg.igieLxDNYyOhjJxEIHec1ia01Wgr6jNk4gZwgUUlWq";

    fn server() -> TokenServer {
        let config = AuthConfig {
            public_prefixes: vec!["public".to_string()],
            users: HashMap::from([("test".to_string(), TEST_HASH.to_string())]),
            ..AuthConfig::default()
        };
        TokenServer::new(&config, Arc::clone(&test_keys().signing))
    }

    fn claims_of(token: &str) -> Claims {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_aud = false;
        jsonwebtoken::decode::<Claims>(token, &test_keys().decoding, &validation)
            .unwrap()
            .claims
    }

    fn request(user: &str, password: &str, scope: &str) -> AuthRequest {
        AuthRequest {
            user: user.to_string(),
            password: password.to_string(),
            service: "registry.example.com".to_string(),
            requested_scope: parse_scope(scope),
        }
    }

    fn issued(outcome: AuthOutcome) -> Claims {
        match outcome {
            AuthOutcome::TokenIssued(token) => claims_of(&token),
            other => panic!("expected token, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn anonymous_without_scope_is_unauthorized() {
        let outcome = server().process(request("", "", "")).await;
        assert_eq!(outcome, AuthOutcome::Unauthorized);
    }

    #[tokio::test]
    async fn wrong_password_without_scope_is_unauthorized() {
        let outcome = server().process(request("test", "nope", "")).await;
        assert_eq!(outcome, AuthOutcome::Unauthorized);
    }

    #[tokio::test]
    async fn login_probe_gets_empty_access() {
        // GIVEN: valid credentials and no scope
        // WHEN: processing
        let claims = issued(server().process(request("test", "test", "")).await);

        // THEN: token names the user and grants nothing
        assert_eq!(claims.sub, "test");
        assert_eq!(claims.aud, "registry.example.com");
        assert!(claims.access.is_empty());
    }

    #[tokio::test]
    async fn anonymous_public_push_is_narrowed_to_pull() {
        let claims = issued(
            server()
                .process(request("", "", "repository:public/app:push,pull"))
                .await,
        );
        assert_eq!(
            claims.access,
            vec![ResourceActions::new(REPOSITORY, "public/app", &[PULL])]
        );
    }

    #[tokio::test]
    async fn anonymous_private_gets_token_without_access() {
        let claims = issued(server().process(request("", "", "repository:private/app:pull")).await);
        assert!(claims.access.is_empty());
    }

    #[tokio::test]
    async fn authenticated_gets_everything_requested() {
        let claims = issued(
            server()
                .process(request("test", "test", "repository:private/app:push,pull"))
                .await,
        );
        assert_eq!(
            claims.access,
            vec![ResourceActions::new(REPOSITORY, "private/app", &["push", "pull"])]
        );
    }

    #[tokio::test]
    async fn bad_credentials_with_scope_are_treated_as_anonymous() {
        let claims = issued(
            server()
                .process(request(
                    "test",
                    "nope",
                    "repository:public/a:push repository:private/b:pull",
                ))
                .await,
        );
        assert_eq!(
            claims.access,
            vec![ResourceActions::new(REPOSITORY, "public/a", &[PULL])]
        );
    }

    #[tokio::test]
    async fn signing_failure_is_reported_as_failed() {
        // GIVEN: a key that cannot produce RS256 signatures
        let key = SigningKey::from_parts("TEST", EncodingKey::from_secret(b"not an rsa key"));
        let server = TokenServer::new(&AuthConfig::default(), Arc::new(key));

        // WHEN: a request that would otherwise get a token
        let outcome = server.process(request("", "", "repository:app:pull")).await;

        // THEN: no token, just a failure
        assert_eq!(outcome, AuthOutcome::Failed);
        assert!(server.obtain_token(&[]).is_err());
    }

    #[test]
    fn obtain_token_without_repositories_grants_catalog() {
        let claims = claims_of(&server().obtain_token(&[]).unwrap());
        assert_eq!(
            claims.access,
            vec![ResourceActions::new(REGISTRY, "catalog", &["*"])]
        );
        assert_eq!(claims.aud, "Registry");
    }

    #[test]
    fn obtain_token_grants_pull_per_repository() {
        let repos = vec!["a/b".to_string(), "c".to_string()];
        let claims = claims_of(&server().obtain_token(&repos).unwrap());
        assert_eq!(
            claims.access,
            vec![
                ResourceActions::new(REPOSITORY, "a/b", &[PULL]),
                ResourceActions::new(REPOSITORY, "c", &[PULL]),
            ]
        );
    }

    #[test]
    fn debug_redacts_password() {
        let rendered = format!("{:?}", request("test", "hunter2", ""));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
