//! HTTP handlers for the token endpoint.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | any | `/auth`, `/auth/...` | Token request |
//!
//! ## Request shape
//!
//! - Credentials come from `Authorization: Basic`. A `POST` without a usable
//!   Basic header may instead carry `username` and `password` form fields.
//! - `GET` reads `service` and every `scope` from the query string; repeated
//!   `scope` parameters are joined with spaces.
//! - `POST` reads `service` and `scope` from an urlencoded body, falling back
//!   to the query string. Only `application/x-www-form-urlencoded` bodies are
//!   read; `multipart/form-data` and other bodies are ignored, which leaves
//!   Basic auth and the query string as the only inputs.
//! - Any other method is treated as a request without service or scope.
//!
//! ## Responses
//!
//! `200` with `{"token": t, "access_token": t}`, `401` with a Basic
//! challenge, `400` for an unreadable form body, `500` if signing fails.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{RawQuery, State},
    http::{HeaderMap, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::any,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use super::{AuthOutcome, AuthRequest, TokenServer, scope::parse_scope};

// ── Request / Response types ───────────────────────────────────────────────

/// Successful token response. Both fields carry the same token for clients
/// that only know one of the names.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    /// The signed token.
    pub token: String,
    /// Same token, OAuth2-style name.
    pub access_token: String,
}

impl TokenResponse {
    fn new(token: String) -> Self {
        Self {
            access_token: token.clone(),
            token,
        }
    }
}

/// Why a request could not be turned into an [`AuthRequest`].
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// The urlencoded body was not valid UTF-8.
    #[error("form body is not valid UTF-8")]
    InvalidForm(#[from] std::str::Utf8Error),
}

// ── Route builder ─────────────────────────────────────────────────────────

/// Build the token routes, mounted at `/auth` and everything below it.
pub fn auth_routes(token_server: Arc<TokenServer>) -> Router {
    Router::new()
        .route("/auth", any(handle_auth))
        .route("/auth/{*rest}", any(handle_auth))
        .with_state(token_server)
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn handle_auth(
    State(ts): State<Arc<TokenServer>>,
    method: Method,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response {
    let request = match parse_request(&method, &headers, query.as_deref(), &body) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Unable to parse auth request");
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                "Unable to parse auth request",
            );
        }
    };

    debug!(
        method = %method,
        user = %request.user,
        service = %request.service,
        scopes = request.requested_scope.len(),
        "Auth request"
    );

    match ts.process(request).await {
        AuthOutcome::TokenIssued(token) => {
            (StatusCode::OK, Json(TokenResponse::new(token))).into_response()
        }
        AuthOutcome::Unauthorized => (
            StatusCode::UNAUTHORIZED,
            [(
                header::WWW_AUTHENTICATE,
                format!("Basic realm=\"{}\"", ts.realm()),
            )],
            Json(json!({
                "error": "unauthorized",
                "message": "Authentication required"
            })),
        )
            .into_response(),
        AuthOutcome::Failed => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "server_error",
            "Unable to create token",
        ),
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────

/// Normalize an HTTP request into an [`AuthRequest`].
///
/// # Errors
///
/// Returns [`RequestError::InvalidForm`] when a `POST` form body is not
/// valid UTF-8.
pub fn parse_request(
    method: &Method,
    headers: &HeaderMap,
    query: Option<&str>,
    body: &[u8],
) -> Result<AuthRequest, RequestError> {
    let query = FormValues::parse(query.unwrap_or_default().as_bytes());
    let form = if *method == Method::POST && is_form(headers) {
        FormValues::parse(std::str::from_utf8(body)?.as_bytes())
    } else {
        FormValues::default()
    };

    let (service, scope) = if *method == Method::GET {
        (
            query.first("service").unwrap_or_default().to_string(),
            query.all("scope").join(" "),
        )
    } else if *method == Method::POST {
        (
            form.first("service")
                .or_else(|| query.first("service"))
                .unwrap_or_default()
                .to_string(),
            form.first("scope")
                .or_else(|| query.first("scope"))
                .unwrap_or_default()
                .to_string(),
        )
    } else {
        (String::new(), String::new())
    };

    let (user, password) = basic_credentials(headers)
        .or_else(|| {
            if *method != Method::POST {
                return None;
            }
            let user = form.first("username").unwrap_or_default();
            let password = form.first("password").unwrap_or_default();
            (!user.is_empty() && !password.is_empty())
                .then(|| (user.to_string(), password.to_string()))
        })
        .unwrap_or_default();

    Ok(AuthRequest {
        user,
        password,
        service,
        requested_scope: parse_scope(&scope),
    })
}

/// Decode `Authorization: Basic base64(user:password)`.
///
/// Anything malformed counts as no credentials at all.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = String::from_utf8(STANDARD.decode(encoded).ok()?).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| {
            mime.trim()
                .eq_ignore_ascii_case("application/x-www-form-urlencoded")
        })
}

/// Decoded `application/x-www-form-urlencoded` pairs in input order.
#[derive(Debug, Default)]
struct FormValues(Vec<(String, String)>);

impl FormValues {
    fn parse(input: &[u8]) -> Self {
        Self(url::form_urlencoded::parse(input).into_owned().collect())
    }

    fn first(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn all(&self, key: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

/// Create a JSON error response.
fn error_response(status: StatusCode, error: &str, message: &str) -> Response {
    (status, Json(json!({"error": error, "message": message}))).into_response()
}
