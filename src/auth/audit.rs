//! Audit logging for token decisions.
//!
//! Every event is emitted via `tracing::info!` with the full event serialized
//! into one `audit` field, so log aggregators can pick it up without parsing
//! the message.
//!
//! # Events
//!
//! | Event | When |
//! |-------|------|
//! | `token.issued` | A token was signed and returned, possibly with empty access |
//! | `token.denied` | The caller was sent a `401` challenge |

use serde::Serialize;

use super::scope::ResourceActions;

/// Structured audit event for one auth request.
#[derive(Debug, Serialize)]
pub struct AuditEvent {
    /// Event type string (e.g., `"token.issued"`).
    pub event: &'static str,
    /// Username the caller presented, empty when anonymous.
    pub subject: String,
    /// Requested service (the token audience).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// Whether the credentials checked out.
    pub authenticated: bool,
    /// Number of scope items the caller asked for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested: Option<usize>,
    /// Items placed in the token (for `token.issued`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access: Option<Vec<ResourceActions>>,
    /// Why the request was refused.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditEvent {
    /// Construct a `token.issued` event.
    #[must_use]
    pub fn issued(
        subject: &str,
        service: &str,
        authenticated: bool,
        requested: usize,
        access: &[ResourceActions],
    ) -> Self {
        Self {
            event: "token.issued",
            subject: subject.to_string(),
            service: Some(service.to_string()),
            authenticated,
            requested: Some(requested),
            access: Some(access.to_vec()),
            reason: None,
        }
    }

    /// Construct a `token.denied` event.
    #[must_use]
    pub fn denied(subject: &str, reason: impl Into<String>) -> Self {
        Self {
            event: "token.denied",
            subject: subject.to_string(),
            service: None,
            authenticated: false,
            requested: None,
            access: None,
            reason: Some(reason.into()),
        }
    }
}

/// Emit an audit event via `tracing::info!`.
///
/// ```text
/// INFO registry_auth::auth::audit: token audit audit={"event":"token.issued",...}
/// ```
pub fn emit(event: &AuditEvent) {
    match serde_json::to_string(event) {
        Ok(ref json) => tracing::info!(event = event.event, audit = %json, "token audit"),
        Err(ref e) => tracing::warn!(error = %e, "Failed to serialize audit event"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::scope::{PULL, REPOSITORY};

    #[test]
    fn issued_event_carries_access() {
        // GIVEN: one approved item out of two requested
        let access = vec![ResourceActions::new(REPOSITORY, "public/app", &[PULL])];

        // WHEN: building the event
        let event = AuditEvent::issued("", "registry", false, 2, &access);

        // THEN: type, counts and access are recorded
        assert_eq!(event.event, "token.issued");
        assert_eq!(event.requested, Some(2));
        assert_eq!(event.access.as_deref(), Some(access.as_slice()));
        assert!(event.reason.is_none());
    }

    #[test]
    fn denied_event_contains_reason() {
        let event = AuditEvent::denied("mallory", "invalid credentials");

        assert_eq!(event.event, "token.denied");
        assert_eq!(event.subject, "mallory");
        assert_eq!(event.reason.as_deref(), Some("invalid credentials"));
        assert!(event.access.is_none());
    }

    #[test]
    fn denied_event_json_omits_empty_fields() {
        let json = serde_json::to_value(AuditEvent::denied("", "no scope")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "event": "token.denied",
                "subject": "",
                "authenticated": false,
                "reason": "no scope",
            })
        );
    }

    #[test]
    fn emit_does_not_panic() {
        emit(&AuditEvent::issued("alice", "registry", true, 0, &[]));
        emit(&AuditEvent::denied("", "invalid credentials"));
    }
}
