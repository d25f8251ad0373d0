//! Access policy: decides which requested scopes are granted.
//!
//! # Rules
//!
//! Each requested item is judged on its own:
//!
//! | Credentials | Public repository | Result |
//! |-------------|-------------------|--------|
//! | valid | any | granted as requested |
//! | invalid | no | dropped |
//! | invalid | yes | granted with actions narrowed to `pull` |
//!
//! A repository is public when its name sits under one of the configured
//! prefixes followed by `/`. There are no per-user rules: any caller with
//! valid credentials gets everything it asks for.

use tracing::debug;

use super::scope::{PULL, REPOSITORY, ResourceActions};

/// Compute the approved scope list for a request.
///
/// Order of surviving items is preserved; nothing is merged or deduplicated.
#[must_use]
pub fn authorize(
    requested: &[ResourceActions],
    public_prefixes: &[String],
    valid_credentials: bool,
) -> Vec<ResourceActions> {
    requested
        .iter()
        .filter_map(|scope| {
            let is_public = is_scope_public(public_prefixes, scope);
            let approved = sanitise_scope(scope, is_public, valid_credentials);
            if approved.is_none() {
                debug!(
                    resource_type = %scope.resource_type,
                    name = %scope.name,
                    "Scope dropped for anonymous caller"
                );
            }
            approved
        })
        .collect()
}

/// Whether a scope names a repository under one of the public prefixes.
///
/// `public` covers `public/app` but neither `publicstuff` nor `public` itself,
/// and blank prefixes never match.
#[must_use]
pub fn is_scope_public(public_prefixes: &[String], scope: &ResourceActions) -> bool {
    if scope.resource_type != REPOSITORY {
        return false;
    }

    public_prefixes
        .iter()
        .filter(|prefix| !prefix.trim().is_empty())
        .any(|prefix| {
            scope
                .name
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .is_some_and(|rest| !rest.is_empty())
        })
}

/// Apply the access rules to a single scope item.
///
/// Returns `None` when the item must be dropped.
#[must_use]
pub fn sanitise_scope(
    scope: &ResourceActions,
    is_public: bool,
    valid_credentials: bool,
) -> Option<ResourceActions> {
    if valid_credentials {
        return Some(scope.clone());
    }
    if !is_public {
        return None;
    }
    if scope.is_pull_only() {
        return Some(scope.clone());
    }

    Some(ResourceActions {
        actions: vec![PULL.to_string()],
        ..scope.clone()
    })
}
