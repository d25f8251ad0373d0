//! Scope grammar for the registry token protocol.
//!
//! A scope string is a space-separated list of segments, each shaped
//! `type:name:action[,action...]`. The name may itself contain `:`
//! (`host:5000/app`, `app:tag@sha256:...`), so a segment is split on every
//! colon and everything strictly between the first and the last token is
//! glued back together as the name.
//!
//! Parsing is total. Segments that cannot be split into type, name and
//! actions are skipped so that one bad segment never sinks the others.

use serde::{Deserialize, Serialize};

/// Resource type for repository scopes.
pub const REPOSITORY: &str = "repository";

/// Resource type for registry-wide scopes such as the catalog.
pub const REGISTRY: &str = "registry";

/// The action anonymous callers may be granted on public repositories.
pub const PULL: &str = "pull";

/// One requested or granted capability on a named resource.
///
/// Serializes into the `access` claim entry shape the registry expects.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceActions {
    /// Resource category, conventionally `repository` or `registry`.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Opaque sub-classification, passed through untouched.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub class: String,
    /// Resource identifier; may contain `:` and `/`.
    pub name: String,
    /// Requested verbs in request order. Duplicates are kept.
    pub actions: Vec<String>,
}

impl ResourceActions {
    /// Build a scope item without a class.
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>, actions: &[&str]) -> Self {
        Self {
            resource_type: resource_type.into(),
            class: String::new(),
            name: name.into(),
            actions: actions.iter().map(|a| (*a).to_string()).collect(),
        }
    }

    /// Whether the action list is exactly `["pull"]`.
    #[must_use]
    pub fn is_pull_only(&self) -> bool {
        matches!(self.actions.as_slice(), [only] if only == PULL)
    }
}

/// Parse a scope string into resource actions, preserving segment order.
#[must_use]
pub fn parse_scope(scopes: &str) -> Vec<ResourceActions> {
    scopes.split(' ').filter_map(parse_segment).collect()
}

fn parse_segment(segment: &str) -> Option<ResourceActions> {
    if segment.is_empty() || !segment.contains(':') {
        return None;
    }

    let parts: Vec<&str> = segment.split(':').collect();
    if parts.len() < 3 {
        return None;
    }

    let (resource_type, rest) = parts.split_first()?;
    let (actions, name_parts) = rest.split_last()?;

    Some(ResourceActions {
        resource_type: (*resource_type).to_string(),
        class: String::new(),
        name: name_parts.join(":"),
        actions: actions.split(',').map(str::to_string).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn item(resource_type: &str, name: &str, actions: &[&str]) -> ResourceActions {
        ResourceActions::new(resource_type, name, actions)
    }

    #[test]
    fn parse_scope_table() {
        let cases: Vec<(&str, &str, Vec<ResourceActions>)> = vec![
            ("empty", "", vec![]),
            ("missing actions", "repository:imageName", vec![]),
            ("no colon", "repository", vec![]),
            (
                "type with parens",
                "resourceType(resourceValue):imageName:pull",
                vec![item("resourceType(resourceValue)", "imageName", &["pull"])],
            ),
            (
                "one action",
                "resourceType:imageName:pull",
                vec![item("resourceType", "imageName", &["pull"])],
            ),
            (
                "multi part name",
                "resourceType:registryName/component/component:pull",
                vec![item("resourceType", "registryName/component/component", &["pull"])],
            ),
            (
                "port and multi part name",
                "resourceType:registryName:8080/component/component:pull",
                vec![item(
                    "resourceType",
                    "registryName:8080/component/component",
                    &["pull"],
                )],
            ),
            (
                "multiple actions",
                "resourceType:imageName:pull,push",
                vec![item("resourceType", "imageName", &["pull", "push"])],
            ),
            (
                "host with port",
                "resourceType:registryName:8080:pull",
                vec![item("resourceType", "registryName:8080", &["pull"])],
            ),
            (
                "port, path and tag",
                "resourceType:registryName:8080/imageName:tagName:pull",
                vec![item("resourceType", "registryName:8080/imageName:tagName", &["pull"])],
            ),
            (
                "port, path, tag and digest",
                "resourceType:registryName:8080/imageName:tagName@digestName:pull",
                vec![item(
                    "resourceType",
                    "registryName:8080/imageName:tagName@digestName",
                    &["pull"],
                )],
            ),
        ];

        for (name, input, want) in cases {
            assert_eq!(parse_scope(input), want, "case: {name}");
        }
    }

    #[test]
    fn parse_scope_keeps_segment_order_and_skips_bad_segments() {
        // GIVEN: two good segments around a malformed one, with double spaces
        let scopes = "repository:a/b:pull  repository:broken registry:catalog:*";

        // WHEN: parsing
        let parsed = parse_scope(scopes);

        // THEN: the good segments survive in order
        assert_eq!(
            parsed,
            vec![
                item(REPOSITORY, "a/b", &["pull"]),
                item(REGISTRY, "catalog", &["*"]),
            ]
        );
    }

    #[test]
    fn parse_scope_keeps_duplicate_actions() {
        let parsed = parse_scope("repository:app:pull,pull,push");
        assert_eq!(parsed[0].actions, vec!["pull", "pull", "push"]);
    }

    #[test]
    fn parse_scope_never_produces_empty_action_lists() {
        // A trailing colon still yields one (empty) action token rather than none
        let parsed = parse_scope("repository:app:");
        assert_eq!(parsed.len(), 1);
        assert!(!parsed[0].actions.is_empty());
    }

    #[test]
    fn class_is_omitted_from_json_when_empty() {
        let json = serde_json::to_value(item(REPOSITORY, "app", &["pull"])).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "repository", "name": "app", "actions": ["pull"]})
        );
    }

    #[test]
    fn is_pull_only() {
        assert!(item(REPOSITORY, "a", &["pull"]).is_pull_only());
        assert!(!item(REPOSITORY, "a", &["pull", "push"]).is_pull_only());
        assert!(!item(REPOSITORY, "a", &["pull", "pull"]).is_pull_only());
        assert!(!item(REPOSITORY, "a", &["push"]).is_pull_only());
    }
}
