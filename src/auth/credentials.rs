//! Credential store: username to bcrypt hash.

use std::collections::HashMap;

use tracing::debug;

/// Immutable mapping of usernames to bcrypt password hashes.
///
/// Built once at startup and shared read-only across requests.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    users: HashMap<String, String>,
}

impl CredentialStore {
    /// Create a store from a username to hash map.
    #[must_use]
    pub fn new(users: HashMap<String, String>) -> Self {
        Self { users }
    }

    /// Check a username/password pair.
    ///
    /// Unknown users, wrong passwords and unusable stored hashes all come back
    /// as `false`. The bcrypt check is slow on purpose; async callers should
    /// run this on a blocking thread.
    #[must_use]
    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        let Some(hash) = self.users.get(username) else {
            debug!(user = %username, "Unknown user");
            return false;
        };

        match bcrypt::verify(password, hash) {
            Ok(valid) => valid,
            Err(e) => {
                debug!(user = %username, error = %e, "Stored hash could not be verified");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// bcrypt (cost 7) of `test`
    const TEST_HASH: &str = "$2a$07$N/0tVCSbMg.igieLxDNYyOhjJxEIHec1ia01Wgr6jNk4gZwgUUlWq";

    fn store() -> CredentialStore {
        CredentialStore::new(HashMap::from([("test".to_string(), TEST_HASH.to_string())]))
    }

    #[test]
    fn no_users_rejects_everything() {
        let store = CredentialStore::default();
        assert!(!store.authenticate("", ""));
        assert!(!store.authenticate("test", "test"));
    }

    #[test]
    fn unknown_user_is_rejected() {
        assert!(!store().authenticate("test2", ""));
    }

    #[test]
    fn known_user_blank_password_is_rejected() {
        assert!(!store().authenticate("test", ""));
    }

    #[test]
    fn known_user_wrong_password_is_rejected() {
        assert!(!store().authenticate("test", "password"));
    }

    #[test]
    fn known_user_right_password_is_accepted() {
        assert!(store().authenticate("test", "test"));
    }

    #[test]
    fn corrupt_stored_hash_is_rejected_not_raised() {
        // GIVEN: a user whose stored hash is garbage
        let store =
            CredentialStore::new(HashMap::from([("bob".to_string(), "not-a-hash".to_string())]));

        // THEN: verification failure maps to false
        assert!(!store.authenticate("bob", "anything"));
    }
}
