//! Reuse policy for an already-open connection.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::conversation::ConversationIdentity;

/// Decides whether `connect` may reuse the open connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReusePolicy {
    /// Any open connection is reused, whichever conversation opened it.
    #[default]
    AnyOpen,
    /// Only a connection opened for the same conversation is reused; a
    /// mismatch closes it and opens a new one.
    SameIdentity,
}

impl ReusePolicy {
    /// Returns true if a connection opened for `open_for` may serve `requested`.
    pub fn allows_reuse(
        &self,
        open_for: &ConversationIdentity,
        requested: &ConversationIdentity,
    ) -> bool {
        match self {
            ReusePolicy::AnyOpen => true,
            ReusePolicy::SameIdentity => open_for == requested,
        }
    }
}

impl fmt::Display for ReusePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReusePolicy::AnyOpen => write!(f, "any_open"),
            ReusePolicy::SameIdentity => write!(f, "same_identity"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(proposal: &str) -> ConversationIdentity {
        ConversationIdentity::new("Acme", proposal).unwrap()
    }

    #[test]
    fn any_open_reuses_across_conversations() {
        assert!(ReusePolicy::AnyOpen.allows_reuse(&identity("Q3"), &identity("Q4")));
    }

    #[test]
    fn same_identity_requires_match() {
        let policy = ReusePolicy::SameIdentity;
        assert!(policy.allows_reuse(&identity("Q3"), &identity("Q3")));
        assert!(!policy.allows_reuse(&identity("Q3"), &identity("Q4")));
    }

    #[test]
    fn deserializes_from_snake_case() {
        let policy: ReusePolicy = serde_json::from_str("\"same_identity\"").unwrap();
        assert_eq!(policy, ReusePolicy::SameIdentity);
        assert_eq!(ReusePolicy::default(), ReusePolicy::AnyOpen);
    }
}
