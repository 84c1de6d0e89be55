//! Caller Identity
//!
//! Narrow interface to the external identity provider: a request credential
//! either verifies to a caller identifier or the request is unauthenticated.
//! The gateway renders missing identity as an expired-equivalent entitlement
//! denial; it never inspects the credential beyond this seam.

use std::collections::HashMap;

use async_trait::async_trait;

/// Verifies request credentials to caller identifiers.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a bearer credential to a caller identifier, or `None` when
    /// the credential is missing, unknown, or invalid.
    async fn verify(&self, credential: &str) -> Option<String>;
}

/// Static API-key identity for local runs and tests: a fixed map from API
/// key to account identifier.
#[derive(Debug, Clone, Default)]
pub struct StaticKeyIdentity {
    keys: HashMap<String, String>,
}

impl StaticKeyIdentity {
    /// Build from an API-key → account-id map.
    pub fn new(keys: HashMap<String, String>) -> Self {
        Self { keys }
    }

    /// Convenience constructor for tests.
    pub fn single(key: &str, account_id: &str) -> Self {
        let mut keys = HashMap::new();
        keys.insert(key.to_string(), account_id.to_string());
        Self { keys }
    }
}

#[async_trait]
impl IdentityProvider for StaticKeyIdentity {
    async fn verify(&self, credential: &str) -> Option<String> {
        self.keys.get(credential).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_known_key_resolves() {
        let identity = StaticKeyIdentity::single("sk-test-1", "acct-1");
        assert_eq!(identity.verify("sk-test-1").await.as_deref(), Some("acct-1"));
    }

    #[tokio::test]
    async fn test_unknown_key_is_unauthenticated() {
        let identity = StaticKeyIdentity::single("sk-test-1", "acct-1");
        assert_eq!(identity.verify("sk-other").await, None);
        assert_eq!(identity.verify("").await, None);
    }
}
