//! Single-slot credential cache
//!
//! The gateway serves one logical identity, so the cache holds at most one
//! [`Credential`]. Every write replaces the whole value under the lock.

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use tracing::debug;

// One year; provider values beyond this are clamped
const MAX_LIFETIME_SECS: u64 = 365 * 24 * 3600;

/// How a credential was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquiredVia {
    DeviceCode,
}

/// Access token obtained from the identity provider
#[derive(Debug, Clone)]
pub struct Credential {
    /// Bearer token (sensitive, never logged)
    pub access_token: Secret<String>,
    /// Token type reported by the provider, usually "Bearer"
    pub token_type: String,
    /// Absolute expiry
    pub expires_at: DateTime<Utc>,
    pub acquired_via: AcquiredVia,
    /// Granted scope, if the provider reported one
    pub scope: Option<String>,
}

impl Credential {
    /// Build a device-code credential that expires `expires_in` seconds from now
    pub fn from_device_code(access_token: String, expires_in: u64, scope: Option<String>) -> Self {
        let expires_in = expires_in.min(MAX_LIFETIME_SECS) as i64;
        Self {
            access_token: Secret::new(access_token),
            token_type: "Bearer".to_string(),
            expires_at: Utc::now() + Duration::seconds(expires_in),
            acquired_via: AcquiredVia::DeviceCode,
            scope,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Seconds until expiry, zero when already expired
    pub fn remaining_secs(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds().max(0)
    }

    /// Compare a presented bearer token against this credential in constant time
    pub fn matches(&self, presented: &str) -> bool {
        constant_time_eq(self.access_token.expose_secret().as_bytes(), presented.as_bytes())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Process-wide token cache
#[derive(Debug, Default)]
pub struct TokenCache {
    slot: RwLock<Option<Credential>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached credential
    pub fn store(&self, credential: Credential) {
        debug!(
            expires_at = %credential.expires_at,
            acquired_via = ?credential.acquired_via,
            "Storing credential"
        );
        *self.write_slot() = Some(credential);
    }

    /// Drop the cached credential, returning whether one was present
    pub fn clear(&self) -> bool {
        self.write_slot().take().is_some()
    }

    /// The cached credential if present and unexpired
    pub fn current(&self) -> Option<Credential> {
        self.read_slot().as_ref().filter(|c| !c.is_expired()).cloned()
    }

    /// Whether `token` matches the cached, unexpired credential
    pub fn validate(&self, token: &str) -> bool {
        self.read_slot()
            .as_ref()
            .map(|c| !c.is_expired() && c.matches(token))
            .unwrap_or(false)
    }

    pub fn is_logged_in(&self) -> bool {
        self.current().is_some()
    }

    // Writes are single assignments, a poisoned slot is still consistent
    fn read_slot(&self) -> std::sync::RwLockReadGuard<'_, Option<Credential>> {
        self.slot.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_slot(&self) -> std::sync::RwLockWriteGuard<'_, Option<Credential>> {
        self.slot.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expired_credential() -> Credential {
        let mut credential = Credential::from_device_code("old".to_string(), 3600, None);
        credential.expires_at = Utc::now() - Duration::seconds(1);
        credential
    }

    #[test]
    fn test_empty_cache() {
        let cache = TokenCache::new();
        assert!(cache.current().is_none());
        assert!(!cache.is_logged_in());
        assert!(!cache.validate("anything"));
        assert!(!cache.clear());
    }

    #[test]
    fn test_store_and_validate() {
        let cache = TokenCache::new();
        cache.store(Credential::from_device_code("token-a".to_string(), 3600, Some("User.Read".to_string())));

        assert!(cache.is_logged_in());
        assert!(cache.validate("token-a"));
        assert!(!cache.validate("token-b"));
        assert!(!cache.validate("token-a "));
        assert!(!cache.validate(""));

        let current = cache.current().unwrap();
        assert_eq!(current.acquired_via, AcquiredVia::DeviceCode);
        assert_eq!(current.token_type, "Bearer");
        assert!(current.remaining_secs() > 3500);
    }

    #[test]
    fn test_store_replaces_previous() {
        let cache = TokenCache::new();
        cache.store(Credential::from_device_code("first".to_string(), 3600, None));
        cache.store(Credential::from_device_code("second".to_string(), 3600, None));

        assert!(!cache.validate("first"));
        assert!(cache.validate("second"));
    }

    #[test]
    fn test_expired_credential_is_absent() {
        let cache = TokenCache::new();
        cache.store(expired_credential());

        assert!(cache.current().is_none());
        assert!(!cache.is_logged_in());
        assert!(!cache.validate("old"));
        assert_eq!(expired_credential().remaining_secs(), 0);
    }

    #[test]
    fn test_clear() {
        let cache = TokenCache::new();
        cache.store(Credential::from_device_code("token".to_string(), 60, None));
        assert!(cache.clear());
        assert!(!cache.validate("token"));
        assert!(!cache.clear());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"", b""));
    }
}
