//! Identity provider capability used by the authenticator and the bearer middleware

use crate::auth::token_cache::Credential;
use crate::error::Result;
use async_trait::async_trait;
use secrecy::Secret;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

/// Upper bound on a device code's lifetime, whatever the provider claims
pub const MAX_CODE_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Upper bound on the interval between token polls
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// State needed to finish a device-code exchange after instructions were shown
#[derive(Debug)]
pub struct ExchangeHandle {
    /// Opaque device code used when polling the token endpoint
    pub device_code: Secret<String>,
    /// Initial polling interval
    pub interval: Duration,
    /// The device code is useless after this instant
    pub deadline: Instant,
}

impl ExchangeHandle {
    /// `interval` and `expires_in` come from the provider and are clamped to
    /// [`MAX_POLL_INTERVAL`] and [`MAX_CODE_LIFETIME`].
    pub fn new(device_code: impl Into<String>, interval: Duration, expires_in: Duration) -> Self {
        Self {
            device_code: Secret::new(device_code.into()),
            interval: interval.min(MAX_POLL_INTERVAL),
            deadline: Instant::now() + expires_in.min(MAX_CODE_LIFETIME),
        }
    }
}

/// First half of a device-code exchange
#[derive(Debug)]
pub struct DeviceCodeChallenge {
    /// Human-readable text telling the user where to go and which code to enter
    pub instructions: String,
    pub user_code: String,
    pub verification_uri: String,
    pub handle: ExchangeHandle,
}

/// An OAuth provider able to run a device-code exchange and vouch for tokens
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Request a device code and build the instructions for the user
    async fn begin_device_code_flow(&self) -> Result<DeviceCodeChallenge>;

    /// Poll until the user completes the exchange, the code expires or the
    /// provider rejects it
    async fn await_token(&self, handle: ExchangeHandle) -> Result<Credential>;

    /// Whether the provider accepts `token` as a live access token
    async fn introspect(&self, token: &str) -> Result<bool>;

    /// Profile of the user behind `token`, if the provider exposes one
    async fn user_profile(&self, _token: &str) -> Result<Option<Value>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_handle_clamps_provider_durations() {
        let before = Instant::now();
        let handle = ExchangeHandle::new("code", Duration::from_secs(u64::MAX), Duration::from_secs(u64::MAX));

        assert_eq!(handle.interval, MAX_POLL_INTERVAL);
        assert!(handle.deadline <= Instant::now() + MAX_CODE_LIFETIME);
        assert!(handle.deadline > before);
    }
}
