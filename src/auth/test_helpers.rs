//! Scripted identity provider for exercising the login lifecycle without a
//! real OAuth server.
//!
//! ```rust
//! use authgate::auth::test_helpers::ScriptedProvider;
//!
//! let provider = ScriptedProvider::new("login instructions").held();
//! // ... start a login, then
//! provider.release();
//! ```

use crate::auth::provider::{DeviceCodeChallenge, ExchangeHandle, IdentityProvider};
use crate::auth::token_cache::Credential;
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

/// In-memory provider with a fixed script
#[derive(Debug)]
pub struct ScriptedProvider {
    instructions: String,
    token: String,
    begin_error: Option<String>,
    introspect_error: Option<String>,
    deny: bool,
    panic_on_await: bool,
    held: bool,
    code_expiry: Duration,
    profile: Option<Value>,
    foreign_tokens: Mutex<HashSet<String>>,
    release: Notify,
    begin_calls: AtomicUsize,
    introspect_calls: AtomicUsize,
}

impl ScriptedProvider {
    /// Token issued by a successful scripted exchange
    pub const DEFAULT_TOKEN: &'static str = "scripted-access-token";

    pub fn new(instructions: &str) -> Self {
        Self {
            instructions: instructions.to_string(),
            token: Self::DEFAULT_TOKEN.to_string(),
            begin_error: None,
            introspect_error: None,
            deny: false,
            panic_on_await: false,
            held: false,
            code_expiry: Duration::from_secs(900),
            profile: None,
            foreign_tokens: Mutex::new(HashSet::new()),
            release: Notify::new(),
            begin_calls: AtomicUsize::new(0),
            introspect_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = token.to_string();
        self
    }

    /// Fail before a code is issued
    pub fn failing_begin(mut self, message: &str) -> Self {
        self.begin_error = Some(message.to_string());
        self
    }

    /// Introspection fails as if the provider were unreachable
    pub fn failing_introspection(mut self, message: &str) -> Self {
        self.introspect_error = Some(message.to_string());
        self
    }

    /// The user declines at the provider
    pub fn denying(mut self) -> Self {
        self.deny = true;
        self
    }

    /// Panic inside the exchange after the code is issued
    pub fn panicking(mut self) -> Self {
        self.panic_on_await = true;
        self
    }

    /// Hold every exchange until [`release`](Self::release) is called
    pub fn held(mut self) -> Self {
        self.held = true;
        self
    }

    pub fn with_code_expiry(mut self, expiry: Duration) -> Self {
        self.code_expiry = expiry;
        self
    }

    pub fn with_profile(mut self, profile: Value) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Token the provider vouches for on introspection
    pub fn accepting(self, token: &str) -> Self {
        self.accept(token);
        self
    }

    pub fn accept(&self, token: &str) {
        if let Ok(mut tokens) = self.foreign_tokens.lock() {
            tokens.insert(token.to_string());
        }
    }

    /// Let one held exchange finish
    pub fn release(&self) {
        self.release.notify_one();
    }

    pub fn begin_calls(&self) -> usize {
        self.begin_calls.load(Ordering::SeqCst)
    }

    pub fn introspect_calls(&self) -> usize {
        self.introspect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn begin_device_code_flow(&self) -> Result<DeviceCodeChallenge> {
        self.begin_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(ref message) = self.begin_error {
            return Err(GatewayError::exchange_failed(message.clone()));
        }

        Ok(DeviceCodeChallenge {
            instructions: self.instructions.clone(),
            user_code: "SCRIPTED".to_string(),
            verification_uri: "https://login.example.com/device".to_string(),
            handle: ExchangeHandle::new("scripted-device-code", Duration::from_millis(5), self.code_expiry),
        })
    }

    async fn await_token(&self, _handle: ExchangeHandle) -> Result<Credential> {
        if self.held {
            self.release.notified().await;
        }
        if self.panic_on_await {
            panic!("scripted provider panicked while polling");
        }
        if self.deny {
            return Err(GatewayError::exchange_failed("User denied device authorization"));
        }
        Ok(Credential::from_device_code(self.token.clone(), 3600, None))
    }

    async fn introspect(&self, token: &str) -> Result<bool> {
        self.introspect_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(ref message) = self.introspect_error {
            return Err(GatewayError::auth(message.clone()));
        }
        Ok(self
            .foreign_tokens
            .lock()
            .map(|tokens| tokens.contains(token))
            .unwrap_or(false))
    }

    async fn user_profile(&self, _token: &str) -> Result<Option<Value>> {
        Ok(self.profile.clone())
    }
}
