//! Device-code login lifecycle
//!
//! `LoggedOut -> CodePending -> LoggedIn`, back to `LoggedOut` on logout or
//! when an exchange fails. The exchange runs in a spawned task that owns
//! everything it needs, so a caller that stops waiting does not cancel it.
//!
//! Every exchange is tagged with a generation. `logout` and forced re-logins
//! bump the generation under the same lock a finishing exchange must take to
//! commit, so a superseded exchange can never write the cache.

use crate::auth::provider::IdentityProvider;
use crate::auth::token_cache::{Credential, TokenCache};
use crate::error::{GatewayError, Result};
use futures_util::FutureExt;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Authenticator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    LoggedOut,
    CodePending,
    LoggedIn,
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthState::LoggedOut => write!(f, "logged_out"),
            AuthState::CodePending => write!(f, "code_pending"),
            AuthState::LoggedIn => write!(f, "logged_in"),
        }
    }
}

/// Outcome of a login check, failure is data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResult {
    pub success: bool,
    pub message: String,
    #[serde(rename = "userData", skip_serializing_if = "Option::is_none")]
    pub user_data: Option<Value>,
}

impl AuthResult {
    pub fn success<S: Into<String>>(message: S, user_data: Option<Value>) -> Self {
        Self {
            success: true,
            message: message.into(),
            user_data,
        }
    }

    pub fn failure<S: Into<String>>(message: S) -> Self {
        Self {
            success: false,
            message: message.into(),
            user_data: None,
        }
    }
}

/// Progress of one exchange as seen by its waiters
#[derive(Debug, Clone, Default)]
struct ExchangeStatus {
    instructions: Option<String>,
    outcome: Option<std::result::Result<(), GatewayError>>,
}

struct PendingExchange {
    id: Uuid,
    status: Arc<watch::Sender<ExchangeStatus>>,
    task: JoinHandle<()>,
}

impl PendingExchange {
    /// Stop the task and release every waiter with `reason`
    fn cancel(self, reason: &str) {
        self.task.abort();
        let reason = GatewayError::exchange_failed(reason);
        self.status.send_modify(|status| {
            if status.outcome.is_none() {
                status.outcome = Some(Err(reason));
            }
        });
    }
}

struct AuthInner {
    state: AuthState,
    generation: u64,
    pending: Option<PendingExchange>,
}

struct AuthShared {
    provider: Arc<dyn IdentityProvider>,
    cache: Arc<TokenCache>,
    inner: Mutex<AuthInner>,
}

impl AuthShared {
    fn lock(&self) -> MutexGuard<'_, AuthInner> {
        // Critical sections never panic midway; a poisoned guard is still consistent
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publish the instructions if this exchange is still the current one
    fn publish_instructions(&self, generation: u64, status: &watch::Sender<ExchangeStatus>, instructions: &str) -> bool {
        let inner = self.lock();
        if inner.generation != generation {
            return false;
        }
        status.send_modify(|s| s.instructions = Some(instructions.to_string()));
        true
    }

    /// Commit the outcome of an exchange, unless it was superseded
    fn settle(
        &self,
        generation: u64,
        exchange_id: Uuid,
        status: &watch::Sender<ExchangeStatus>,
        result: Result<Credential>,
    ) {
        let mut inner = self.lock();
        if inner.generation != generation {
            debug!(%exchange_id, "Discarding result of superseded login exchange");
            return;
        }

        let outcome = match result {
            Ok(credential) => {
                info!(
                    %exchange_id,
                    expires_at = %credential.expires_at,
                    "Device code login completed"
                );
                self.cache.store(credential);
                inner.state = AuthState::LoggedIn;
                Ok(())
            }
            Err(e) => {
                warn!(%exchange_id, error = %e, "Device code login failed");
                self.cache.clear();
                inner.state = AuthState::LoggedOut;
                Err(match e {
                    GatewayError::AuthExchangeFailed { .. } => e,
                    other => GatewayError::exchange_failed(other.to_string()),
                })
            }
        };

        inner.pending = None;
        status.send_modify(|s| s.outcome = Some(outcome));
    }
}

/// Handle on a started (or joined) login
#[derive(Debug)]
pub struct PendingLogin {
    /// Text telling the user where to go and which code to enter
    pub instructions: String,
    pub exchange_id: Uuid,
    /// True when this call attached to an exchange that was already running
    pub joined: bool,
    status: watch::Receiver<ExchangeStatus>,
}

impl PendingLogin {
    /// Wait for the exchange to settle
    pub async fn settled(mut self) -> Result<()> {
        loop {
            if let Some(outcome) = self.status.borrow_and_update().outcome.clone() {
                return outcome;
            }
            if self.status.changed().await.is_err() {
                return self
                    .status
                    .borrow()
                    .outcome
                    .clone()
                    .unwrap_or_else(|| Err(GatewayError::exchange_failed("Login exchange ended unexpectedly")));
            }
        }
    }
}

/// Drives device-code logins and owns the credential lifecycle
#[derive(Clone)]
pub struct DeviceCodeAuthenticator {
    shared: Arc<AuthShared>,
}

impl fmt::Debug for DeviceCodeAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceCodeAuthenticator")
            .field("provider", &self.shared.provider.name())
            .field("state", &self.state())
            .finish()
    }
}

impl DeviceCodeAuthenticator {
    pub fn new(provider: Arc<dyn IdentityProvider>, cache: Arc<TokenCache>) -> Self {
        Self {
            shared: Arc::new(AuthShared {
                provider,
                cache,
                inner: Mutex::new(AuthInner {
                    state: AuthState::LoggedOut,
                    generation: 0,
                    pending: None,
                }),
            }),
        }
    }

    pub fn cache(&self) -> &Arc<TokenCache> {
        &self.shared.cache
    }

    /// Current state; a `LoggedIn` whose credential expired reads as `LoggedOut`
    pub fn state(&self) -> AuthState {
        let state = self.shared.lock().state;
        match state {
            AuthState::LoggedIn if !self.shared.cache.is_logged_in() => AuthState::LoggedOut,
            other => other,
        }
    }

    /// Start a device-code exchange and return once the instructions are known.
    ///
    /// While an exchange is pending, `force = false` joins it and returns the
    /// same instructions; `force = true` cancels it and starts over.
    pub async fn begin_login(&self, force: bool) -> Result<PendingLogin> {
        let (mut status, exchange_id, joined) = {
            let mut inner = self.shared.lock();
            let joinable = if force {
                None
            } else {
                // A finished task that left `pending` behind died without settling
                inner
                    .pending
                    .as_ref()
                    .filter(|p| !p.task.is_finished())
                    .map(|p| (p.status.subscribe(), p.id))
            };

            match joinable {
                Some((status, id)) => {
                    debug!(exchange_id = %id, "Joining pending login exchange");
                    (status, id, true)
                }
                None => {
                    let (status, id) = self.start_exchange(&mut inner);
                    (status, id, false)
                }
            }
        };

        let instructions = Self::wait_for_instructions(&mut status).await?;

        Ok(PendingLogin {
            instructions,
            exchange_id,
            joined,
            status,
        })
    }

    /// Like [`begin_login`](Self::begin_login) without joining: fails with
    /// `AlreadyInProgress` while an exchange is pending.
    pub async fn try_begin_login(&self) -> Result<PendingLogin> {
        if self.shared.lock().pending.is_some() {
            return Err(GatewayError::AlreadyInProgress);
        }
        self.begin_login(false).await
    }

    /// Run a device-code login to completion.
    ///
    /// `on_instructions` is called once, before the exchange resolves, as
    /// soon as the provider has issued a code. It is not called if the
    /// provider refuses to issue one.
    pub async fn acquire_token_by_device_code<F>(&self, on_instructions: F) -> Result<()>
    where
        F: FnOnce(String) + Send,
    {
        let pending = self.begin_login(false).await?;
        on_instructions(pending.instructions.clone());
        pending.settled().await
    }

    /// Report whether a valid credential is cached. Never changes state.
    pub async fn test_login(&self) -> AuthResult {
        let credential = match self.shared.cache.current() {
            Some(credential) => credential,
            None => {
                return match self.state() {
                    AuthState::CodePending => AuthResult::failure(
                        "Login pending: complete the device code sign-in to continue",
                    ),
                    _ => AuthResult::failure("Not logged in"),
                }
            }
        };

        let user_data = match self
            .shared
            .provider
            .user_profile(credential.access_token.expose_secret())
            .await
        {
            Ok(profile) => profile,
            Err(e) => {
                debug!("Could not fetch user profile: {}", e);
                None
            }
        };

        AuthResult::success("Login successful", user_data)
    }

    /// Forget the credential and cancel any pending exchange. Idempotent.
    pub fn logout(&self) {
        let mut inner = self.shared.lock();
        inner.generation += 1;
        if let Some(pending) = inner.pending.take() {
            info!(exchange_id = %pending.id, "Cancelling pending login exchange on logout");
            pending.cancel("Login cancelled by logout");
        }
        let had_credential = self.shared.cache.clear();
        inner.state = AuthState::LoggedOut;
        info!(had_credential, "Logged out");
    }

    fn start_exchange(&self, inner: &mut AuthInner) -> (watch::Receiver<ExchangeStatus>, Uuid) {
        inner.generation += 1;
        if let Some(previous) = inner.pending.take() {
            info!(exchange_id = %previous.id, "Restarting login exchange");
            previous.cancel("Login superseded by a new login request");
        }

        let generation = inner.generation;
        let exchange_id = Uuid::new_v4();
        let (tx, rx) = watch::channel(ExchangeStatus::default());
        let status = Arc::new(tx);

        let task = tokio::spawn(Self::run_exchange(
            Arc::clone(&self.shared),
            generation,
            exchange_id,
            Arc::clone(&status),
        ));

        inner.state = AuthState::CodePending;
        inner.pending = Some(PendingExchange {
            id: exchange_id,
            status,
            task,
        });

        info!(%exchange_id, provider = self.shared.provider.name(), "Started device code login");
        (rx, exchange_id)
    }

    /// Drive one exchange; a panic in the provider settles it as failed
    async fn run_exchange(
        shared: Arc<AuthShared>,
        generation: u64,
        exchange_id: Uuid,
        status: Arc<watch::Sender<ExchangeStatus>>,
    ) {
        let exchange = Self::drive_exchange(Arc::clone(&shared), generation, exchange_id, Arc::clone(&status));
        if AssertUnwindSafe(exchange).catch_unwind().await.is_err() {
            error!(%exchange_id, "Login exchange panicked");
            shared.settle(
                generation,
                exchange_id,
                &status,
                Err(GatewayError::exchange_failed("Login exchange failed unexpectedly")),
            );
        }
    }

    async fn drive_exchange(
        shared: Arc<AuthShared>,
        generation: u64,
        exchange_id: Uuid,
        status: Arc<watch::Sender<ExchangeStatus>>,
    ) {
        let challenge = match shared.provider.begin_device_code_flow().await {
            Ok(challenge) => challenge,
            Err(e) => {
                shared.settle(generation, exchange_id, &status, Err(e));
                return;
            }
        };

        if !shared.publish_instructions(generation, &status, &challenge.instructions) {
            return;
        }
        info!(
            %exchange_id,
            user_code = %challenge.user_code,
            verification_uri = %challenge.verification_uri,
            "Waiting for user to complete device code sign-in"
        );

        let deadline = challenge.handle.deadline;
        let result = match tokio::time::timeout_at(deadline, shared.provider.await_token(challenge.handle)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::exchange_failed(
                "Device code expired before sign-in completed",
            )),
        };

        shared.settle(generation, exchange_id, &status, result);
    }

    async fn wait_for_instructions(status: &mut watch::Receiver<ExchangeStatus>) -> Result<String> {
        loop {
            {
                let current = status.borrow_and_update();
                if let Some(ref instructions) = current.instructions {
                    return Ok(instructions.clone());
                }
                if let Some(Err(ref e)) = current.outcome {
                    return Err(e.clone());
                }
            }
            if status.changed().await.is_err() {
                let current = status.borrow();
                return match (&current.instructions, &current.outcome) {
                    (Some(instructions), _) => Ok(instructions.clone()),
                    (None, Some(Err(e))) => Err(e.clone()),
                    _ => Err(GatewayError::exchange_failed("Login exchange ended unexpectedly")),
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_helpers::ScriptedProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn authenticator(provider: ScriptedProvider) -> (DeviceCodeAuthenticator, Arc<ScriptedProvider>) {
        let provider = Arc::new(provider);
        let auth = DeviceCodeAuthenticator::new(provider.clone(), Arc::new(TokenCache::new()));
        (auth, provider)
    }

    #[tokio::test]
    async fn test_starts_logged_out() {
        let (auth, _) = authenticator(ScriptedProvider::new("login instructions"));
        assert_eq!(auth.state(), AuthState::LoggedOut);

        let result = auth.test_login().await;
        assert!(!result.success);
        assert_eq!(result.message, "Not logged in");
    }

    #[tokio::test]
    async fn test_acquire_calls_instructions_once_and_logs_in() {
        let (auth, provider) = authenticator(ScriptedProvider::new("go to example.com"));
        let calls = AtomicUsize::new(0);

        auth.acquire_token_by_device_code(|text| {
            assert_eq!(text, "go to example.com");
            calls.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(auth.state(), AuthState::LoggedIn);
        assert!(auth.cache().validate(ScriptedProvider::DEFAULT_TOKEN));
        assert_eq!(provider.begin_calls(), 1);

        let result = auth.test_login().await;
        assert!(result.success);
        assert_eq!(result.message, "Login successful");
    }

    #[tokio::test]
    async fn test_denied_exchange_returns_to_logged_out() {
        let (auth, _) = authenticator(ScriptedProvider::new("instructions").denying());

        let err = auth.acquire_token_by_device_code(|_| {}).await.unwrap_err();
        assert!(matches!(err, GatewayError::AuthExchangeFailed { .. }));
        assert_eq!(auth.state(), AuthState::LoggedOut);
        assert!(!auth.test_login().await.success);
    }

    #[tokio::test]
    async fn test_provider_refusing_code_skips_callback() {
        let (auth, _) = authenticator(ScriptedProvider::new("unused").failing_begin("provider down"));
        let calls = AtomicUsize::new(0);

        let err = auth
            .acquire_token_by_device_code(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::AuthExchangeFailed { .. }));
        assert!(err.to_string().contains("provider down"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(auth.state(), AuthState::LoggedOut);
    }

    #[tokio::test]
    async fn test_concurrent_login_joins_pending_exchange() {
        let (auth, provider) = authenticator(ScriptedProvider::new("shared code").held());

        let first = auth.begin_login(false).await.unwrap();
        assert_eq!(auth.state(), AuthState::CodePending);
        let second = auth.begin_login(false).await.unwrap();

        assert!(!first.joined);
        assert!(second.joined);
        assert_eq!(first.exchange_id, second.exchange_id);
        assert_eq!(second.instructions, "shared code");
        assert_eq!(provider.begin_calls(), 1);

        provider.release();
        first.settled().await.unwrap();
        second.settled().await.unwrap();
        assert_eq!(auth.state(), AuthState::LoggedIn);
    }

    #[tokio::test]
    async fn test_try_begin_login_reports_already_in_progress() {
        let (auth, provider) = authenticator(ScriptedProvider::new("code").held());
        let _pending = auth.begin_login(false).await.unwrap();

        let err = auth.try_begin_login().await.unwrap_err();
        assert!(matches!(err, GatewayError::AlreadyInProgress));
        assert_eq!(provider.begin_calls(), 1);
    }

    #[tokio::test]
    async fn test_forced_login_supersedes_pending_exchange() {
        let (auth, provider) = authenticator(ScriptedProvider::new("code").held());

        let first = auth.begin_login(false).await.unwrap();
        let second = auth.begin_login(true).await.unwrap();
        assert_ne!(first.exchange_id, second.exchange_id);
        assert_eq!(provider.begin_calls(), 2);

        let err = first.settled().await.unwrap_err();
        assert!(err.to_string().contains("superseded"));

        provider.release();
        second.settled().await.unwrap();
        assert_eq!(auth.state(), AuthState::LoggedIn);
    }

    #[tokio::test]
    async fn test_logout_wins_over_pending_login() {
        let (auth, provider) = authenticator(ScriptedProvider::new("code").held());

        let pending = auth.begin_login(false).await.unwrap();
        auth.logout();
        assert_eq!(auth.state(), AuthState::LoggedOut);

        provider.release();
        let err = pending.settled().await.unwrap_err();
        assert!(err.to_string().contains("logout"));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!auth.test_login().await.success);
        assert!(!auth.cache().validate(ScriptedProvider::DEFAULT_TOKEN));
        assert_eq!(auth.state(), AuthState::LoggedOut);
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let (auth, _) = authenticator(ScriptedProvider::new("code"));
        auth.acquire_token_by_device_code(|_| {}).await.unwrap();

        auth.logout();
        auth.logout();
        assert_eq!(auth.state(), AuthState::LoggedOut);
        assert!(!auth.test_login().await.success);
    }

    #[tokio::test]
    async fn test_abandoned_login_still_completes() {
        let (auth, provider) = authenticator(ScriptedProvider::new("code").held());

        let pending = auth.begin_login(false).await.unwrap();
        drop(pending);

        provider.release();
        for _ in 0..50 {
            if auth.state() == AuthState::LoggedIn {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(auth.state(), AuthState::LoggedIn);
    }

    #[tokio::test]
    async fn test_exchange_bounded_by_code_expiry() {
        let provider = ScriptedProvider::new("code").held().with_code_expiry(Duration::from_millis(50));
        let (auth, _) = authenticator(provider);

        let err = auth.acquire_token_by_device_code(|_| {}).await.unwrap_err();
        assert!(err.to_string().contains("expired"));
        assert_eq!(auth.state(), AuthState::LoggedOut);
    }

    #[tokio::test]
    async fn test_oversized_code_expiry_still_logs_in() {
        let provider = ScriptedProvider::new("code").with_code_expiry(Duration::from_secs(u64::MAX));
        let (auth, _) = authenticator(provider);

        let result = tokio::time::timeout(Duration::from_secs(2), auth.acquire_token_by_device_code(|_| {})).await;
        assert!(result.expect("login must not hang").is_ok());
        assert_eq!(auth.state(), AuthState::LoggedIn);
    }

    #[tokio::test]
    async fn test_panicking_exchange_settles_as_failed() {
        let (auth, provider) = authenticator(ScriptedProvider::new("code").panicking());

        let pending = auth.begin_login(false).await.unwrap();
        assert_eq!(pending.instructions, "code");

        let err = tokio::time::timeout(Duration::from_secs(2), pending.settled())
            .await
            .expect("waiters must be released")
            .unwrap_err();
        assert!(matches!(err, GatewayError::AuthExchangeFailed { .. }));
        assert_eq!(auth.state(), AuthState::LoggedOut);

        let next = tokio::time::timeout(Duration::from_secs(2), auth.begin_login(false))
            .await
            .expect("a later login must not join the dead exchange")
            .unwrap();
        assert!(!next.joined);
        assert_eq!(provider.begin_calls(), 2);
    }

    #[tokio::test]
    async fn test_pending_state_reported_by_test_login() {
        let (auth, _) = authenticator(ScriptedProvider::new("code").held());
        let _pending = auth.begin_login(false).await.unwrap();

        let result = auth.test_login().await;
        assert!(!result.success);
        assert!(result.message.starts_with("Login pending"));
        assert_eq!(auth.state(), AuthState::CodePending);
    }

    #[tokio::test]
    async fn test_user_data_included_when_available() {
        let provider = ScriptedProvider::new("code").with_profile(serde_json::json!({"displayName": "Ada"}));
        let (auth, _) = authenticator(provider);
        auth.acquire_token_by_device_code(|_| {}).await.unwrap();

        let result = auth.test_login().await;
        assert_eq!(result.user_data, Some(serde_json::json!({"displayName": "Ada"})));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["userData"]["displayName"], "Ada");
    }
}
