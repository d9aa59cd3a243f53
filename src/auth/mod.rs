//! Authentication for the MCP endpoint
//!
//! Every request passes through the [`RequestGate`]. Bootstrap operations
//! (`login`, `logout`, `verify-login`) skip bearer validation when auth tools
//! are enabled; everything else must present a bearer token accepted by the
//! [`BearerValidationMiddleware`]. Tokens are obtained with the device code
//! flow driven by the [`DeviceCodeAuthenticator`].

pub mod authenticator;
pub mod device_code;
pub mod gate;
pub mod middleware;
pub mod provider;
pub mod test_helpers;
pub mod token_cache;
pub mod tools;

pub use authenticator::{AuthResult, AuthState, DeviceCodeAuthenticator, PendingLogin};
pub use device_code::{
    DeviceAuthorizationResponse, DeviceCodeFlow, DeviceTokenResponse, TokenPollResult,
};
pub use gate::{BootstrapOperation, GateDecision, RequestGate};
pub use middleware::{BearerValidationMiddleware, ValidatedBearer};
pub use provider::{DeviceCodeChallenge, ExchangeHandle, IdentityProvider};
pub use token_cache::{AcquiredVia, Credential, TokenCache};
pub use tools::{register_auth_tools, LoginTool, LogoutTool, VerifyLoginTool};
