//! Bearer token validation for requests the gate did not let through

use crate::auth::provider::IdentityProvider;
use crate::auth::token_cache::TokenCache;
use crate::error::{GatewayError, Result};
use actix_web::http::header;
use actix_web::{HttpRequest, HttpResponse};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How a bearer token was accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatedBearer {
    /// Matched the credential obtained by this gateway
    Cached,
    /// Vouched for by the identity provider
    Introspected,
}

impl ValidatedBearer {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidatedBearer::Cached => "cached",
            ValidatedBearer::Introspected => "introspected",
        }
    }
}

/// Checks `Authorization: Bearer` against the token cache, then the provider
pub struct BearerValidationMiddleware {
    cache: Arc<TokenCache>,
    provider: Arc<dyn IdentityProvider>,
}

impl BearerValidationMiddleware {
    pub fn new(cache: Arc<TokenCache>, provider: Arc<dyn IdentityProvider>) -> Self {
        Self { cache, provider }
    }

    /// Pull the token out of `Authorization: Bearer <token>`
    pub fn extract_bearer_token(req: &HttpRequest) -> Result<String> {
        let auth_header = req
            .headers()
            .get(header::AUTHORIZATION)
            .ok_or_else(|| GatewayError::unauthorized("Missing Authorization header"))?
            .to_str()
            .map_err(|_| GatewayError::unauthorized("Invalid Authorization header encoding"))?;

        let (scheme, token) = auth_header.trim().split_once(' ').ok_or_else(|| {
            GatewayError::unauthorized("Invalid Authorization header format. Expected: Bearer <token>")
        })?;

        if !scheme.eq_ignore_ascii_case("bearer") {
            return Err(GatewayError::unauthorized(
                "Invalid Authorization header format. Expected: Bearer <token>",
            ));
        }

        let token = token.trim();
        if token.is_empty() {
            return Err(GatewayError::unauthorized("Empty bearer token"));
        }

        Ok(token.to_string())
    }

    /// Validate the request's bearer token. Never writes the cache.
    pub async fn validate(&self, req: &HttpRequest) -> Result<ValidatedBearer> {
        let token = Self::extract_bearer_token(req)?;

        let result = if self.cache.validate(&token) {
            Ok(ValidatedBearer::Cached)
        } else {
            match self.provider.introspect(&token).await {
                Ok(true) => Ok(ValidatedBearer::Introspected),
                Ok(false) => Err(GatewayError::unauthorized("Invalid or expired token")),
                Err(e) => {
                    warn!(provider = self.provider.name(), error = %e, "Token introspection failed");
                    Err(GatewayError::unauthorized("Token could not be validated"))
                }
            }
        };

        match &result {
            Ok(source) => debug!(
                path = req.path(),
                auth_source = source.as_str(),
                "Bearer token accepted"
            ),
            Err(e) => info!(
                path = req.path(),
                error = %e,
                "Bearer token rejected"
            ),
        }

        result
    }

    /// Validate and turn a failure straight into the 401 response
    pub async fn check(&self, req: &HttpRequest) -> std::result::Result<ValidatedBearer, HttpResponse> {
        self.validate(req)
            .await
            .map_err(|e| Self::create_auth_error_response(req, &e))
    }

    /// 401 with a JSON body and a `WWW-Authenticate` challenge
    pub fn create_auth_error_response(req: &HttpRequest, error: &GatewayError) -> HttpResponse {
        let code = if req.headers().contains_key(header::AUTHORIZATION) {
            "AUTHENTICATION_FAILED"
        } else {
            "AUTHENTICATION_REQUIRED"
        };

        HttpResponse::Unauthorized()
            .insert_header((header::WWW_AUTHENTICATE, "Bearer"))
            .content_type("application/json")
            .json(json!({
                "error": {
                    "code": code,
                    "message": error.to_string(),
                    "type": "authentication_error"
                }
            }))
    }
}
