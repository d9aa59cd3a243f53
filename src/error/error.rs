//! Error types and handling for the authentication gateway

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Main error type for the gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Missing, malformed or rejected bearer credential
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// Device-code exchange timed out, was denied or failed at the provider
    #[error("Authentication exchange failed: {message}")]
    AuthExchangeFailed { message: String },

    /// A device-code exchange is already pending
    #[error("Login already in progress")]
    AlreadyInProgress,

    /// Body could not be parsed as a JSON-RPC envelope
    #[error("Malformed request: {message}")]
    MalformedRequest { message: String },

    /// Provider-side authentication errors (introspection, user info)
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client errors
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Generic errors
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an unauthorized error
    pub fn unauthorized<S: Into<String>>(message: S) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Create a device-code exchange failure
    pub fn exchange_failed<S: Into<String>>(message: S) -> Self {
        Self::AuthExchangeFailed {
            message: message.into(),
        }
    }

    /// Create a malformed request error
    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self::MalformedRequest {
            message: message.into(),
        }
    }

    /// Create an authentication error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Http(_) | GatewayError::Io(_))
    }

    /// Whether the error should be answered with HTTP 401
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, GatewayError::Unauthorized { .. })
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            GatewayError::Config { .. } => "config",
            GatewayError::Unauthorized { .. } => "unauthorized",
            GatewayError::AuthExchangeFailed { .. } => "auth_exchange",
            GatewayError::AlreadyInProgress => "already_in_progress",
            GatewayError::MalformedRequest { .. } => "malformed_request",
            GatewayError::Auth { .. } => "auth",
            GatewayError::Io(_) => "io",
            GatewayError::Serde(_) => "serialization",
            GatewayError::Yaml(_) => "yaml",
            GatewayError::Http(_) => "http",
            GatewayError::Internal(_) => "internal",
        }
    }
}

impl Clone for GatewayError {
    fn clone(&self) -> Self {
        match self {
            GatewayError::Config { message } => GatewayError::Config { message: message.clone() },
            GatewayError::Unauthorized { message } => GatewayError::Unauthorized { message: message.clone() },
            GatewayError::AuthExchangeFailed { message } => GatewayError::AuthExchangeFailed { message: message.clone() },
            GatewayError::AlreadyInProgress => GatewayError::AlreadyInProgress,
            GatewayError::MalformedRequest { message } => GatewayError::MalformedRequest { message: message.clone() },
            GatewayError::Auth { message } => GatewayError::Auth { message: message.clone() },

            // Source errors are not Clone; keep their rendered message
            GatewayError::Io(e) => GatewayError::Internal(anyhow::anyhow!("IO error: {}", e)),
            GatewayError::Serde(e) => GatewayError::Internal(anyhow::anyhow!("Serialization error: {}", e)),
            GatewayError::Yaml(e) => GatewayError::Internal(anyhow::anyhow!("YAML error: {}", e)),
            GatewayError::Http(e) => GatewayError::Internal(anyhow::anyhow!("HTTP client error: {}", e)),
            GatewayError::Internal(e) => GatewayError::Internal(anyhow::anyhow!("{}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructor_helpers() {
        let err = GatewayError::unauthorized("Missing Authorization header");
        assert!(err.is_unauthorized());
        assert_eq!(err.category(), "unauthorized");
        assert_eq!(err.to_string(), "Unauthorized: Missing Authorization header");

        let err = GatewayError::exchange_failed("device code expired");
        assert_eq!(err.category(), "auth_exchange");
        assert!(!err.is_unauthorized());
    }

    #[test]
    fn test_clone_preserves_message() {
        let err = GatewayError::malformed("expected object");
        let cloned = err.clone();
        assert_eq!(err.to_string(), cloned.to_string());

        let io = GatewayError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert!(io.clone().to_string().contains("disk"));
    }
}
