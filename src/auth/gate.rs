//! Decides per request whether the bearer check can be skipped
//!
//! Only `tools/call` envelopes naming one of the bootstrap operations are let
//! through, and only while auth tools are enabled. Anything the gate cannot
//! read is sent to the bearer check.

use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Operations a client must be able to call before it has a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootstrapOperation {
    Login,
    Logout,
    VerifyLogin,
}

impl BootstrapOperation {
    pub const ALL: [BootstrapOperation; 3] = [
        BootstrapOperation::Login,
        BootstrapOperation::Logout,
        BootstrapOperation::VerifyLogin,
    ];

    /// Wire name used in `tools/call`
    pub fn as_str(&self) -> &'static str {
        match self {
            BootstrapOperation::Login => "login",
            BootstrapOperation::Logout => "logout",
            BootstrapOperation::VerifyLogin => "verify-login",
        }
    }
}

impl fmt::Display for BootstrapOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BootstrapOperation {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.iter().copied().find(|op| op.as_str() == s).ok_or(())
    }
}

/// The only parts of a JSON-RPC envelope the gate reads
#[derive(Debug, Deserialize)]
struct GateEnvelope {
    method: Option<String>,
    params: Option<GateParams>,
}

#[derive(Debug, Deserialize)]
struct GateParams {
    name: Option<String>,
}

/// Result of gating one request
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GateDecision {
    /// Skip the bearer check
    pub bypass: bool,
    /// Operation named by a `tools/call`, if one could be read
    pub operation: Option<String>,
}

/// Bypass policy for bootstrap operations
#[derive(Debug, Clone, Copy)]
pub struct RequestGate {
    enable_auth_tools: bool,
}

impl RequestGate {
    pub fn new(enable_auth_tools: bool) -> Self {
        Self { enable_auth_tools }
    }

    pub fn auth_tools_enabled(&self) -> bool {
        self.enable_auth_tools
    }

    /// Gate a raw request body. Never fails; unreadable bodies do not bypass.
    pub fn decide(&self, raw_body: &[u8]) -> GateDecision {
        // Non-object bodies (batches, scalars) fail here and do not bypass
        let envelope = match serde_json::from_slice::<GateEnvelope>(raw_body) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(error = %e, bypass = false, "Request body is not a readable JSON-RPC envelope");
                return GateDecision::default();
            }
        };
        self.decide_envelope(envelope)
    }

    /// Gate an already parsed body
    pub fn decide_value(&self, body: &Value) -> GateDecision {
        match GateEnvelope::deserialize(body) {
            Ok(envelope) => self.decide_envelope(envelope),
            Err(_) => GateDecision::default(),
        }
    }

    fn decide_envelope(&self, envelope: GateEnvelope) -> GateDecision {
        if envelope.method.as_deref() != Some("tools/call") {
            return GateDecision::default();
        }

        let operation = envelope.params.and_then(|p| p.name);
        let bootstrap = operation
            .as_deref()
            .and_then(|name| name.parse::<BootstrapOperation>().ok());
        let bypass = self.enable_auth_tools && bootstrap.is_some();

        debug!(
            operation = operation.as_deref().unwrap_or(""),
            bypass,
            auth_tools_enabled = self.enable_auth_tools,
            "Gated tools/call request"
        );

        GateDecision { bypass, operation }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {"name": name, "arguments": {}}
        }))
        .unwrap()
    }

    #[test]
    fn test_bootstrap_operations_bypass_when_enabled() {
        let gate = RequestGate::new(true);
        for op in BootstrapOperation::ALL {
            let decision = gate.decide(&call(op.as_str()));
            assert!(decision.bypass, "{} should bypass", op);
            assert_eq!(decision.operation.as_deref(), Some(op.as_str()));
        }
    }

    #[test]
    fn test_disabled_gate_never_bypasses() {
        let gate = RequestGate::new(false);
        for name in ["login", "logout", "verify-login", "some-other-tool"] {
            assert!(!gate.decide(&call(name)).bypass, "{} must not bypass", name);
        }
    }

    #[test]
    fn test_other_tools_do_not_bypass() {
        let gate = RequestGate::new(true);
        for name in ["some-other-tool", "Login", "verify_login", "login ", ""] {
            let decision = gate.decide(&call(name));
            assert!(!decision.bypass, "{:?} must not bypass", name);
        }
    }

    #[test]
    fn test_malformed_bodies_fail_closed() {
        let gate = RequestGate::new(true);
        let bodies: Vec<&[u8]> = vec![
            b"",
            b"not json",
            b"{\"method\":\"tools/call\",\"params\":{\"name\":\"login\"}",
            b"[{\"method\":\"tools/call\",\"params\":{\"name\":\"login\"}}]",
            b"\"login\"",
            b"null",
            b"{\"method\":\"tools/call\"}",
            b"{\"method\":\"tools/call\",\"params\":{}}",
            b"{\"method\":\"tools/call\",\"params\":{\"name\":42}}",
            b"{\"method\":\"tools/call\",\"params\":\"login\"}",
            b"{\"method\":7,\"params\":{\"name\":\"login\"}}",
            b"{\"params\":{\"name\":\"login\"}}",
            &[0xff, 0xfe, 0x00],
        ];
        for body in bodies {
            assert!(!gate.decide(body).bypass, "body {:?} must not bypass", String::from_utf8_lossy(body));
        }
    }

    #[test]
    fn test_other_methods_ignore_params_name() {
        let gate = RequestGate::new(true);
        for method in ["tools/list", "initialize", "resources/read"] {
            let body = serde_json::to_vec(&json!({
                "jsonrpc": "2.0", "id": 1, "method": method, "params": {"name": "login"}
            }))
            .unwrap();
            let decision = gate.decide(&body);
            assert!(!decision.bypass);
            assert!(decision.operation.is_none());
        }
    }

    #[test]
    fn test_decide_value_matches_decide() {
        let gate = RequestGate::new(true);
        let value = json!({"jsonrpc": "2.0", "id": "a", "method": "tools/call", "params": {"name": "logout"}});
        assert!(gate.decide_value(&value).bypass);
        assert!(!gate.decide_value(&json!([1, 2])).bypass);
    }

    #[test]
    fn test_bootstrap_operation_parsing() {
        assert_eq!("verify-login".parse::<BootstrapOperation>(), Ok(BootstrapOperation::VerifyLogin));
        assert!("verify".parse::<BootstrapOperation>().is_err());
    }
}
