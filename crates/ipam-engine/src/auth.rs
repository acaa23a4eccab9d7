//! Request-scoped identity (§6's "Auth context (consumed)").
//!
//! Authentication itself — bearer-token validation, tenant resolution — is
//! out of scope (§1); this only extracts the `user_name` the source reads
//! out of an already-authenticated bearer token, the same unverified way:
//! `jwt.decode(user_assertion, options={"verify_signature": False})`, then
//! `preferred_username`, falling back to `spn:{oid}`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;

/// Who is making the request, and whether they hold the admin scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub tenant_id: String,
    pub is_admin: bool,
    pub user_name: String,
}

impl AuthContext {
    pub fn new(tenant_id: impl Into<String>, is_admin: bool, user_name: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            is_admin,
            user_name: user_name.into(),
        }
    }

    /// Build a context from a tenant, an admin flag, and a raw bearer token,
    /// decoding `user_name` from the token's claims without verifying its
    /// signature — signature verification is the job of whatever external
    /// component hands this engine the token in the first place.
    pub fn from_bearer(tenant_id: impl Into<String>, is_admin: bool, user_assertion: &str) -> Self {
        let user_name = decode_user_name(user_assertion).unwrap_or_else(|| "unknown".to_string());
        Self::new(tenant_id, is_admin, user_name)
    }
}

#[derive(Deserialize)]
struct Claims {
    #[serde(default)]
    preferred_username: Option<String>,
    #[serde(default)]
    oid: Option<String>,
}

/// Decode the middle (payload) segment of a `header.payload.signature` JWT
/// and pull out `preferred_username`, falling back to `spn:{oid}`. Returns
/// `None` if the token isn't shaped like a JWT or carries neither claim.
fn decode_user_name(token: &str) -> Option<String> {
    let payload_b64 = token.split('.').nth(1)?;
    let payload = URL_SAFE_NO_PAD.decode(payload_b64).ok()?;
    let claims: Claims = serde_json::from_slice(&payload).ok()?;

    if let Some(name) = claims.preferred_username {
        return Some(name);
    }
    claims.oid.map(|oid| format!("spn:{oid}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt_with_payload(payload_json: &str) -> String {
        let payload = URL_SAFE_NO_PAD.encode(payload_json.as_bytes());
        format!("header.{payload}.sig")
    }

    #[test]
    fn prefers_preferred_username() {
        let token = jwt_with_payload(r#"{"preferred_username":"alice@corp.com","oid":"abc-123"}"#);
        assert_eq!(decode_user_name(&token), Some("alice@corp.com".to_string()));
    }

    #[test]
    fn falls_back_to_spn_oid() {
        let token = jwt_with_payload(r#"{"oid":"abc-123"}"#);
        assert_eq!(decode_user_name(&token), Some("spn:abc-123".to_string()));
    }

    #[test]
    fn malformed_token_yields_none() {
        assert_eq!(decode_user_name("not-a-jwt"), None);
    }

    #[test]
    fn from_bearer_defaults_to_unknown_on_garbage() {
        let ctx = AuthContext::from_bearer("tenant-a", false, "garbage");
        assert_eq!(ctx.user_name, "unknown");
    }
}
