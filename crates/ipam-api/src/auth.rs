//! Wires the external `AuthContext` (§6) onto the HTTP transport: tenant
//! resolution and bearer-token parsing are out of scope for this engine
//! (§1), so this extractor does the minimum a front door needs to hand the
//! engine a populated `AuthContext` — it is not a substitute for the real
//! authentication/authorization layer the spec assumes sits in front of us.
//!
//! - `x-tenant-id`: required, becomes `tenant_id`.
//! - `x-is-admin`: optional, `true`/`false` (default `false`), becomes
//!   `is_admin`.
//! - `authorization: Bearer <jwt>`: optional, decoded the same unverified
//!   way `ipam_engine::auth::AuthContext::from_bearer` does to populate
//!   `user_name`; absent entirely defaults to `"unknown"`.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use ipam_engine::auth::AuthContext;

pub struct Auth(pub AuthContext);

impl<S> FromRequestParts<S> for Auth
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tenant_id = parts
            .headers
            .get("x-tenant-id")
            .and_then(|v| v.to_str().ok())
            .ok_or((StatusCode::BAD_REQUEST, "Missing x-tenant-id header."))?
            .to_string();

        let is_admin = parts
            .headers
            .get("x-is-admin")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let bearer = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        let ctx = match bearer {
            Some(token) => AuthContext::from_bearer(tenant_id, is_admin, token),
            None => AuthContext::new(tenant_id, is_admin, "unknown"),
        };

        Ok(Auth(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(req: Request<()>) -> Result<Auth, (StatusCode, &'static str)> {
        let (mut parts, _) = req.into_parts();
        Auth::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn missing_tenant_header_is_bad_request() {
        let req = Request::builder().body(()).unwrap();
        let err = extract(req).await.unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn tenant_and_admin_headers_populate_context() {
        let req = Request::builder()
            .header("x-tenant-id", "acme")
            .header("x-is-admin", "true")
            .body(())
            .unwrap();
        let Auth(ctx) = extract(req).await.unwrap();
        assert_eq!(ctx.tenant_id, "acme");
        assert!(ctx.is_admin);
        assert_eq!(ctx.user_name, "unknown");
    }
}
