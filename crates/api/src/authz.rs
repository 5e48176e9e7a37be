//! API-side authorization guard.
//!
//! Enforced at the route boundary, after bearer authentication, so the
//! services stay policy-agnostic.

use axum::{http::StatusCode, middleware::Next, response::Response};

use dbadmin_auth::Role;

use crate::app::errors::json_error;
use crate::context::PrincipalContext;

/// Principal holds every flag of `required`.
pub fn has_role(principal: &PrincipalContext, required: Role) -> bool {
    principal.role().contains(required)
}

/// Middleware for `/admin/*`: the principal must carry the `admin` flag.
pub async fn require_admin(
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let Some(principal) = req.extensions().get::<PrincipalContext>() else {
        return Err(json_error(StatusCode::UNAUTHORIZED, "unauthorized", "not authenticated"));
    };

    if !has_role(principal, Role::ADMIN) {
        tracing::warn!(username = principal.username(), "non-admin attempted an admin route");
        return Err(json_error(StatusCode::FORBIDDEN, "forbidden", "admin role required"));
    }

    Ok(next.run(req).await)
}
