use axum::{Json, extract::Extension, http::StatusCode};

use dbadmin_auth::UserSummary;

use crate::context::PrincipalContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /me - the bearer-authenticated user.
pub async fn me(Extension(principal): Extension<PrincipalContext>) -> Json<UserSummary> {
    Json(principal.user().summary())
}
