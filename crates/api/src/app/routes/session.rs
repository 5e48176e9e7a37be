use std::sync::Arc;

use axum::{Json, extract::Extension, response::IntoResponse};

use dbadmin_auth::{AuthFailure, Role};
use dbadmin_infra::Authentication;

use crate::app::dto::{LoginRequest, TokenResponse};
use crate::app::{errors, services::AppServices};

/// POST /login - interactive password login (requires the `gui` flag).
pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<LoginRequest>,
) -> axum::response::Response {
    match services
        .users
        .authenticate_password(&body.username, &body.password)
        .await
    {
        Ok(Authentication::Granted(user)) => Json(user.summary()).into_response(),
        Ok(Authentication::Denied(failure)) => errors::auth_failure_to_response(failure),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// POST /token - password login that mints a fresh bearer token for the caller.
///
/// The caller must also hold `api`, since the token is only good for bearer auth.
pub async fn token(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<LoginRequest>,
) -> axum::response::Response {
    let user = match services
        .users
        .authenticate_password(&body.username, &body.password)
        .await
    {
        Ok(Authentication::Granted(user)) => user,
        Ok(Authentication::Denied(failure)) => return errors::auth_failure_to_response(failure),
        Err(e) => return errors::service_error_to_response(e),
    };

    if !user.role.contains(Role::API) {
        return errors::auth_failure_to_response(AuthFailure::NoAccess);
    }

    match services.users.issue_token(&user.username).await {
        Ok(token) => Json(TokenResponse::new(&user.username, token)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
