//! Admin routes for user management.
//!
//! Mounted behind bearer auth and `require_admin`. Role changes and deletes go
//! through the guarded store operations, so the last administrator can never
//! be demoted or removed (422 `invariant_violation`).

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};

use dbadmin_auth::{Role, UserSummary};
use dbadmin_infra::NewUser;

use crate::app::dto::{self, SetAccessRequest, SetPasswordRequest, SetRoleRequest, TokenResponse};
use crate::app::{errors, services::AppServices};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/:username", get(get_user).delete(delete_user))
        .route("/users/:username/role", put(set_role))
        .route("/users/:username/access", put(set_access))
        .route("/users/:username/password", put(set_password))
        .route("/users/:username/token", post(issue_token))
        .route("/users/:username/unlock", post(unlock_user))
}

type Services = Extension<Arc<AppServices>>;

fn summary_response(status: StatusCode, user: &dbadmin_auth::User) -> axum::response::Response {
    (status, Json(user.summary())).into_response()
}

async fn list_users(Extension(services): Services) -> axum::response::Response {
    match services.users.list().await {
        Ok(users) => Json(users.iter().map(|u| u.summary()).collect::<Vec<UserSummary>>()).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

async fn create_user(
    Extension(services): Services,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewUser>,
) -> axum::response::Response {
    tracing::info!(actor = %principal.username(), username = %body.username, "creating user");
    match services.users.create_user(body).await {
        Ok(user) => summary_response(StatusCode::CREATED, &user),
        Err(e) => errors::service_error_to_response(e),
    }
}

async fn get_user(Extension(services): Services, Path(username): Path<String>) -> axum::response::Response {
    match services.users.get(&username).await {
        Ok(user) => summary_response(StatusCode::OK, &user),
        Err(e) => errors::service_error_to_response(e),
    }
}

async fn delete_user(
    Extension(services): Services,
    Extension(principal): Extension<PrincipalContext>,
    Path(username): Path<String>,
) -> axum::response::Response {
    match services.users.delete(&username).await {
        Ok(_) => {
            tracing::info!(actor = %principal.username(), %username, "user deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

async fn set_role(
    Extension(services): Services,
    Path(username): Path<String>,
    Json(body): Json<SetRoleRequest>,
) -> axum::response::Response {
    let role = match body.role.parse::<Role>() {
        Ok(role) => role,
        Err(e) => return errors::capability_error_to_response(e),
    };
    match services.users.set_role(&username, role).await {
        Ok(user) => summary_response(StatusCode::OK, &user),
        Err(e) => errors::service_error_to_response(e),
    }
}

async fn set_access(
    Extension(services): Services,
    Path(username): Path<String>,
    Json(body): Json<SetAccessRequest>,
) -> axum::response::Response {
    let access = match dto::parse_access(services.users.resources(), body) {
        Ok(access) => access,
        Err(response) => return response,
    };
    match services.users.set_access(&username, access).await {
        Ok(user) => summary_response(StatusCode::OK, &user),
        Err(e) => errors::service_error_to_response(e),
    }
}

async fn set_password(
    Extension(services): Services,
    Path(username): Path<String>,
    Json(body): Json<SetPasswordRequest>,
) -> axum::response::Response {
    match services
        .users
        .set_password(&username, body.password.as_deref())
        .await
    {
        Ok(user) => summary_response(StatusCode::OK, &user),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// The plain token is only ever returned here; the store keeps its hash.
async fn issue_token(Extension(services): Services, Path(username): Path<String>) -> axum::response::Response {
    match services.users.issue_token(&username).await {
        Ok(token) => Json(TokenResponse::new(&username, token)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

async fn unlock_user(Extension(services): Services, Path(username): Path<String>) -> axum::response::Response {
    match services.users.unlock(&username).await {
        Ok(user) => summary_response(StatusCode::OK, &user),
        Err(e) => errors::service_error_to_response(e),
    }
}
