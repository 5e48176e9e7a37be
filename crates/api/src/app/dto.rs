use std::sync::Arc;

use serde::{Deserialize, Serialize};

use dbadmin_auth::{KeySpace, ModelAccess};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    /// Slash-delimited flag names, e.g. `"api/gui"` or `"none"`.
    pub role: String,
}

/// Either the array form or the display form; `access` wins if both are set.
#[derive(Debug, Default, Deserialize)]
pub struct SetAccessRequest {
    #[serde(default)]
    pub access: Option<Vec<String>>,
    #[serde(default)]
    pub display: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetPasswordRequest {
    /// `null` clears the password.
    #[serde(default)]
    pub password: Option<String>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub username: String,
    pub token: String,
    /// Ready-to-use `Authorization` value.
    pub bearer: String,
}

impl TokenResponse {
    pub fn new(username: &str, token: String) -> Self {
        Self {
            bearer: format!("Bearer {username}:{token}"),
            username: username.to_string(),
            token,
        }
    }
}

// -------------------------
// Mapping helpers
// -------------------------

pub fn parse_access(
    resources: &Arc<KeySpace>,
    body: SetAccessRequest,
) -> Result<ModelAccess, axum::response::Response> {
    match (body.access, body.display) {
        (Some(tokens), _) => Ok(ModelAccess::from_array(Arc::clone(resources), tokens)),
        (None, Some(display)) => ModelAccess::parse_display(Arc::clone(resources), &display)
            .map_err(errors::capability_error_to_response),
        (None, None) => Err(errors::json_error(
            axum::http::StatusCode::BAD_REQUEST,
            "validation_error",
            "either 'access' or 'display' is required",
        )),
    }
}
