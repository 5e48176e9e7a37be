use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::Response,
};

use dbadmin_infra::{Authentication, UserService};

use crate::app::errors::{self, json_error};
use crate::context::PrincipalContext;

#[derive(Clone)]
pub struct AuthState {
    pub users: UserService,
}

/// Bearer authentication: `Authorization: Bearer <username>:<token>`.
///
/// The token is checked through the lockout state machine like a password and
/// requires the `api` role flag. On success the request carries a
/// [`PrincipalContext`]; a configured `cors` origin on the user is echoed back
/// as `Access-Control-Allow-Origin`.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let (username, token) = extract_bearer(req.headers())?;

    let user = match state.users.authenticate_token(username, token).await {
        Ok(Authentication::Granted(user)) => user,
        Ok(Authentication::Denied(failure)) => return Err(errors::auth_failure_to_response(failure)),
        Err(e) => return Err(errors::service_error_to_response(e)),
    };

    let cors = user.cors.clone();
    req.extensions_mut().insert(PrincipalContext::new(user));

    let mut response = next.run(req).await;
    if let Some(origin) = cors.and_then(|o| HeaderValue::from_str(&o).ok()) {
        response
            .headers_mut()
            .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    }
    Ok(response)
}

fn extract_bearer(headers: &HeaderMap) -> Result<(&str, &str), Response> {
    let unauthorized = |message: &str| json_error(StatusCode::UNAUTHORIZED, "unauthorized", message);

    let header = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| unauthorized("missing bearer credentials"))?;

    let header = header
        .to_str()
        .map_err(|_| unauthorized("malformed authorization header"))?;

    let credentials = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| unauthorized("expected a bearer token"))?
        .trim();

    match credentials.split_once(':') {
        Some((username, token)) if !username.is_empty() && !token.is_empty() => Ok((username, token)),
        _ => Err(unauthorized("bearer token must be '<username>:<token>'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        map
    }

    #[test]
    fn splits_username_and_token() {
        let h = headers("Bearer alice:abc123");
        assert_eq!(extract_bearer(&h).unwrap(), ("alice", "abc123"));
    }

    #[test]
    fn rejects_malformed_credentials() {
        for value in ["alice:abc", "Bearer ", "Bearer alice", "Bearer :abc", "Bearer alice:"] {
            let err = extract_bearer(&headers(value)).unwrap_err();
            assert_eq!(err.status(), StatusCode::UNAUTHORIZED, "{value}");
        }
        assert!(extract_bearer(&HeaderMap::new()).is_err());
    }
}
