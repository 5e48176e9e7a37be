//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store selection and service construction
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request/response DTOs and mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{
    Extension, Router,
    routing::{get, post},
};
use tower::ServiceBuilder;

use crate::{authz, middleware};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppServices, StartupError, build_services};

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: AppServices) -> Router {
    let auth_state = middleware::AuthState {
        users: services.users.clone(),
    };
    let services = Arc::new(services);

    let admin = routes::admin::router().layer(axum::middleware::from_fn(authz::require_admin));

    // Protected routes: bearer auth runs first, then the handlers see the services.
    let protected = Router::new()
        .route("/me", get(routes::system::me))
        .nest("/admin", admin)
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    auth_state,
                    middleware::auth_middleware,
                ))
                .layer(Extension(Arc::clone(&services))),
        );

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/login", post(routes::session::login))
        .route("/token", post(routes::session::token))
        .layer(Extension(services))
        .merge(protected)
}
