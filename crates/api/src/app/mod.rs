//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: stores, dispatcher and cross-store orchestration
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use crate::config::ApiConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(config: &ApiConfig) -> Router {
    let jwt = Arc::new(fleetops_auth::Hs256JwtValidator::new(
        config.jwt_secret.as_bytes(),
    ));
    let auth_state = middleware::AuthState { jwt };

    let services = services::AppServices::new();
    if config.seed_demo {
        services.seed_demo();
    }

    // Protected routes: require a valid bearer token.
    let protected = routes::router()
        .layer(Extension(Arc::new(services)))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new())
}
