use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use fleetops_auth::Principal;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(principal): Extension<Principal>) -> impl IntoResponse {
    Json(serde_json::json!({
        "user_id": principal.user_id.to_string(),
        "name": principal.name,
        "site_id": principal.site_id.map(|s| s.to_string()),
        "roles": principal.roles.iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        "admin": principal.is_admin(),
    }))
}
