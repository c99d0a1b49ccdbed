use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;

use fleetops_auth::Principal;
use fleetops_listing::paginate;
use fleetops_machines::{LogbookEntry, LogbookEntryId, NewLogbookEntry};

use crate::app::dto::ListParams;
use crate::app::errors;
use crate::app::services::AppServices;
use crate::authz;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_entries).post(record_entry))
        .route("/:id", get(get_entry))
}

pub async fn list_entries(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<ListParams>,
) -> Response {
    if let Err(resp) = authz::require(&principal, "logbook.read") {
        return resp;
    }

    let query = params.query_with(&[("machine", &params.machine), ("site", &params.site)]);
    let scope = authz::visible_site(&principal);
    let rows = services
        .logbook()
        .into_iter()
        .filter(|e| scope.is_none_or(|s| e.site_id == s));

    (StatusCode::OK, Json(paginate(rows, &query))).into_response()
}

pub async fn get_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Response {
    if let Err(resp) = authz::require(&principal, "logbook.read") {
        return resp;
    }
    let id: LogbookEntryId = match errors::parse_id(&id, "logbook entry") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.logbook_entry(id) {
        Some(entry) if authz::visible_site(&principal).is_none_or(|s| entry.site_id == s) => {
            (StatusCode::OK, Json(entry)).into_response()
        }
        _ => errors::not_found("logbook entry"),
    }
}

/// Accept one machine-day. Calculator errors come back as a 422 field map.
pub async fn record_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<NewLogbookEntry>,
) -> Response {
    if let Err(resp) = authz::require(&principal, "logbook.write") {
        return resp;
    }
    if let Err(resp) = authz::require_site(&principal, body.site_id) {
        return resp;
    }
    if services.machine(body.machine_id).is_none() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            format!("unknown machine {}", body.machine_id),
        );
    }
    if services.site(body.site_id).is_none() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            format!("unknown site {}", body.site_id),
        );
    }

    let entry = match LogbookEntry::submit(
        LogbookEntryId::generate(),
        body,
        principal.user_id,
        Utc::now(),
    ) {
        Ok(entry) => entry,
        Err(fields) => {
            tracing::debug!(fields = fields.len(), "logbook entry rejected");
            return errors::field_errors_to_response(&fields);
        }
    };

    match services.record_logbook(entry) {
        Ok(entry) => (StatusCode::CREATED, Json(entry)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}
