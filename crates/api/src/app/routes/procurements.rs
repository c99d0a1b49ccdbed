use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;

use fleetops_auth::Principal;
use fleetops_listing::paginate;
use fleetops_purchasing::ProcurementId;

use crate::app::dto::{ListParams, NewProcurement, NotesRequest};
use crate::app::errors::{self, json_error};
use crate::app::services::{AppServices, ProcurementStep};
use crate::authz;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_procurements).post(create_procurement))
        .route("/:id", get(get_procurement))
        .route("/:id/:step", post(advance_procurement))
}

pub async fn list_procurements(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<ListParams>,
) -> Response {
    if let Err(resp) = authz::require(&principal, "procurements.read") {
        return resp;
    }

    let query = params.query_with(&[("status", &params.status), ("site", &params.site)]);
    let scope = authz::visible_site(&principal);
    let rows = services
        .procurements()
        .into_iter()
        .filter(|p| scope.is_none_or(|s| p.site_id() == Some(s)));

    (StatusCode::OK, Json(paginate(rows, &query))).into_response()
}

pub async fn create_procurement(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<NewProcurement>,
) -> Response {
    if let Err(resp) = authz::require(&principal, "procurements.write") {
        return resp;
    }

    match services.create_procurement(body, authz::actor(&principal), Utc::now()) {
        Ok(procurement) => (StatusCode::CREATED, Json(procurement)).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn get_procurement(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Response {
    if let Err(resp) = authz::require(&principal, "procurements.read") {
        return resp;
    }
    let id: ProcurementId = match errors::parse_id(&id, "procurement") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let scope = authz::visible_site(&principal);
    match services.procurement(id) {
        Some(p) if scope.is_none_or(|s| p.site_id() == Some(s)) => {
            (StatusCode::OK, Json(p)).into_response()
        }
        _ => errors::not_found("procurement"),
    }
}

pub async fn advance_procurement(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path((id, step)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let Some(step) = ProcurementStep::from_path(&step) else {
        return json_error(
            StatusCode::NOT_FOUND,
            "unknown_action",
            format!("unknown procurement step '{step}'"),
        );
    };
    let permission = match step {
        ProcurementStep::Approve => "procurements.write",
        ProcurementStep::Receive => "procurements.receive",
    };
    if let Err(resp) = authz::require(&principal, permission) {
        return resp;
    }
    let id: ProcurementId = match errors::parse_id(&id, "procurement") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let Some(current) = services.procurement(id) else {
        return errors::not_found("procurement");
    };
    if step == ProcurementStep::Receive {
        if let Some(site) = current.site_id() {
            if let Err(resp) = authz::require_site(&principal, site) {
                return resp;
            }
        }
    }

    let body: NotesRequest = if body.iter().all(u8::is_ascii_whitespace) {
        NotesRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(body) => body,
            Err(e) => return json_error(StatusCode::BAD_REQUEST, "invalid_json", e.to_string()),
        }
    };

    match services.advance_procurement(id, step, body.notes, authz::actor(&principal), Utc::now()) {
        Ok(procurement) => (StatusCode::OK, Json(procurement)).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
