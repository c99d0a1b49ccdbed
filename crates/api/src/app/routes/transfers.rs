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
use fleetops_machines::{MachineTransfer, RequestTransfer, TransferDecision, TransferId};

use crate::app::dto::ListParams;
use crate::app::errors::{self, json_error};
use crate::app::services::{AppServices, TransferStep};
use crate::authz;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_transfers).post(request_transfer))
        .route("/:id", get(get_transfer))
        .route("/:id/:step", post(advance_transfer))
}

fn involves(transfer: &MachineTransfer, principal: &Principal) -> bool {
    authz::visible_site(principal)
        .is_none_or(|s| transfer.from_site() == Some(s) || transfer.to_site() == Some(s))
}

pub async fn list_transfers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<ListParams>,
) -> Response {
    if let Err(resp) = authz::require(&principal, "transfers.read") {
        return resp;
    }

    let query = params.query_with(&[("status", &params.status), ("machine", &params.machine)]);
    let rows = services
        .transfers()
        .into_iter()
        .filter(|t| involves(t, &principal));

    (StatusCode::OK, Json(paginate(rows, &query))).into_response()
}

pub async fn get_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Response {
    if let Err(resp) = authz::require(&principal, "transfers.read") {
        return resp;
    }
    let id: TransferId = match errors::parse_id(&id, "transfer") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.transfer(id) {
        Some(transfer) if involves(&transfer, &principal) => {
            (StatusCode::OK, Json(transfer)).into_response()
        }
        _ => errors::not_found("transfer"),
    }
}

pub async fn request_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<RequestTransfer>,
) -> Response {
    if let Err(resp) = authz::require(&principal, "transfers.create") {
        return resp;
    }
    if let Err(resp) = authz::require_site(&principal, body.from_site) {
        return resp;
    }

    match services.request_transfer(body, authz::actor(&principal), Utc::now()) {
        Ok(transfer) => (StatusCode::CREATED, Json(transfer)).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn advance_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path((id, step)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let Some(step) = TransferStep::from_path(&step) else {
        return json_error(
            StatusCode::NOT_FOUND,
            "unknown_action",
            format!("unknown transfer step '{step}'"),
        );
    };
    let permission = match step {
        TransferStep::Approve | TransferStep::Reject => "transfers.approve",
        TransferStep::Complete => "transfers.complete",
    };
    if let Err(resp) = authz::require(&principal, permission) {
        return resp;
    }
    let id: TransferId = match errors::parse_id(&id, "transfer") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let decision: TransferDecision = if body.iter().all(u8::is_ascii_whitespace) {
        TransferDecision::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(decision) => decision,
            Err(e) => return json_error(StatusCode::BAD_REQUEST, "invalid_json", e.to_string()),
        }
    };

    match services.advance_transfer(id, step, decision, authz::actor(&principal), Utc::now()) {
        Ok(transfer) => (StatusCode::OK, Json(transfer)).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
