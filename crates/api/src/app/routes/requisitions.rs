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
use serde_json::Value as JsonValue;

use fleetops_auth::Principal;
use fleetops_core::SiteId;
use fleetops_listing::paginate;
use fleetops_requisitions::{Action, ActionKind, NewRequisition, Requisition, RequisitionId};

use crate::app::dto::ListParams;
use crate::app::errors::{self, json_error};
use crate::app::services::AppServices;
use crate::authz;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_requisitions).post(create_requisition))
        .route("/:id", get(get_requisition))
        .route("/:id/events", get(requisition_events))
        .route("/:id/:action", post(transition_requisition))
}

/// Load a requisition the principal is allowed to see; others look absent.
fn visible(
    services: &AppServices,
    principal: &Principal,
    raw_id: &str,
) -> Result<Requisition, Response> {
    let id: RequisitionId = errors::parse_id(raw_id, "requisition")?;
    let requisition = services
        .requisition(id)
        .ok_or_else(|| errors::not_found("requisition"))?;
    match authz::visible_site(principal) {
        Some(site) if !requisition.involves_site(site) => Err(errors::not_found("requisition")),
        _ => Ok(requisition),
    }
}

pub async fn list_requisitions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<ListParams>,
) -> Response {
    if let Err(resp) = authz::require(&principal, "requisitions.read") {
        return resp;
    }

    let site_filter = match params.site.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) if raw.eq_ignore_ascii_case(fleetops_listing::ALL) => None,
        Some(raw) => match errors::parse_id::<SiteId>(raw, "site") {
            Ok(site) => Some(site),
            Err(resp) => return resp,
        },
    };
    let priority = params
        .priority
        .as_deref()
        .map(|p| match p.trim() {
            alias if alias.eq_ignore_ascii_case("urgent") => "high".to_string(),
            other => other.to_lowercase(),
        });
    let query = params.query_with(&[("status", &params.status), ("priority", &priority)]);

    let scope = authz::visible_site(&principal);
    let rows = services.requisitions().into_iter().filter(|r| {
        scope.is_none_or(|s| r.involves_site(s)) && site_filter.is_none_or(|s| r.involves_site(s))
    });

    (StatusCode::OK, Json(paginate(rows, &query))).into_response()
}

pub async fn create_requisition(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<NewRequisition>,
) -> Response {
    if let Err(resp) = authz::require(&principal, "requisitions.create") {
        return resp;
    }
    if let Err(resp) = authz::require_site(&principal, body.requesting_site) {
        return resp;
    }

    match services.create_requisition(body, &authz::actor(&principal), Utc::now()) {
        Ok(requisition) => (StatusCode::CREATED, Json(requisition)).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn get_requisition(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Response {
    if let Err(resp) = authz::require(&principal, "requisitions.read") {
        return resp;
    }
    match visible(&services, &principal, &id) {
        Ok(requisition) => (StatusCode::OK, Json(requisition)).into_response(),
        Err(resp) => resp,
    }
}

/// Audit log of one requisition, oldest first.
pub async fn requisition_events(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Response {
    if let Err(resp) = authz::require(&principal, "requisitions.read") {
        return resp;
    }
    let requisition = match visible(&services, &principal, &id) {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    match services.requisition_events(requisition.id_typed()) {
        Ok(events) => (StatusCode::OK, Json(events)).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

/// Build the tagged action from the path segment and the (possibly empty)
/// JSON payload.
fn parse_action(kind: ActionKind, body: &[u8]) -> Result<Action, Response> {
    let mut payload: JsonValue = if body.iter().all(u8::is_ascii_whitespace) {
        JsonValue::Object(Default::default())
    } else {
        serde_json::from_slice(body).map_err(|e| {
            json_error(StatusCode::BAD_REQUEST, "invalid_json", e.to_string())
        })?
    };

    let object = payload.as_object_mut().ok_or_else(|| {
        json_error(
            StatusCode::BAD_REQUEST,
            "invalid_json",
            "action payload must be a JSON object",
        )
    })?;
    match object.get("action").and_then(JsonValue::as_str) {
        None => {
            object.insert("action".to_string(), JsonValue::from(kind.as_str()));
        }
        Some(tag) if tag == kind.as_str() => {}
        Some(tag) => {
            return Err(json_error(
                StatusCode::BAD_REQUEST,
                "validation_error",
                format!("payload action '{tag}' does not match '{kind}'"),
            ));
        }
    }

    serde_json::from_value(payload)
        .map_err(|e| json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()))
}

pub async fn transition_requisition(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path((id, action)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let Some(kind) = ActionKind::from_path(&action) else {
        return json_error(
            StatusCode::NOT_FOUND,
            "unknown_action",
            format!("unknown requisition action '{action}'"),
        );
    };
    if let Err(resp) = authz::require(&principal, "requisitions.transition") {
        return resp;
    }
    let id = match visible(&services, &principal, &id) {
        Ok(requisition) => requisition.id_typed(),
        Err(resp) => return resp,
    };
    let action = match parse_action(kind, &body) {
        Ok(action) => action,
        Err(resp) => return resp,
    };

    match services.transition_requisition(id, action, authz::actor(&principal), Utc::now()) {
        Ok(requisition) => (StatusCode::OK, Json(requisition)).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
