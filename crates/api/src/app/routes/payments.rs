use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;

use fleetops_auth::Principal;
use fleetops_listing::paginate;
use fleetops_purchasing::{NewPaymentSlip, PaymentId, PaymentSlip};

use crate::app::dto::ListParams;
use crate::app::errors;
use crate::app::services::AppServices;
use crate::authz;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_payments).post(record_payment))
        .route("/:id", get(get_payment))
        .route("/:id/download", get(download_payment))
}

fn load(services: &AppServices, raw_id: &str) -> Result<PaymentSlip, Response> {
    let id: PaymentId = errors::parse_id(raw_id, "payment")?;
    services
        .payment(id)
        .ok_or_else(|| errors::not_found("payment"))
}

pub async fn list_payments(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<ListParams>,
) -> Response {
    if let Err(resp) = authz::require(&principal, "payments.read") {
        return resp;
    }

    let query = params.query_with(&[
        ("method", &params.method),
        ("procurement", &params.procurement),
    ]);
    (StatusCode::OK, Json(paginate(services.payments(), &query))).into_response()
}

pub async fn record_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<NewPaymentSlip>,
) -> Response {
    if let Err(resp) = authz::require(&principal, "payments.write") {
        return resp;
    }

    match services.record_payment(body, &authz::actor(&principal), Utc::now()) {
        Ok(slip) => (StatusCode::CREATED, Json(slip)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn get_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Response {
    if let Err(resp) = authz::require(&principal, "payments.read") {
        return resp;
    }
    match load(&services, &id) {
        Ok(slip) => (StatusCode::OK, Json(slip)).into_response(),
        Err(resp) => resp,
    }
}

/// The slip as a plain-text attachment.
pub async fn download_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Response {
    if let Err(resp) = authz::require(&principal, "payments.read") {
        return resp;
    }
    let slip = match load(&services, &id) {
        Ok(slip) => slip,
        Err(resp) => return resp,
    };
    let Some(procurement) = services.procurement(slip.procurement_id) else {
        tracing::error!(payment_id = %slip.id, "payment refers to a missing procurement");
        return errors::not_found("procurement");
    };

    let disposition = format!("attachment; filename=\"{}\"", slip.file_name());
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        slip.render_text(&procurement),
    )
        .into_response()
}
