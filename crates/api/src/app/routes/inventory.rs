use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;

use fleetops_auth::Principal;
use fleetops_core::{ItemId, SiteId};
use fleetops_inventory::{AdjustmentSource, InventoryKey, InventoryRecord};
use fleetops_listing::paginate;

use crate::app::dto::{AdjustStockRequest, ListParams, PutStockRequest, StockRow};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::authz;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_stock))
        .route(
            "/:site_id/:item_id",
            get(get_stock).put(put_stock).delete(delete_stock),
        )
        .route("/:site_id/:item_id/adjust", post(adjust_stock))
}

fn row(services: &AppServices, record: &InventoryRecord) -> StockRow {
    let key = record.key();
    let site = services.site(key.site_id);
    let item = services.item(key.item_id);
    StockRow::new(
        record,
        site.as_ref().map(|s| s.name.as_str()),
        item.as_ref().map(|i| (i.name.as_str(), i.code.as_str())),
    )
}

fn parse_key(site_id: &str, item_id: &str) -> Result<InventoryKey, Response> {
    let site_id: SiteId = errors::parse_id(site_id, "site")?;
    let item_id: ItemId = errors::parse_id(item_id, "item")?;
    Ok(InventoryKey::new(site_id, item_id))
}

pub async fn list_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<ListParams>,
) -> Response {
    if let Err(resp) = authz::require(&principal, "inventory.read") {
        return resp;
    }

    let query = params.query_with(&[("site", &params.site), ("status", &params.status)]);
    let rows: Vec<StockRow> = services
        .stock()
        .list()
        .iter()
        .map(|r| row(&services, r))
        .collect();

    (StatusCode::OK, Json(paginate(rows, &query))).into_response()
}

pub async fn get_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path((site_id, item_id)): Path<(String, String)>,
) -> Response {
    if let Err(resp) = authz::require(&principal, "inventory.read") {
        return resp;
    }
    let key = match parse_key(&site_id, &item_id) {
        Ok(k) => k,
        Err(resp) => return resp,
    };

    match services.stock().get(&key) {
        Some(record) => (StatusCode::OK, Json(row(&services, &record))).into_response(),
        None => errors::not_found("stock record"),
    }
}

/// Set the counted quantity and minimum level, opening the record if needed.
pub async fn put_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path((site_id, item_id)): Path<(String, String)>,
    Json(body): Json<PutStockRequest>,
) -> Response {
    if let Err(resp) = authz::require(&principal, "inventory.write") {
        return resp;
    }
    let key = match parse_key(&site_id, &item_id) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    if let Err(resp) = authz::require_site(&principal, key.site_id) {
        return resp;
    }
    if services.site(key.site_id).is_none() || services.item(key.item_id).is_none() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "unknown site or item",
        );
    }

    match services
        .stock()
        .put(key, body.quantity, body.minimum_level, Utc::now())
    {
        Ok(record) => (StatusCode::OK, Json(row(&services, &record))).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn adjust_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path((site_id, item_id)): Path<(String, String)>,
    Json(body): Json<AdjustStockRequest>,
) -> Response {
    if let Err(resp) = authz::require(&principal, "inventory.write") {
        return resp;
    }
    let key = match parse_key(&site_id, &item_id) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    if let Err(resp) = authz::require_site(&principal, key.site_id) {
        return resp;
    }

    match services
        .stock()
        .adjust(key, body.delta, AdjustmentSource::Manual, Utc::now())
    {
        Ok(record) => (StatusCode::OK, Json(row(&services, &record))).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn delete_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path((site_id, item_id)): Path<(String, String)>,
) -> Response {
    if let Err(resp) = authz::require(&principal, "inventory.write") {
        return resp;
    }
    let key = match parse_key(&site_id, &item_id) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    if let Err(resp) = authz::require_site(&principal, key.site_id) {
        return resp;
    }

    match services.stock().remove(&key) {
        Some(_) => {
            tracing::info!(%key, "stock record removed");
            StatusCode::NO_CONTENT.into_response()
        }
        None => errors::not_found("stock record"),
    }
}
