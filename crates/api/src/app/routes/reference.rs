//! CRUD for reference collections (units, item groups, items, sites, users,
//! machines). One generic router, instantiated per record type.

use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};

use fleetops_auth::Principal;
use fleetops_catalog::Reference;
use fleetops_core::Entity;
use fleetops_infra::{InMemoryStore, KeyValueStore};
use fleetops_listing::paginate;

use crate::app::dto::ListParams;
use crate::app::errors;
use crate::app::services::{AppServices, ReferenceStore};
use crate::authz;

pub fn router<R>() -> Router
where
    R: Reference,
    R::Id: FromStr + Display + Send + Sync + 'static,
    AppServices: ReferenceStore<R>,
{
    Router::new()
        .route("/", get(list::<R>).post(create::<R>))
        .route("/:id", get(fetch::<R>).put(update::<R>).delete(remove::<R>))
}

fn store<R>(services: &AppServices) -> &InMemoryStore<R::Id, R>
where
    R: Reference,
    AppServices: ReferenceStore<R>,
{
    <AppServices as ReferenceStore<R>>::references(services)
}

pub async fn list<R>(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<ListParams>,
) -> Response
where
    R: Reference,
    R::Id: FromStr + Display + Send + Sync + 'static,
    AppServices: ReferenceStore<R>,
{
    if let Err(resp) = authz::require(&principal, "catalog.read") {
        return resp;
    }
    let query = params.query_with(&[("site", &params.site)]);
    let page = paginate(store::<R>(&services).list(), &query);
    (StatusCode::OK, Json(page)).into_response()
}

pub async fn create<R>(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Json(record): Json<R>,
) -> Response
where
    R: Reference,
    R::Id: FromStr + Display + Send + Sync + 'static,
    AppServices: ReferenceStore<R>,
{
    if let Err(resp) = authz::require(&principal, "catalog.write") {
        return resp;
    }
    if let Err(e) = record.validate() {
        return errors::domain_error_to_response(e);
    }

    let id = record.id().clone();
    if let Err(e) = store::<R>(&services).insert_unique(id.clone(), record.clone(), &|_, _| false) {
        return errors::json_error(StatusCode::CONFLICT, "conflict", e.to_string());
    }

    tracing::info!(collection = R::COLLECTION, %id, label = record.label(), "reference record created");
    (StatusCode::CREATED, Json(record)).into_response()
}

pub async fn fetch<R>(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Response
where
    R: Reference,
    R::Id: FromStr + Display + Send + Sync + 'static,
    AppServices: ReferenceStore<R>,
{
    if let Err(resp) = authz::require(&principal, "catalog.read") {
        return resp;
    }
    let id: R::Id = match errors::parse_id(&id, R::COLLECTION) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match store::<R>(&services).get(&id) {
        Some(record) => (StatusCode::OK, Json(record)).into_response(),
        None => errors::not_found(R::COLLECTION),
    }
}

/// Replace a record; the id in the path wins over any id in the body.
pub async fn update<R>(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(mut record): Json<R>,
) -> Response
where
    R: Reference,
    R::Id: FromStr + Display + Send + Sync + 'static,
    AppServices: ReferenceStore<R>,
{
    if let Err(resp) = authz::require(&principal, "catalog.write") {
        return resp;
    }
    let id: R::Id = match errors::parse_id(&id, R::COLLECTION) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    if store::<R>(&services).get(&id).is_none() {
        return errors::not_found(R::COLLECTION);
    }

    record.set_id(id.clone());
    if let Err(e) = record.validate() {
        return errors::domain_error_to_response(e);
    }
    store::<R>(&services).upsert(id.clone(), record.clone());

    tracing::info!(collection = R::COLLECTION, %id, "reference record updated");
    (StatusCode::OK, Json(record)).into_response()
}

pub async fn remove<R>(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Response
where
    R: Reference,
    R::Id: FromStr + Display + Send + Sync + 'static,
    AppServices: ReferenceStore<R>,
{
    if let Err(resp) = authz::require(&principal, "catalog.write") {
        return resp;
    }
    let id: R::Id = match errors::parse_id(&id, R::COLLECTION) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match store::<R>(&services).remove(&id) {
        Some(_) => {
            tracing::info!(collection = R::COLLECTION, %id, "reference record removed");
            StatusCode::NO_CONTENT.into_response()
        }
        None => errors::not_found(R::COLLECTION),
    }
}
