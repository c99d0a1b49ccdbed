use axum::{Router, routing::get};

use fleetops_catalog::{Item, ItemGroup, Machine, Site, Unit, User};

pub mod inventory;
pub mod logbook;
pub mod payments;
pub mod procurements;
pub mod reference;
pub mod requisitions;
pub mod system;
pub mod transfers;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/requisitions", requisitions::router())
        .nest("/inventory", inventory::router())
        .nest("/logbook", logbook::router())
        .nest("/transfers", transfers::router())
        .nest("/procurements", procurements::router())
        .nest("/payments", payments::router())
        .nest("/units", reference::router::<Unit>())
        .nest("/item-groups", reference::router::<ItemGroup>())
        .nest("/items", reference::router::<Item>())
        .nest("/sites", reference::router::<Site>())
        .nest("/users", reference::router::<User>())
        .nest("/machines", reference::router::<Machine>())
}
