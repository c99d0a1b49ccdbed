//! API-side authorization guards.
//!
//! Permissions are checked here, before any store or aggregate is touched.
//! Workflow party rules (who may forward, respond, receive, ...) stay in the
//! domain crates and surface as domain errors.

use axum::http::StatusCode;
use axum::response::Response;

use fleetops_auth::{Permission, Principal, authorize};
use fleetops_core::{Actor, SiteId};

use crate::app::errors::json_error;

/// Fail with 403 unless the principal holds `permission`.
pub fn require(principal: &Principal, permission: &'static str) -> Result<(), Response> {
    authorize(principal, &Permission::new(permission))
        .map_err(|e| json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string()))
}

/// Non-admins may only act on their own site.
pub fn require_site(principal: &Principal, site_id: SiteId) -> Result<(), Response> {
    if principal.is_admin() || principal.site_id == Some(site_id) {
        return Ok(());
    }
    Err(json_error(
        StatusCode::FORBIDDEN,
        "forbidden",
        format!("not permitted for site {site_id}"),
    ))
}

/// Non-admin principals that belong to a site only see that site's records.
pub fn visible_site(principal: &Principal) -> Option<SiteId> {
    if principal.is_admin() {
        None
    } else {
        principal.site_id
    }
}

pub fn actor(principal: &Principal) -> Actor {
    Actor {
        user_id: principal.user_id,
        site_id: principal.site_id,
        admin: principal.is_admin(),
    }
}
