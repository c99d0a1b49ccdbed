use std::collections::HashSet;

use thiserror::Error;

use fleetops_core::{SiteId, UserId};

use crate::{JwtClaims, Permission, Role};

/// A fully resolved principal for authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub name: String,
    pub site_id: Option<SiteId>,
    pub roles: Vec<Role>,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(Role::is_admin)
    }

    /// Union of the permissions granted by every role.
    pub fn permissions(&self) -> HashSet<Permission> {
        self.roles
            .iter()
            .flat_map(|r| permissions_for_role(r.as_str()))
            .collect()
    }
}

impl From<JwtClaims> for Principal {
    fn from(claims: JwtClaims) -> Self {
        Self {
            user_id: claims.sub,
            name: claims.name,
            site_id: claims.site_id,
            roles: claims.roles,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Role → permission mapping.
///
/// - `admin` is granted everything.
/// - `site_user` runs the day-to-day site workflows.
/// - `viewer` (and unknown roles) can only read.
pub fn permissions_for_role(role: &str) -> Vec<Permission> {
    let names: &[&'static str] = match role {
        Role::ADMIN => &[Permission::WILDCARD],
        Role::SITE_USER => &[
            "catalog.read",
            "requisitions.read",
            "requisitions.create",
            "requisitions.transition",
            "inventory.read",
            "inventory.write",
            "logbook.read",
            "logbook.write",
            "transfers.read",
            "transfers.create",
            "transfers.complete",
            "procurements.read",
            "procurements.receive",
            "payments.read",
        ],
        Role::VIEWER => &[
            "catalog.read",
            "requisitions.read",
            "inventory.read",
            "logbook.read",
            "transfers.read",
        ],
        _ => &[],
    };
    names.iter().map(|n| Permission::new(*n)).collect()
}

/// Authorize a principal for one permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let perms = principal.permissions();
    if perms.iter().any(Permission::is_wildcard) || perms.contains(required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(roles: Vec<Role>) -> Principal {
        Principal {
            user_id: UserId::new(),
            name: "tester".to_string(),
            site_id: None,
            roles,
        }
    }

    #[test]
    fn admin_has_wildcard() {
        let p = principal(vec![Role::admin()]);
        assert!(p.is_admin());
        assert!(authorize(&p, &Permission::new("catalog.write")).is_ok());
    }

    #[test]
    fn site_user_cannot_write_catalog() {
        let p = principal(vec![Role::site_user()]);
        assert!(authorize(&p, &Permission::new("requisitions.transition")).is_ok());
        assert_eq!(
            authorize(&p, &Permission::new("catalog.write")),
            Err(AuthzError::Forbidden("catalog.write".to_string()))
        );
    }

    #[test]
    fn unknown_role_grants_nothing() {
        let p = principal(vec![Role::new("contractor")]);
        assert!(authorize(&p, &Permission::new("requisitions.read")).is_err());
    }
}
