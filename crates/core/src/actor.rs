//! The acting user as seen by workflow guards.

use serde::{Deserialize, Serialize};

use crate::id::{SiteId, UserId};

/// Who is performing an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub site_id: Option<SiteId>,
    pub admin: bool,
}

impl Actor {
    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            site_id: None,
            admin: true,
        }
    }

    pub fn site_user(user_id: UserId, site_id: SiteId) -> Self {
        Self {
            user_id,
            site_id: Some(site_id),
            admin: false,
        }
    }

    /// True when the actor belongs to `site` (never for `None`).
    pub fn at_site(&self, site: Option<SiteId>) -> bool {
        site.is_some() && self.site_id == site
    }
}
