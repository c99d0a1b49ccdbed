use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleetops_core::{AggregateId, ItemId, SiteId};

use crate::record::{AdjustStock, InventoryKey};

/// What caused a stock movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdjustmentSource {
    /// Lines of a requisition were received at the requesting site.
    Requisition { requisition_id: AggregateId },
    /// A procurement was received at its destination site.
    Procurement { procurement_id: AggregateId },
    /// A store keeper corrected the count by hand.
    Manual,
}

/// Side effect emitted by workflow transitions: move `delta` units of
/// `item_id` into (or out of) `site_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryAdjustment {
    pub site_id: SiteId,
    pub item_id: ItemId,
    pub delta: i64,
    pub source: AdjustmentSource,
}

impl InventoryAdjustment {
    pub fn key(&self) -> InventoryKey {
        InventoryKey::new(self.site_id, self.item_id)
    }

    pub fn into_command(self, occurred_at: DateTime<Utc>) -> AdjustStock {
        AdjustStock {
            key: self.key(),
            delta: self.delta,
            source: self.source,
            occurred_at,
        }
    }
}
