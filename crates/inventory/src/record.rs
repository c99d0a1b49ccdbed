use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleetops_core::{Aggregate, AggregateRoot, DomainError, ItemId, SiteId};
use fleetops_events::Event;

use crate::adjustment::AdjustmentSource;

/// Inventory records are keyed by (site, item).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InventoryKey {
    pub site_id: SiteId,
    pub item_id: ItemId,
}

impl InventoryKey {
    pub fn new(site_id: SiteId, item_id: ItemId) -> Self {
        Self { site_id, item_id }
    }
}

impl core::fmt::Display for InventoryKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.site_id, self.item_id)
    }
}

/// Aggregate root: stock of one item at one site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    key: InventoryKey,
    quantity: i64,
    minimum_level: i64,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl InventoryRecord {
    /// Create an empty, not-yet-opened record.
    pub fn empty(key: InventoryKey) -> Self {
        Self {
            key,
            quantity: 0,
            minimum_level: 0,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn key(&self) -> InventoryKey {
        self.key
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn minimum_level(&self) -> i64 {
        self.minimum_level
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn is_open(&self) -> bool {
        self.created
    }

    /// Stock at or under the minimum level needs reordering.
    pub fn is_below_minimum(&self) -> bool {
        self.minimum_level > 0 && self.quantity <= self.minimum_level
    }
}

impl AggregateRoot for InventoryRecord {
    type Id = InventoryKey;

    fn id(&self) -> &Self::Id {
        &self.key
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenRecord (start tracking an item at a site).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenRecord {
    pub key: InventoryKey,
    pub quantity: i64,
    pub minimum_level: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdjustStock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub key: InventoryKey,
    pub delta: i64,
    pub source: AdjustmentSource,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetMinimumLevel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetMinimumLevel {
    pub key: InventoryKey,
    pub minimum_level: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryCommand {
    OpenRecord(OpenRecord),
    AdjustStock(AdjustStock),
    SetMinimumLevel(SetMinimumLevel),
}

/// Event: RecordOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOpened {
    pub key: InventoryKey,
    pub quantity: i64,
    pub minimum_level: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockAdjusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjusted {
    pub key: InventoryKey,
    pub delta: i64,
    pub source: AdjustmentSource,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MinimumLevelSet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinimumLevelSet {
    pub key: InventoryKey,
    pub minimum_level: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    RecordOpened(RecordOpened),
    StockAdjusted(StockAdjusted),
    MinimumLevelSet(MinimumLevelSet),
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::RecordOpened(_) => "inventory.record.opened",
            InventoryEvent::StockAdjusted(_) => "inventory.record.stock_adjusted",
            InventoryEvent::MinimumLevelSet(_) => "inventory.record.minimum_level_set",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::RecordOpened(e) => e.occurred_at,
            InventoryEvent::StockAdjusted(e) => e.occurred_at,
            InventoryEvent::MinimumLevelSet(e) => e.occurred_at,
        }
    }
}

impl Aggregate for InventoryRecord {
    type Command = InventoryCommand;
    type Event = InventoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InventoryEvent::RecordOpened(e) => {
                self.key = e.key;
                self.quantity = e.quantity;
                self.minimum_level = e.minimum_level;
                self.updated_at = Some(e.occurred_at);
                self.created = true;
            }
            InventoryEvent::StockAdjusted(e) => {
                self.quantity = self.quantity.saturating_add(e.delta);
                self.updated_at = Some(e.occurred_at);
            }
            InventoryEvent::MinimumLevelSet(e) => {
                self.minimum_level = e.minimum_level;
                self.updated_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InventoryCommand::OpenRecord(cmd) => self.handle_open(cmd),
            InventoryCommand::AdjustStock(cmd) => self.handle_adjust(cmd),
            InventoryCommand::SetMinimumLevel(cmd) => self.handle_set_minimum(cmd),
        }
    }
}

impl InventoryRecord {
    fn ensure_key(&self, key: InventoryKey) -> Result<(), DomainError> {
        if self.key != key {
            return Err(DomainError::invariant("inventory key mismatch"));
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenRecord) -> Result<Vec<InventoryEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("inventory record already exists"));
        }
        self.ensure_key(cmd.key)?;
        if cmd.quantity < 0 {
            return Err(DomainError::validation("quantity cannot be negative"));
        }
        if cmd.minimum_level < 0 {
            return Err(DomainError::validation("minimum level cannot be negative"));
        }

        Ok(vec![InventoryEvent::RecordOpened(RecordOpened {
            key: cmd.key,
            quantity: cmd.quantity,
            minimum_level: cmd.minimum_level,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_adjust(&self, cmd: &AdjustStock) -> Result<Vec<InventoryEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_key(cmd.key)?;

        if cmd.delta == 0 {
            return Err(DomainError::validation("delta cannot be zero"));
        }

        let new_quantity = self
            .quantity
            .checked_add(cmd.delta)
            .ok_or_else(|| DomainError::invariant("stock quantity out of range"))?;
        if new_quantity < 0 {
            return Err(DomainError::invariant("stock cannot go negative"));
        }

        Ok(vec![InventoryEvent::StockAdjusted(StockAdjusted {
            key: cmd.key,
            delta: cmd.delta,
            source: cmd.source.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_minimum(
        &self,
        cmd: &SetMinimumLevel,
    ) -> Result<Vec<InventoryEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_key(cmd.key)?;
        if cmd.minimum_level < 0 {
            return Err(DomainError::validation("minimum level cannot be negative"));
        }
        if cmd.minimum_level == self.minimum_level {
            return Ok(Vec::new());
        }

        Ok(vec![InventoryEvent::MinimumLevelSet(MinimumLevelSet {
            key: cmd.key,
            minimum_level: cmd.minimum_level,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_key() -> InventoryKey {
        InventoryKey::new(SiteId::new(), ItemId::new())
    }

    fn opened(key: InventoryKey, quantity: i64, minimum_level: i64) -> InventoryRecord {
        let record = InventoryRecord::empty(key);
        let (record, _) = record
            .execute(&InventoryCommand::OpenRecord(OpenRecord {
                key,
                quantity,
                minimum_level,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        record
    }

    fn adjust(key: InventoryKey, delta: i64) -> InventoryCommand {
        InventoryCommand::AdjustStock(AdjustStock {
            key,
            delta,
            source: AdjustmentSource::Manual,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn open_then_adjust_tracks_quantity() {
        let key = test_key();
        let record = opened(key, 5, 2);
        assert!(record.is_open());
        assert_eq!(record.quantity(), 5);

        let (record, events) = record.execute(&adjust(key, 10)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(record.quantity(), 15);
        assert_eq!(record.version(), 2);
    }

    #[test]
    fn cannot_adjust_unopened_record() {
        let key = test_key();
        let err = InventoryRecord::empty(key).handle(&adjust(key, 1)).unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn stock_cannot_go_negative() {
        let key = test_key();
        let record = opened(key, 3, 0);
        match record.handle(&adjust(key, -4)).unwrap_err() {
            DomainError::InvariantViolation(msg) if msg.contains("negative") => {}
            other => panic!("expected InvariantViolation, got {other:?}"),
        }
    }

    #[test]
    fn adjustments_past_the_numeric_range_are_refused() {
        let key = test_key();
        let record = opened(key, 10, 0);
        match record.handle(&adjust(key, i64::MAX)).unwrap_err() {
            DomainError::InvariantViolation(msg) if msg.contains("out of range") => {}
            other => panic!("expected InvariantViolation, got {other:?}"),
        }
    }

    #[test]
    fn opening_twice_conflicts() {
        let key = test_key();
        let record = opened(key, 0, 0);
        let err = record
            .handle(&InventoryCommand::OpenRecord(OpenRecord {
                key,
                quantity: 1,
                minimum_level: 0,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn below_minimum_flag_follows_stock() {
        let key = test_key();
        let record = opened(key, 10, 4);
        assert!(!record.is_below_minimum());

        let (record, _) = record.execute(&adjust(key, -6)).unwrap();
        assert!(record.is_below_minimum());

        let (record, _) = record
            .execute(&InventoryCommand::SetMinimumLevel(SetMinimumLevel {
                key,
                minimum_level: 0,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        assert!(!record.is_below_minimum());
    }

    #[test]
    fn setting_same_minimum_is_a_no_op() {
        let key = test_key();
        let record = opened(key, 10, 4);
        let events = record
            .handle(&InventoryCommand::SetMinimumLevel(SetMinimumLevel {
                key,
                minimum_level: 4,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        assert!(events.is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: whatever sequence of adjustments is attempted, accepted
        /// ones never drive stock below zero and the final quantity equals
        /// the sum of accepted deltas.
        #[test]
        fn accepted_adjustments_keep_stock_non_negative(
            deltas in prop::collection::vec(-50i64..50i64, 1..40)
        ) {
            let key = test_key();
            let mut record = opened(key, 0, 0);
            let mut expected = 0i64;

            for delta in deltas {
                if let Ok((next, _)) = record.execute(&adjust(key, delta)) {
                    expected += delta;
                    record = next;
                }
                prop_assert!(record.quantity() >= 0);
            }
            prop_assert_eq!(record.quantity(), expected);
        }
    }
}
