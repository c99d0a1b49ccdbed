//! Current stock per (site, item).
//!
//! Each entry is an [`InventoryRecord`] aggregate; every mutation goes
//! through `execute` so the record's own rules (no negative stock, no
//! zero adjustments) hold. Batches from workflow side effects are applied
//! all-or-nothing under one write lock.

use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use fleetops_core::{Aggregate, DomainError, DomainResult};
use fleetops_inventory::{
    AdjustStock, AdjustmentSource, InventoryAdjustment, InventoryCommand, InventoryKey,
    InventoryRecord, OpenRecord, SetMinimumLevel,
};

#[derive(Debug, Default)]
pub struct StockLedger {
    records: RwLock<BTreeMap<InventoryKey, InventoryRecord>>,
}

type Records = BTreeMap<InventoryKey, InventoryRecord>;

fn poisoned() -> DomainError {
    DomainError::invariant("stock ledger lock poisoned")
}

fn execute(record: &InventoryRecord, command: InventoryCommand) -> DomainResult<InventoryRecord> {
    record.execute(&command).map(|(next, _)| next)
}

fn open(key: InventoryKey, quantity: i64, minimum_level: i64, at: DateTime<Utc>) -> DomainResult<InventoryRecord> {
    execute(
        &InventoryRecord::empty(key),
        InventoryCommand::OpenRecord(OpenRecord {
            key,
            quantity,
            minimum_level,
            occurred_at: at,
        }),
    )
}

impl StockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &InventoryKey) -> Option<InventoryRecord> {
        self.records.read().ok()?.get(key).cloned()
    }

    pub fn list(&self) -> Vec<InventoryRecord> {
        match self.records.read() {
            Ok(records) => records.values().cloned().collect(),
            Err(_) => vec![],
        }
    }

    /// Set quantity and minimum level, opening the record when missing.
    ///
    /// A quantity change is recorded as a manual adjustment.
    pub fn put(
        &self,
        key: InventoryKey,
        quantity: i64,
        minimum_level: i64,
        at: DateTime<Utc>,
    ) -> DomainResult<InventoryRecord> {
        let mut records = self.records.write().map_err(|_| poisoned())?;

        let next = match records.get(&key) {
            None => open(key, quantity, minimum_level, at)?,
            Some(current) => {
                let mut next = current.clone();
                let delta = quantity
                    .checked_sub(current.quantity())
                    .ok_or_else(|| DomainError::invariant("stock quantity out of range"))?;
                if delta != 0 {
                    next = execute(
                        &next,
                        InventoryCommand::AdjustStock(AdjustStock {
                            key,
                            delta,
                            source: AdjustmentSource::Manual,
                            occurred_at: at,
                        }),
                    )?;
                }
                execute(
                    &next,
                    InventoryCommand::SetMinimumLevel(SetMinimumLevel {
                        key,
                        minimum_level,
                        occurred_at: at,
                    }),
                )?
            }
        };

        records.insert(key, next.clone());
        tracing::info!(%key, quantity, minimum_level, "stock record saved");
        Ok(next)
    }

    /// Adjust an existing record.
    pub fn adjust(
        &self,
        key: InventoryKey,
        delta: i64,
        source: AdjustmentSource,
        at: DateTime<Utc>,
    ) -> DomainResult<InventoryRecord> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        let current = records.get(&key).ok_or(DomainError::NotFound)?;
        let next = execute(
            current,
            InventoryCommand::AdjustStock(AdjustStock {
                key,
                delta,
                source,
                occurred_at: at,
            }),
        )?;
        records.insert(key, next.clone());
        tracing::info!(%key, delta, quantity = next.quantity(), "stock adjusted");
        Ok(next)
    }

    pub fn remove(&self, key: &InventoryKey) -> Option<InventoryRecord> {
        self.records.write().ok()?.remove(key)
    }

    /// Apply workflow adjustments atomically. Missing records are opened at
    /// zero; if any adjustment is refused nothing changes.
    pub fn apply_batch(
        &self,
        adjustments: &[InventoryAdjustment],
        at: DateTime<Utc>,
    ) -> DomainResult<Vec<InventoryRecord>> {
        if adjustments.is_empty() {
            return Ok(vec![]);
        }

        let mut records = self.records.write().map_err(|_| poisoned())?;
        let mut staged: Records = BTreeMap::new();

        for adjustment in adjustments {
            let key = adjustment.key();
            let current = match staged.get(&key).or_else(|| records.get(&key)) {
                Some(record) => record.clone(),
                None => open(key, 0, 0, at)?,
            };
            if adjustment.delta == 0 {
                staged.insert(key, current);
                continue;
            }
            let next = execute(
                &current,
                InventoryCommand::AdjustStock(adjustment.clone().into_command(at)),
            )?;
            staged.insert(key, next);
        }

        let updated: Vec<InventoryRecord> = staged.values().cloned().collect();
        records.extend(staged);
        tracing::info!(
            adjustments = adjustments.len(),
            records = updated.len(),
            "stock adjustments applied"
        );
        Ok(updated)
    }
}
