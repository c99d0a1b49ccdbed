//! Inventory domain module.
//!
//! Stock is tracked per (site, item). Records change through explicit
//! adjustments and as a side effect of receiving requisitions and purchases.
//! Pure domain logic: no IO, no HTTP, no storage.

pub mod adjustment;
pub mod record;

pub use adjustment::{AdjustmentSource, InventoryAdjustment};
pub use record::{
    AdjustStock, InventoryCommand, InventoryEvent, InventoryKey, InventoryRecord,
    MinimumLevelSet, OpenRecord, RecordOpened, SetMinimumLevel, StockAdjusted,
};
