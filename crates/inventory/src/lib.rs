//! Inventory domain module: stock records and the movement ledger.
//!
//! This crate contains business rules for stock levels, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod change;
pub mod movement;
pub mod record;

pub use change::{
    AdjustStock, DEFAULT_ADJUSTMENT_REASON, OPENING_BALANCE_REASON, RecordMovement, StockChange,
    plan_adjustment, plan_movement, plan_opening,
};
pub use movement::{MovementEntry, MovementType, Polarity};
pub use record::{InventoryRecord, OpenRecord, RecordParts, StockKey, StockStatus, available_quantity};
