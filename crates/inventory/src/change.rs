//! Stock changes: the pure decision step behind every ledger write.
//!
//! A planner takes the current record and a command and returns the next
//! revision of the record together with the one ledger row describing the
//! change. Persisting both together is the caller's job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use invista_core::{DomainError, DomainResult, InventoryItemId, MovementId, TenantId, UserId};

use crate::movement::{MovementEntry, MovementType, Polarity};
use crate::record::{InventoryRecord, OpenRecord};

/// Reason recorded on an adjustment when the caller gives none.
pub const DEFAULT_ADJUSTMENT_REASON: &str = "Manual adjustment";

/// Reason recorded on the receipt that carries a record's opening stock.
pub const OPENING_BALANCE_REASON: &str = "Opening balance";

/// Command: set the on-hand quantity of a record to an absolute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub target_quantity: i64,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub actor_id: UserId,
}

impl AdjustStock {
    /// Input checks that need no stored state.
    pub fn validate(&self) -> DomainResult<()> {
        if self.target_quantity < 0 {
            return Err(DomainError::validation("newQuantity cannot be negative"));
        }
        Ok(())
    }
}

/// Command: record a classified (inbound or outbound) movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMovement {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub actor_id: UserId,
}

impl RecordMovement {
    pub fn validate(&self) -> DomainResult<()> {
        if self.movement_type.polarity() == Polarity::Neutral {
            return Err(DomainError::validation(
                "adjustments set an absolute quantity; use the stock adjustment operation",
            ));
        }
        if self.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        Ok(())
    }
}

/// Next record revision plus the ledger row that explains it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockChange {
    pub record: InventoryRecord,
    pub movement: MovementEntry,
}

/// Plan the first revision of a record.
///
/// Opening stock is booked as a RECEIPT so the ledger explains every unit on
/// hand; an empty record starts without a ledger row.
pub fn plan_opening(
    cmd: &OpenRecord,
    now: DateTime<Utc>,
) -> DomainResult<(InventoryRecord, Option<MovementEntry>)> {
    let record = InventoryRecord::open(
        InventoryItemId::new(),
        cmd.tenant_id,
        cmd.key,
        cmd.quantity,
        cmd.reserved_quantity,
        cmd.reorder_point,
        now,
    )?;

    let movement = (cmd.quantity > 0).then(|| MovementEntry {
        id: MovementId::new(),
        tenant_id: cmd.tenant_id,
        inventory_item_id: record.id_typed(),
        movement_type: MovementType::Receipt,
        quantity_delta: cmd.quantity,
        quantity_before: 0,
        quantity_after: cmd.quantity,
        reason: OPENING_BALANCE_REASON.to_string(),
        notes: None,
        actor_id: cmd.actor_id,
        occurred_at: now,
    });

    Ok((record, movement))
}

/// Plan a stock adjustment to an absolute target quantity.
pub fn plan_adjustment(
    current: &InventoryRecord,
    cmd: &AdjustStock,
    now: DateTime<Utc>,
) -> DomainResult<StockChange> {
    cmd.validate()?;
    ensure_target(current, cmd.tenant_id, cmd.item_id)?;

    let before = current.quantity();
    let delta = cmd.target_quantity - before;
    let record = current.with_quantity(cmd.target_quantity, now);

    let movement = MovementEntry {
        id: MovementId::new(),
        tenant_id: cmd.tenant_id,
        inventory_item_id: cmd.item_id,
        movement_type: MovementType::Adjustment,
        quantity_delta: delta.abs(),
        quantity_before: before,
        quantity_after: cmd.target_quantity,
        reason: reason_or_default(cmd.reason.as_deref(), DEFAULT_ADJUSTMENT_REASON),
        notes: cmd.notes.clone(),
        actor_id: cmd.actor_id,
        occurred_at: now,
    };
    movement.verify()?;

    Ok(StockChange { record, movement })
}

/// Plan a receipt, shipment, transfer leg, return or damage write-off.
pub fn plan_movement(
    current: &InventoryRecord,
    cmd: &RecordMovement,
    now: DateTime<Utc>,
) -> DomainResult<StockChange> {
    cmd.validate()?;
    ensure_target(current, cmd.tenant_id, cmd.item_id)?;

    let before = current.quantity();
    let after = match cmd.movement_type.polarity() {
        Polarity::Inbound => before
            .checked_add(cmd.quantity)
            .ok_or_else(|| DomainError::validation("quantity overflows on-hand stock"))?,
        Polarity::Outbound => before - cmd.quantity,
        Polarity::Neutral => {
            return Err(DomainError::validation("movement type has no fixed direction"));
        }
    };
    if after < 0 {
        return Err(DomainError::validation(format!(
            "insufficient stock: {} on hand, {} requested",
            before, cmd.quantity
        )));
    }

    let record = current.with_quantity(after, now);
    let default_reason = cmd.movement_type.as_str().to_ascii_lowercase().replace('_', " ");
    let movement = MovementEntry {
        id: MovementId::new(),
        tenant_id: cmd.tenant_id,
        inventory_item_id: cmd.item_id,
        movement_type: cmd.movement_type,
        quantity_delta: cmd.quantity,
        quantity_before: before,
        quantity_after: after,
        reason: reason_or_default(cmd.reason.as_deref(), &default_reason),
        notes: cmd.notes.clone(),
        actor_id: cmd.actor_id,
        occurred_at: now,
    };
    movement.verify()?;

    Ok(StockChange { record, movement })
}

fn ensure_target(
    current: &InventoryRecord,
    tenant_id: TenantId,
    item_id: InventoryItemId,
) -> DomainResult<()> {
    if current.tenant_id() != tenant_id || current.id_typed() != item_id {
        return Err(DomainError::not_found());
    }
    if !current.is_active() {
        return Err(DomainError::validation("inventory record is inactive"));
    }
    Ok(())
}

fn reason_or_default(reason: Option<&str>, default: &str) -> String {
    match reason.map(str::trim) {
        Some(r) if !r.is_empty() => r.to_string(),
        _ => default.to_string(),
    }
}
