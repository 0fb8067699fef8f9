use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use invista_core::{
    DomainError, DomainResult, Entity, InventoryItemId, ProductId, TenantId, UserId,
    VariantId, WarehouseId,
};

/// Available quantity derived from on-hand and reserved, floored at zero.
pub fn available_quantity(quantity: i64, reserved_quantity: i64) -> i64 {
    (quantity - reserved_quantity).max(0)
}

/// Natural key of a stock record: one product (or variant) in one warehouse.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockKey {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub warehouse_id: WarehouseId,
}

/// Stock health derived from the available quantity and the reorder point.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
}

impl StockStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StockStatus::InStock => "IN_STOCK",
            StockStatus::LowStock => "LOW_STOCK",
            StockStatus::OutOfStock => "OUT_OF_STOCK",
        }
    }

    /// Low and out-of-stock records are surfaced as alerts.
    pub fn is_alert(self) -> bool {
        !matches!(self, StockStatus::InStock)
    }
}

impl core::str::FromStr for StockStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "IN_STOCK" => Ok(StockStatus::InStock),
            "LOW_STOCK" => Ok(StockStatus::LowStock),
            "OUT_OF_STOCK" => Ok(StockStatus::OutOfStock),
            other => Err(DomainError::validation(format!("unknown stock status '{other}'"))),
        }
    }
}

/// Command: start tracking a product (or variant) in a warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenRecord {
    pub tenant_id: TenantId,
    pub key: StockKey,
    pub quantity: i64,
    pub reserved_quantity: i64,
    pub reorder_point: Option<i64>,
    pub actor_id: UserId,
}

/// Raw column values of a stored record, used to rehydrate an [`InventoryRecord`].
///
/// The available quantity is not part of the parts: it is always recomputed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordParts {
    pub id: InventoryItemId,
    pub tenant_id: TenantId,
    pub key: StockKey,
    pub quantity: i64,
    pub reserved_quantity: i64,
    pub reorder_point: Option<i64>,
    pub active: bool,
    pub version: u64,
    pub last_movement_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Stock level of one product/variant in one warehouse.
///
/// `available_quantity == max(0, quantity - reserved_quantity)` holds for every
/// value of this type: the field is only ever written together with the
/// quantities it is derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryRecord {
    id: InventoryItemId,
    tenant_id: TenantId,
    #[serde(flatten)]
    key: StockKey,
    quantity: i64,
    reserved_quantity: i64,
    available_quantity: i64,
    reorder_point: Option<i64>,
    active: bool,
    version: u64,
    last_movement_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl InventoryRecord {
    /// Open a record the first time a product is stocked in a warehouse.
    pub fn open(
        id: InventoryItemId,
        tenant_id: TenantId,
        key: StockKey,
        quantity: i64,
        reserved_quantity: i64,
        reorder_point: Option<i64>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if quantity < 0 {
            return Err(DomainError::validation("quantity cannot be negative"));
        }
        if reserved_quantity < 0 {
            return Err(DomainError::validation("reserved quantity cannot be negative"));
        }
        if reserved_quantity > quantity {
            return Err(DomainError::validation(
                "reserved quantity cannot exceed on-hand quantity",
            ));
        }
        if reorder_point.is_some_and(|p| p < 0) {
            return Err(DomainError::validation("reorder point cannot be negative"));
        }

        Ok(Self::from_parts(RecordParts {
            id,
            tenant_id,
            key,
            quantity,
            reserved_quantity,
            reorder_point,
            active: true,
            version: 1,
            last_movement_at: (quantity > 0).then_some(now),
            created_at: now,
        }))
    }

    /// Rehydrate a stored record.
    ///
    /// Stored rows are trusted as-is, including over-reserved ones
    /// (`reserved_quantity > quantity`); availability is floored at zero.
    pub fn from_parts(parts: RecordParts) -> Self {
        Self {
            id: parts.id,
            tenant_id: parts.tenant_id,
            key: parts.key,
            quantity: parts.quantity,
            reserved_quantity: parts.reserved_quantity,
            available_quantity: available_quantity(parts.quantity, parts.reserved_quantity),
            reorder_point: parts.reorder_point,
            active: parts.active,
            version: parts.version,
            last_movement_at: parts.last_movement_at,
            created_at: parts.created_at,
        }
    }

    pub fn id_typed(&self) -> InventoryItemId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn key(&self) -> &StockKey {
        &self.key
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn reserved_quantity(&self) -> i64 {
        self.reserved_quantity
    }

    pub fn available_quantity(&self) -> i64 {
        self.available_quantity
    }

    pub fn reorder_point(&self) -> Option<i64> {
        self.reorder_point
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn last_movement_at(&self) -> Option<DateTime<Utc>> {
        self.last_movement_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// More units reserved than physically on hand.
    pub fn is_over_reserved(&self) -> bool {
        self.reserved_quantity > self.quantity
    }

    pub fn status(&self) -> StockStatus {
        if self.available_quantity == 0 {
            StockStatus::OutOfStock
        } else if self
            .reorder_point
            .is_some_and(|point| self.available_quantity <= point)
        {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }

    /// Next revision with a new on-hand quantity. Reserved units are untouched.
    pub(crate) fn with_quantity(&self, quantity: i64, at: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.quantity = quantity;
        next.available_quantity = available_quantity(quantity, self.reserved_quantity);
        next.last_movement_at = Some(at);
        next.version = self.version + 1;
        next
    }

    /// Next revision with the record soft-deactivated.
    pub fn deactivated(&self) -> DomainResult<Self> {
        if !self.active {
            return Err(DomainError::conflict("record is already inactive"));
        }
        let mut next = self.clone();
        next.active = false;
        next.version = self.version + 1;
        Ok(next)
    }
}

impl Entity for InventoryRecord {
    type Id = InventoryItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
