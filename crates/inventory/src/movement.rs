use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use invista_core::{DomainError, DomainResult, Entity, InventoryItemId, MovementId, TenantId, UserId};

/// Kind of stock movement recorded in the ledger.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    Receipt,
    Shipment,
    Adjustment,
    TransferOut,
    TransferIn,
    Return,
    Damage,
}

/// Direction in which a movement type moves on-hand stock.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Polarity {
    /// Increases on-hand quantity.
    Inbound,
    /// Decreases on-hand quantity.
    Outbound,
    /// Direction is read from the before/after quantities.
    Neutral,
}

impl MovementType {
    pub const ALL: [MovementType; 7] = [
        MovementType::Receipt,
        MovementType::Shipment,
        MovementType::Adjustment,
        MovementType::TransferOut,
        MovementType::TransferIn,
        MovementType::Return,
        MovementType::Damage,
    ];

    pub fn polarity(self) -> Polarity {
        match self {
            MovementType::Receipt | MovementType::TransferIn | MovementType::Return => {
                Polarity::Inbound
            }
            MovementType::Shipment | MovementType::TransferOut | MovementType::Damage => {
                Polarity::Outbound
            }
            MovementType::Adjustment => Polarity::Neutral,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::Receipt => "RECEIPT",
            MovementType::Shipment => "SHIPMENT",
            MovementType::Adjustment => "ADJUSTMENT",
            MovementType::TransferOut => "TRANSFER_OUT",
            MovementType::TransferIn => "TRANSFER_IN",
            MovementType::Return => "RETURN",
            MovementType::Damage => "DAMAGE",
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        MovementType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| DomainError::validation(format!("unknown movement type '{s}'")))
    }
}

/// One immutable row of the movement ledger.
///
/// `quantity_delta` is the magnitude of the change; its sign comes from the
/// movement type (or, for adjustments, from comparing before and after).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementEntry {
    pub id: MovementId,
    pub tenant_id: TenantId,
    pub inventory_item_id: InventoryItemId,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    pub quantity_delta: i64,
    pub quantity_before: i64,
    pub quantity_after: i64,
    pub reason: String,
    pub notes: Option<String>,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

impl MovementEntry {
    /// Signed change in on-hand quantity.
    pub fn signed_delta(&self) -> i64 {
        self.quantity_after - self.quantity_before
    }

    /// Check the ledger invariant for this row.
    pub fn verify(&self) -> DomainResult<()> {
        if self.quantity_delta < 0 {
            return Err(DomainError::invariant("quantity delta is a magnitude and cannot be negative"));
        }
        if self.quantity_before < 0 || self.quantity_after < 0 {
            return Err(DomainError::invariant("on-hand quantity cannot be negative"));
        }

        let consistent = match self.movement_type.polarity() {
            Polarity::Inbound => self.quantity_after == self.quantity_before + self.quantity_delta,
            Polarity::Outbound => self.quantity_after == self.quantity_before - self.quantity_delta,
            Polarity::Neutral => self.signed_delta().abs() == self.quantity_delta,
        };

        if consistent {
            Ok(())
        } else {
            Err(DomainError::invariant(format!(
                "{} movement does not reconcile: before={} after={} delta={}",
                self.movement_type, self.quantity_before, self.quantity_after, self.quantity_delta
            )))
        }
    }
}

impl Entity for MovementEntry {
    type Id = MovementId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(movement_type: MovementType, before: i64, after: i64, delta: i64) -> MovementEntry {
        MovementEntry {
            id: MovementId::new(),
            tenant_id: TenantId::new(),
            inventory_item_id: InventoryItemId::new(),
            movement_type,
            quantity_delta: delta,
            quantity_before: before,
            quantity_after: after,
            reason: "test".to_string(),
            notes: None,
            actor_id: UserId::new(),
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn classification_partitions_movement_types() {
        let inbound: Vec<_> = MovementType::ALL
            .into_iter()
            .filter(|t| t.polarity() == Polarity::Inbound)
            .collect();
        let outbound: Vec<_> = MovementType::ALL
            .into_iter()
            .filter(|t| t.polarity() == Polarity::Outbound)
            .collect();

        assert_eq!(inbound.len(), 3);
        assert!(inbound.contains(&MovementType::Receipt));
        assert!(inbound.contains(&MovementType::TransferIn));
        assert!(inbound.contains(&MovementType::Return));

        assert_eq!(outbound.len(), 3);
        assert!(outbound.contains(&MovementType::Shipment));
        assert!(outbound.contains(&MovementType::TransferOut));
        assert!(outbound.contains(&MovementType::Damage));

        assert_eq!(MovementType::Adjustment.polarity(), Polarity::Neutral);
    }

    #[test]
    fn verify_uses_polarity() {
        assert!(entry(MovementType::Receipt, 10, 15, 5).verify().is_ok());
        assert!(entry(MovementType::Receipt, 10, 5, 5).verify().is_err());
        assert!(entry(MovementType::Damage, 10, 8, 2).verify().is_ok());
        assert!(entry(MovementType::Damage, 10, 12, 2).verify().is_err());
    }

    #[test]
    fn adjustment_direction_comes_from_before_and_after() {
        assert!(entry(MovementType::Adjustment, 10, 4, 6).verify().is_ok());
        assert!(entry(MovementType::Adjustment, 4, 10, 6).verify().is_ok());
        assert!(entry(MovementType::Adjustment, 5, 5, 0).verify().is_ok());
        assert!(entry(MovementType::Adjustment, 4, 10, 5).verify().is_err());
    }

    #[test]
    fn negative_magnitude_is_rejected() {
        let err = entry(MovementType::Adjustment, 10, 4, -6).verify().unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn type_round_trips_through_wire_names() {
        for t in MovementType::ALL {
            assert_eq!(t.as_str().parse::<MovementType>().unwrap(), t);
            let json = serde_json::to_value(t).unwrap();
            assert_eq!(json, serde_json::Value::String(t.as_str().to_string()));
        }
        assert_eq!("transfer_in".parse::<MovementType>().unwrap(), MovementType::TransferIn);
    }
}
