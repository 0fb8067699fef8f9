//! API-side authorization guard.
//!
//! Enforced at the handler boundary, before the stock service is called, so
//! the service and stores stay auth-agnostic.

use std::collections::HashSet;

use thiserror::Error;

use crate::context::PrincipalContext;

/// Read stock levels and ledgers.
pub const STOCK_READ: &str = "inventory.stock.read";
/// Adjust quantities and record movements.
pub const STOCK_ADJUST: &str = "inventory.stock.adjust";
/// Open and deactivate inventory records.
pub const STOCK_CREATE: &str = "inventory.stock.create";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(&'static str),
}

/// Check that the principal holds `required` in its tenant.
pub fn authorize(principal: &PrincipalContext, required: &'static str) -> Result<(), AuthzError> {
    let perms: HashSet<&str> = permissions_from_roles(principal.roles())
        .into_iter()
        .collect();

    if perms.contains("*") || perms.contains(required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required))
    }
}

/// Static role→permission mapping.
///
/// Convention: "admin" grants all permissions in the current tenant.
fn permissions_from_roles(roles: &[String]) -> Vec<&'static str> {
    let mut perms = Vec::new();
    for role in roles {
        match role.as_str() {
            "admin" => return vec!["*"],
            "inventory_manager" => perms.extend([STOCK_READ, STOCK_ADJUST, STOCK_CREATE]),
            "warehouse_staff" => perms.extend([STOCK_READ, STOCK_ADJUST]),
            "viewer" => perms.push(STOCK_READ),
            _ => {}
        }
    }
    perms
}
