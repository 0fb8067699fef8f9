use std::str::FromStr;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use invista_infra::{Page, PageResult, StockFilter};
use invista_inventory::{InventoryRecord, MovementEntry, StockStatus};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

/// Body of `POST /inventory/stock`.
///
/// Every field is optional at the serde level so a missing one is reported as
/// a 400 naming the field.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustStockRequest {
    pub inventory_item_id: Option<String>,
    pub new_quantity: Option<i64>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub user_id: Option<String>,
}

/// Body of `POST /inventory/stock/records`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenRecordRequest {
    pub product_id: Option<String>,
    pub variant_id: Option<String>,
    pub warehouse_id: Option<String>,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub reserved_quantity: i64,
    pub reorder_point: Option<i64>,
}

/// Body of `POST /inventory/movements`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMovementRequest {
    pub inventory_item_id: Option<String>,
    #[serde(rename = "type")]
    pub movement_type: Option<String>,
    pub quantity: Option<i64>,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

/// Query of `GET /inventory/stock`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockListQuery {
    pub warehouse_id: Option<String>,
    pub status: Option<String>,
    pub alerts_only: Option<bool>,
    pub include_inactive: Option<bool>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl StockListQuery {
    pub fn filter(&self) -> Result<StockFilter, axum::response::Response> {
        Ok(StockFilter {
            warehouse_id: self
                .warehouse_id
                .as_deref()
                .map(|v| parse_field("warehouseId", v))
                .transpose()?,
            status: self
                .status
                .as_deref()
                .map(|v| parse_field::<StockStatus>("status", v))
                .transpose()?,
            alerts_only: self.alerts_only.unwrap_or(false),
            include_inactive: self.include_inactive.unwrap_or(false),
        })
    }

    pub fn page(&self) -> Page {
        Page::new(self.page, self.limit)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageQuery {
    pub fn page(&self) -> Page {
        Page::new(self.page, self.limit)
    }
}

// -------------------------
// Response DTOs
// -------------------------

/// Result of a stock write: the new record revision and its ledger row.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockChangeResponse<'a> {
    pub updated_item: &'a InventoryRecord,
    pub movement: &'a MovementEntry,
}

/// A record plus its derived stock status.
#[derive(Debug, Serialize)]
pub struct StockRecordView<'a> {
    #[serde(flatten)]
    pub record: &'a InventoryRecord,
    pub status: StockStatus,
}

impl<'a> From<&'a InventoryRecord> for StockRecordView<'a> {
    fn from(record: &'a InventoryRecord) -> Self {
        Self {
            record,
            status: record.status(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

#[derive(Debug, Serialize)]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

impl<T> PageResponse<T> {
    pub fn from_page<'a, U>(result: &'a PageResult<U>, map: impl Fn(&'a U) -> T) -> Self {
        Self {
            items: result.items.iter().map(map).collect(),
            pagination: Pagination {
                page: result.page.page,
                limit: result.page.limit,
                total: result.total,
                total_pages: result.total_pages(),
            },
        }
    }
}

// -------------------------
// Parsing helpers
// -------------------------

/// A field that must be present.
pub fn required<T>(field: &'static str, value: Option<T>) -> Result<T, axum::response::Response> {
    value.ok_or_else(|| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_input",
            format!("{field} is required"),
        )
    })
}

/// Parse a string field (ids, enums) into its typed form.
pub fn parse_field<T>(field: &'static str, value: &str) -> Result<T, axum::response::Response>
where
    T: FromStr,
{
    value.parse().map_err(|_| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_input",
            format!("{field} is invalid: '{value}'"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjust_request_uses_camel_case_and_tolerates_missing_fields() {
        let req: AdjustStockRequest =
            serde_json::from_str(r#"{"inventoryItemId":"x","newQuantity":4,"userId":"u"}"#).unwrap();
        assert_eq!(req.inventory_item_id.as_deref(), Some("x"));
        assert_eq!(req.new_quantity, Some(4));
        assert_eq!(req.user_id.as_deref(), Some("u"));

        let empty: AdjustStockRequest = serde_json::from_str("{}").unwrap();
        assert!(empty.new_quantity.is_none());
    }

    #[test]
    fn list_query_builds_filter() {
        let query = StockListQuery {
            status: Some("low_stock".to_string()),
            alerts_only: Some(true),
            ..StockListQuery::default()
        };
        let filter = query.filter().unwrap();
        assert_eq!(filter.status, Some(StockStatus::LowStock));
        assert!(filter.alerts_only);
        assert!(!filter.include_inactive);

        let bad = StockListQuery {
            warehouse_id: Some("not-a-uuid".to_string()),
            ..StockListQuery::default()
        };
        assert_eq!(bad.filter().unwrap_err().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn missing_field_is_a_bad_request() {
        let res = required::<i64>("newQuantity", None).unwrap_err();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(required("newQuantity", Some(3)).unwrap(), 3);
    }
}
