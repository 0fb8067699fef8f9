//! Stock levels and the movement ledger.
//!
//! Handlers only parse and authorize; every read and write goes through the
//! shared `StockService`.

use axum::{
    Json,
    extract::{
        Extension, Path, Query,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};

use invista_core::{InventoryItemId, ProductId, UserId, VariantId, WarehouseId};
use invista_inventory::{AdjustStock, MovementType, OpenRecord, RecordMovement, StockKey};

use crate::app::dto::{self, PageResponse, StockChangeResponse, StockRecordView};
use crate::app::{SharedStockService, errors};
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

/// `GET /inventory/stock`
pub async fn list_stock(
    Extension(service): Extension<SharedStockService>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    query: Result<Query<dto::StockListQuery>, QueryRejection>,
) -> Result<Response, Response> {
    authorize(&principal, authz::STOCK_READ)?;
    let Query(query) = query.map_err(|e| bad_request(e.body_text()))?;

    let result = service
        .list_records(tenant.tenant_id(), query.filter()?, query.page())
        .await
        .map_err(errors::stock_error_to_response)?;

    Ok(Json(PageResponse::from_page(&result, StockRecordView::from)).into_response())
}

/// `POST /inventory/stock`: set an absolute on-hand quantity.
pub async fn adjust_stock(
    Extension(service): Extension<SharedStockService>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<dto::AdjustStockRequest>, JsonRejection>,
) -> Result<Response, Response> {
    authorize(&principal, authz::STOCK_ADJUST)?;
    let Json(body) = body.map_err(|e| bad_request(e.body_text()))?;

    let item_id: InventoryItemId = dto::parse_field(
        "inventoryItemId",
        &dto::required("inventoryItemId", body.inventory_item_id)?,
    )?;
    let target_quantity = dto::required("newQuantity", body.new_quantity)?;
    let actor_id = acting_user(&principal, body.user_id.as_deref())?;

    let change = service
        .adjust_stock(AdjustStock {
            tenant_id: tenant.tenant_id(),
            item_id,
            target_quantity,
            reason: body.reason,
            notes: body.notes,
            actor_id,
        })
        .await
        .map_err(errors::stock_error_to_response)?;

    Ok(Json(StockChangeResponse {
        updated_item: &change.record,
        movement: &change.movement,
    })
    .into_response())
}

/// `POST /inventory/stock/records`: start tracking a product in a warehouse.
pub async fn open_record(
    Extension(service): Extension<SharedStockService>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<dto::OpenRecordRequest>, JsonRejection>,
) -> Result<Response, Response> {
    authorize(&principal, authz::STOCK_CREATE)?;
    let Json(body) = body.map_err(|e| bad_request(e.body_text()))?;

    let product_id: ProductId =
        dto::parse_field("productId", &dto::required("productId", body.product_id)?)?;
    let warehouse_id: WarehouseId =
        dto::parse_field("warehouseId", &dto::required("warehouseId", body.warehouse_id)?)?;
    let variant_id: Option<VariantId> = body
        .variant_id
        .as_deref()
        .map(|v| dto::parse_field("variantId", v))
        .transpose()?;

    let record = service
        .open_record(OpenRecord {
            tenant_id: tenant.tenant_id(),
            key: StockKey {
                product_id,
                variant_id,
                warehouse_id,
            },
            quantity: body.quantity,
            reserved_quantity: body.reserved_quantity,
            reorder_point: body.reorder_point,
            actor_id: principal.user_id(),
        })
        .await
        .map_err(errors::stock_error_to_response)?;

    Ok((StatusCode::CREATED, Json(StockRecordView::from(&record))).into_response())
}

/// `GET /inventory/stock/:id`
pub async fn get_record(
    Extension(service): Extension<SharedStockService>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, Response> {
    authorize(&principal, authz::STOCK_READ)?;
    let item_id: InventoryItemId = dto::parse_field("id", &id)?;

    let record = service
        .get_record(tenant.tenant_id(), item_id)
        .await
        .map_err(errors::stock_error_to_response)?;

    Ok(Json(StockRecordView::from(&record)).into_response())
}

/// `DELETE /inventory/stock/:id`: soft-deactivate; the ledger is kept.
pub async fn deactivate_record(
    Extension(service): Extension<SharedStockService>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, Response> {
    authorize(&principal, authz::STOCK_CREATE)?;
    let item_id: InventoryItemId = dto::parse_field("id", &id)?;

    let record = service
        .deactivate(tenant.tenant_id(), item_id)
        .await
        .map_err(errors::stock_error_to_response)?;

    Ok(Json(StockRecordView::from(&record)).into_response())
}

/// `GET /inventory/stock/:id/movements`: ledger page, oldest first.
pub async fn list_movements(
    Extension(service): Extension<SharedStockService>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    query: Result<Query<dto::PageQuery>, QueryRejection>,
) -> Result<Response, Response> {
    authorize(&principal, authz::STOCK_READ)?;
    let item_id: InventoryItemId = dto::parse_field("id", &id)?;
    let Query(query) = query.map_err(|e| bad_request(e.body_text()))?;

    let result = service
        .list_movements(tenant.tenant_id(), item_id, query.page())
        .await
        .map_err(errors::stock_error_to_response)?;

    Ok(Json(PageResponse::from_page(&result, |m| m)).into_response())
}

/// `POST /inventory/movements`: receipts, shipments, transfers, returns, damage.
pub async fn record_movement(
    Extension(service): Extension<SharedStockService>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<dto::RecordMovementRequest>, JsonRejection>,
) -> Result<Response, Response> {
    authorize(&principal, authz::STOCK_ADJUST)?;
    let Json(body) = body.map_err(|e| bad_request(e.body_text()))?;

    let item_id: InventoryItemId = dto::parse_field(
        "inventoryItemId",
        &dto::required("inventoryItemId", body.inventory_item_id)?,
    )?;
    let movement_type: MovementType =
        dto::parse_field("type", &dto::required("type", body.movement_type)?)?;
    let quantity = dto::required("quantity", body.quantity)?;

    let change = service
        .record_movement(RecordMovement {
            tenant_id: tenant.tenant_id(),
            item_id,
            movement_type,
            quantity,
            reason: body.reason,
            notes: body.notes,
            actor_id: principal.user_id(),
        })
        .await
        .map_err(errors::stock_error_to_response)?;

    Ok(Json(StockChangeResponse {
        updated_item: &change.record,
        movement: &change.movement,
    })
    .into_response())
}

fn authorize(principal: &PrincipalContext, required: &'static str) -> Result<(), Response> {
    authz::authorize(principal, required)
        .map_err(|e| errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string()))
}

/// The actor of a write is the token subject; a `userId` in the body may only restate it.
fn acting_user(principal: &PrincipalContext, claimed: Option<&str>) -> Result<UserId, Response> {
    let Some(claimed) = claimed else {
        return Ok(principal.user_id());
    };
    let claimed: UserId = dto::parse_field("userId", claimed)?;
    if claimed != principal.user_id() {
        return Err(errors::json_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            "userId does not match the authenticated user",
        ));
    }
    Ok(claimed)
}

fn bad_request(message: String) -> Response {
    errors::json_error(StatusCode::BAD_REQUEST, "invalid_input", message)
}
