//! Postgres-backed stock store.
//!
//! One database transaction per unit of work. Record updates are guarded by
//! the row `version`, so a stale writer fails instead of overwriting.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Duplicate` |
//! | Database (serialization failure / deadlock) | `40001` / `40P01` | `Concurrency` |
//! | Database (other) | any | `Backend` |
//! | PoolTimedOut / PoolClosed / Io / Tls | N/A | `Unavailable` |
//! | Other | N/A | `Backend` |

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use invista_core::{
    Entity, ExpectedVersion, InventoryItemId, MovementId, ProductId, TenantId, UserId, VariantId,
    WarehouseId,
};
use invista_inventory::{InventoryRecord, MovementEntry, MovementType, RecordParts, StockKey};

use super::r#trait::{Page, PageResult, StockFilter, StockStore, StoreError, UnitOfWork};

/// Schema applied by [`PostgresStockStore::migrate`].
pub const SCHEMA: &str = include_str!("../../migrations/0001_inventory.sql");

const RECORD_COLUMNS: &str = r#"
    id, tenant_id, product_id, variant_id, warehouse_id,
    quantity, reserved_quantity, reorder_point, active, version,
    last_movement_at, created_at
"#;

const MOVEMENT_COLUMNS: &str = r#"
    id, tenant_id, inventory_item_id, movement_type, quantity_delta,
    quantity_before, quantity_after, reason, notes, actor_id, occurred_at
"#;

// Stock status is derived, so the list filter recomputes it in SQL with the
// same rules as `InventoryRecord::status`.
const LIST_FILTER: &str = r#"
    WHERE tenant_id = $1
        AND ($2::uuid IS NULL OR warehouse_id = $2)
        AND ($3::text IS NULL OR (
            CASE
                WHEN available_quantity = 0 THEN 'OUT_OF_STOCK'
                WHEN reorder_point IS NOT NULL AND available_quantity <= reorder_point THEN 'LOW_STOCK'
                ELSE 'IN_STOCK'
            END) = $3)
        AND (NOT $4 OR available_quantity = 0
            OR (reorder_point IS NOT NULL AND available_quantity <= reorder_point))
        AND ($5 OR active)
"#;

/// Postgres-backed stock store.
///
/// Uses the SQLx connection pool, which is `Send + Sync`; clones share it.
#[derive(Debug, Clone)]
pub struct PostgresStockStore {
    pool: Arc<PgPool>,
}

impl PostgresStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect a bounded pool.
    #[instrument(skip(database_url), err)]
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the bundled schema (idempotent).
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

/// One open database transaction.
struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait::async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn load(
        &mut self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
    ) -> Result<Option<InventoryRecord>, StoreError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM inventory_records WHERE tenant_id = $1 AND id = $2"
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(item_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("load_record", e))?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn save_record(
        &mut self,
        record: &InventoryRecord,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let key = record.key();

        if expected == ExpectedVersion::NoRecord {
            sqlx::query(
                r#"
                INSERT INTO inventory_records (
                    id, tenant_id, product_id, variant_id, warehouse_id,
                    quantity, reserved_quantity, available_quantity, reorder_point,
                    active, version, last_movement_at, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                "#,
            )
            .bind(record.id_typed().as_uuid())
            .bind(record.tenant_id().as_uuid())
            .bind(key.product_id.as_uuid())
            .bind(key.variant_id.map(|v| *v.as_uuid()))
            .bind(key.warehouse_id.as_uuid())
            .bind(record.quantity())
            .bind(record.reserved_quantity())
            .bind(record.available_quantity())
            .bind(record.reorder_point())
            .bind(record.is_active())
            .bind(record.version() as i64)
            .bind(record.last_movement_at())
            .bind(record.created_at())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_record", e))?;
            return Ok(());
        }

        let expected_version: Option<i64> = match expected {
            ExpectedVersion::Exact(v) => Some(v as i64),
            _ => None,
        };

        let result = sqlx::query(
            r#"
            UPDATE inventory_records
            SET quantity = $3,
                reserved_quantity = $4,
                available_quantity = $5,
                reorder_point = $6,
                active = $7,
                version = $8,
                last_movement_at = $9
            WHERE tenant_id = $1 AND id = $2
                AND ($10::bigint IS NULL OR version = $10)
            "#,
        )
        .bind(record.tenant_id().as_uuid())
        .bind(record.id_typed().as_uuid())
        .bind(record.quantity())
        .bind(record.reserved_quantity())
        .bind(record.available_quantity())
        .bind(record.reorder_point())
        .bind(record.is_active())
        .bind(record.version() as i64)
        .bind(record.last_movement_at())
        .bind(expected_version)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_record", e))?;

        if result.rows_affected() == 0 {
            return Err(match expected {
                ExpectedVersion::Exact(v) => StoreError::Concurrency(format!(
                    "record {} is no longer at version {v}",
                    record.id_typed()
                )),
                _ => StoreError::Backend(format!("record {} does not exist", record.id_typed())),
            });
        }
        Ok(())
    }

    async fn append_movement(&mut self, movement: &MovementEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO stock_movements (
                id, tenant_id, inventory_item_id, movement_type, quantity_delta,
                quantity_before, quantity_after, reason, notes, actor_id, occurred_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(movement.id.as_uuid())
        .bind(movement.tenant_id.as_uuid())
        .bind(movement.inventory_item_id.as_uuid())
        .bind(movement.movement_type.as_str())
        .bind(movement.quantity_delta)
        .bind(movement.quantity_before)
        .bind(movement.quantity_after)
        .bind(&movement.reason)
        .bind(&movement.notes)
        .bind(movement.actor_id.as_uuid())
        .bind(movement.occurred_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_movement", e))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback_transaction", e))
    }
}

#[async_trait::async_trait]
impl StockStore for PostgresStockStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(Box::new(PostgresUnitOfWork { tx }))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, item_id = %item_id), err)]
    async fn get_record(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
    ) -> Result<Option<InventoryRecord>, StoreError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM inventory_records WHERE tenant_id = $1 AND id = $2"
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(item_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_record", e))?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn find_by_key(
        &self,
        tenant_id: TenantId,
        key: &StockKey,
    ) -> Result<Option<InventoryRecord>, StoreError> {
        let sql = format!(
            r#"
            SELECT {RECORD_COLUMNS} FROM inventory_records
            WHERE tenant_id = $1 AND product_id = $2
                AND variant_id IS NOT DISTINCT FROM $3
                AND warehouse_id = $4
            "#
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(key.product_id.as_uuid())
            .bind(key.variant_id.map(|v| *v.as_uuid()))
            .bind(key.warehouse_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_key", e))?;

        row.as_ref().map(record_from_row).transpose()
    }

    #[instrument(skip(self, filter), fields(tenant_id = %tenant_id, page = page.page), err)]
    async fn list_records(
        &self,
        tenant_id: TenantId,
        filter: &StockFilter,
        page: Page,
    ) -> Result<PageResult<InventoryRecord>, StoreError> {
        let warehouse = filter.warehouse_id.map(|w| *w.as_uuid());
        let status = filter.status.map(|s| s.as_str());

        let count_sql = format!("SELECT COUNT(*) AS total FROM inventory_records {LIST_FILTER}");
        let total: i64 = sqlx::query(&count_sql)
            .bind(tenant_id.as_uuid())
            .bind(warehouse)
            .bind(status)
            .bind(filter.alerts_only)
            .bind(filter.include_inactive)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_records", e))?
            .try_get("total")
            .map_err(|e| StoreError::Backend(format!("failed to read count: {e}")))?;

        let list_sql = format!(
            "SELECT {RECORD_COLUMNS} FROM inventory_records {LIST_FILTER} \
             ORDER BY created_at ASC, id ASC LIMIT $6 OFFSET $7"
        );
        let rows = sqlx::query(&list_sql)
            .bind(tenant_id.as_uuid())
            .bind(warehouse)
            .bind(status)
            .bind(filter.alerts_only)
            .bind(filter.include_inactive)
            .bind(i64::from(page.limit))
            .bind(page.offset() as i64)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_records", e))?;

        let items = rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PageResult {
            items,
            total: total as u64,
            page,
        })
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, item_id = %item_id), err)]
    async fn list_movements(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
        page: Page,
    ) -> Result<PageResult<MovementEntry>, StoreError> {
        let total: i64 = sqlx::query(
            "SELECT COUNT(*) AS total FROM stock_movements WHERE tenant_id = $1 AND inventory_item_id = $2",
        )
        .bind(tenant_id.as_uuid())
        .bind(item_id.as_uuid())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_movements", e))?
        .try_get("total")
        .map_err(|e| StoreError::Backend(format!("failed to read count: {e}")))?;

        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements \
             WHERE tenant_id = $1 AND inventory_item_id = $2 \
             ORDER BY seq ASC LIMIT $3 OFFSET $4"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(item_id.as_uuid())
            .bind(i64::from(page.limit))
            .bind(page.offset() as i64)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_movements", e))?;

        let items = rows
            .iter()
            .map(movement_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PageResult {
            items,
            total: total as u64,
            page,
        })
    }
}

fn record_from_row(row: &PgRow) -> Result<InventoryRecord, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Backend(format!("failed to decode record row: {e}"));

    let variant_id: Option<uuid::Uuid> = row.try_get("variant_id").map_err(decode)?;
    let version: i64 = row.try_get("version").map_err(decode)?;

    Ok(InventoryRecord::from_parts(RecordParts {
        id: InventoryItemId::from_uuid(row.try_get("id").map_err(decode)?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id").map_err(decode)?),
        key: StockKey {
            product_id: ProductId::from_uuid(row.try_get("product_id").map_err(decode)?),
            variant_id: variant_id.map(VariantId::from_uuid),
            warehouse_id: WarehouseId::from_uuid(row.try_get("warehouse_id").map_err(decode)?),
        },
        quantity: row.try_get("quantity").map_err(decode)?,
        reserved_quantity: row.try_get("reserved_quantity").map_err(decode)?,
        reorder_point: row.try_get("reorder_point").map_err(decode)?,
        active: row.try_get("active").map_err(decode)?,
        version: version as u64,
        last_movement_at: row
            .try_get::<Option<DateTime<Utc>>, _>("last_movement_at")
            .map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
    }))
}

fn movement_from_row(row: &PgRow) -> Result<MovementEntry, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Backend(format!("failed to decode movement row: {e}"));

    let movement_type: String = row.try_get("movement_type").map_err(decode)?;
    let movement_type: MovementType = movement_type
        .parse()
        .map_err(|e| StoreError::Backend(format!("failed to decode movement row: {e}")))?;

    Ok(MovementEntry {
        id: MovementId::from_uuid(row.try_get("id").map_err(decode)?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id").map_err(decode)?),
        inventory_item_id: InventoryItemId::from_uuid(
            row.try_get("inventory_item_id").map_err(decode)?,
        ),
        movement_type,
        quantity_delta: row.try_get("quantity_delta").map_err(decode)?,
        quantity_before: row.try_get("quantity_before").map_err(decode)?,
        quantity_after: row.try_get("quantity_after").map_err(decode)?,
        reason: row.try_get("reason").map_err(decode)?,
        notes: row.try_get("notes").map_err(decode)?,
        actor_id: UserId::from_uuid(row.try_get("actor_id").map_err(decode)?),
        occurred_at: row.try_get("occurred_at").map_err(decode)?,
    })
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Duplicate(msg),
                Some("40001") | Some("40P01") => StoreError::Concurrency(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("io error in {operation}: {e}")),
        sqlx::Error::Tls(e) => StoreError::Unavailable(format!("tls error in {operation}: {e}")),
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}
