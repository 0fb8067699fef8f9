use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use invista_core::{ExpectedVersion, InventoryItemId, TenantId, WarehouseId};
use invista_inventory::{InventoryRecord, MovementEntry, StockKey, StockStatus};

/// Storage-level failure.
///
/// These are **infrastructure errors** (stale rows, unreachable database) as
/// opposed to domain errors (validation, invariants).
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row changed since it was read (optimistic concurrency).
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    /// A record already exists for the same natural key.
    #[error("duplicate record: {0}")]
    Duplicate(String),

    /// Transient failure: pool exhausted, connection lost, timeout.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Anything else the backend reports.
    #[error("store failure: {0}")]
    Backend(String),
}

/// Page request (1-based page number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self { page: 1, limit: 50 }
    }
}

impl Page {
    pub const MAX_LIMIT: u32 = 1000;

    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(50).clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

/// One page of results plus the total match count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: Page,
}

impl<T> PageResult<T> {
    pub fn total_pages(&self) -> u64 {
        self.total.div_ceil(u64::from(self.page.limit))
    }

    /// Slice an in-memory, already ordered result set.
    pub fn from_ordered(all: Vec<T>, page: Page) -> Self {
        let total = all.len() as u64;
        let items = all
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .collect();
        Self { items, total, page }
    }
}

/// Stock list filters (all optional, combined with AND).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StockFilter {
    pub warehouse_id: Option<WarehouseId>,
    pub status: Option<StockStatus>,
    /// Only low or out-of-stock records.
    pub alerts_only: bool,
    /// Deactivated records are hidden unless asked for.
    pub include_inactive: bool,
}

impl StockFilter {
    pub fn matches(&self, record: &InventoryRecord) -> bool {
        if !self.include_inactive && !record.is_active() {
            return false;
        }
        if self.warehouse_id.is_some_and(|w| record.key().warehouse_id != w) {
            return false;
        }
        let status = record.status();
        if self.status.is_some_and(|s| s != status) {
            return false;
        }
        if self.alerts_only && !status.is_alert() {
            return false;
        }
        true
    }
}

/// An open atomic unit against the stock tables.
///
/// Writes staged through a unit become visible together on `commit` or not at
/// all. Dropping a unit without committing discards it.
#[async_trait::async_trait]
pub trait UnitOfWork: Send {
    /// Read a record as of this unit (tenant-scoped).
    async fn load(
        &mut self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
    ) -> Result<Option<InventoryRecord>, StoreError>;

    /// Insert (`NoRecord`) or update a record; the version check is enforced
    /// no later than commit.
    async fn save_record(
        &mut self,
        record: &InventoryRecord,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError>;

    /// Append one immutable ledger row.
    async fn append_movement(&mut self, movement: &MovementEntry) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Stock persistence boundary: a unit-of-work factory plus read queries.
///
/// Implementations must:
/// - scope every read and write to a tenant
/// - apply a unit's record and ledger writes atomically
/// - reject a stale `ExpectedVersion` with `StoreError::Concurrency`
/// - return ledger rows in insertion order
#[async_trait::async_trait]
pub trait StockStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;

    async fn get_record(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
    ) -> Result<Option<InventoryRecord>, StoreError>;

    async fn find_by_key(
        &self,
        tenant_id: TenantId,
        key: &StockKey,
    ) -> Result<Option<InventoryRecord>, StoreError>;

    async fn list_records(
        &self,
        tenant_id: TenantId,
        filter: &StockFilter,
        page: Page,
    ) -> Result<PageResult<InventoryRecord>, StoreError>;

    async fn list_movements(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
        page: Page,
    ) -> Result<PageResult<MovementEntry>, StoreError>;
}

#[async_trait::async_trait]
impl<S> StockStore for Arc<S>
where
    S: StockStore + ?Sized,
{
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        (**self).begin().await
    }

    async fn get_record(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
    ) -> Result<Option<InventoryRecord>, StoreError> {
        (**self).get_record(tenant_id, item_id).await
    }

    async fn find_by_key(
        &self,
        tenant_id: TenantId,
        key: &StockKey,
    ) -> Result<Option<InventoryRecord>, StoreError> {
        (**self).find_by_key(tenant_id, key).await
    }

    async fn list_records(
        &self,
        tenant_id: TenantId,
        filter: &StockFilter,
        page: Page,
    ) -> Result<PageResult<InventoryRecord>, StoreError> {
        (**self).list_records(tenant_id, filter, page).await
    }

    async fn list_movements(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
        page: Page,
    ) -> Result<PageResult<MovementEntry>, StoreError> {
        (**self).list_movements(tenant_id, item_id, page).await
    }
}
