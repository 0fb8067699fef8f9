//! Stock operations: the orchestration around the pure planners.
//!
//! Every write follows the same pipeline:
//!
//! ```text
//! Command
//!   ↓
//! 1. Validate input (no IO)
//!   ↓
//! 2. Begin a unit of work, load the record (tenant-scoped)
//!   ↓
//! 3. Plan the next revision + ledger row (pure)
//!   ↓
//! 4. Stage both writes, commit (version re-checked at commit)
//! ```
//!
//! A stale version fails the attempt; the whole pipeline is re-run from step 2
//! up to `ServiceConfig::conflict_retries` times. All attempts together are
//! bounded by `ServiceConfig::op_timeout`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, instrument, warn};

use invista_core::{DomainError, DomainResult, Entity, ExpectedVersion, InventoryItemId, TenantId};
use invista_inventory::{
    AdjustStock, InventoryRecord, MovementEntry, OpenRecord, RecordMovement, StockChange,
    plan_adjustment, plan_movement, plan_opening,
};

use crate::clock::Clock;
use crate::store::{Page, PageResult, StockFilter, StockStore, StoreError, UnitOfWork};

/// Failure of a stock operation, as seen by callers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockError {
    /// Malformed or missing input; nothing was read or written.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The referenced inventory record does not exist for this tenant.
    #[error("inventory record not found")]
    NotFound,

    /// Concurrent modification (stale version, serialization failure); retryable.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The request contradicts the record's current state (key already
    /// tracked, record already inactive). Repeating it cannot succeed.
    #[error("state conflict: {0}")]
    StateConflict(String),

    /// Transient persistence failure or timeout; retryable.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Unexpected failure. The message is for logs, not for clients.
    #[error("internal error: {0}")]
    Internal(String),
}

impl StockError {
    /// Whether a caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StockError::Conflict(_) | StockError::Unavailable(_))
    }
}

impl From<DomainError> for StockError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                StockError::InvalidInput(msg)
            }
            DomainError::NotFound => StockError::NotFound,
            DomainError::Conflict(msg) => StockError::StateConflict(msg),
            // A planner producing an inconsistent ledger row is a bug, not bad input.
            DomainError::InvariantViolation(msg) => StockError::Internal(msg),
        }
    }
}

impl From<StoreError> for StockError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) => StockError::Conflict(msg),
            StoreError::Duplicate(msg) => StockError::StateConflict(msg),
            StoreError::Unavailable(msg) => StockError::Unavailable(msg),
            StoreError::Backend(msg) => StockError::Internal(msg),
        }
    }
}

/// Outcome of one attempt: only a stale version is worth re-running.
enum AttemptError {
    Stale(String),
    Fatal(StockError),
}

impl From<StoreError> for AttemptError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) => AttemptError::Stale(msg),
            other => AttemptError::Fatal(other.into()),
        }
    }
}

impl From<DomainError> for AttemptError {
    fn from(value: DomainError) -> Self {
        AttemptError::Fatal(value.into())
    }
}

impl From<StockError> for AttemptError {
    fn from(value: StockError) -> Self {
        AttemptError::Fatal(value)
    }
}

/// Timeout and retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Upper bound for one operation, retries included.
    pub op_timeout: Duration,
    /// Extra attempts after a stale-version failure.
    pub conflict_retries: u32,
    /// Sleep before retry `n` is `n * retry_backoff`.
    pub retry_backoff: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            op_timeout: Duration::from_millis(5000),
            conflict_retries: 3,
            retry_backoff: Duration::from_millis(25),
        }
    }
}

/// Owns the write path to inventory records and the movement ledger.
pub struct StockService<S> {
    store: S,
    clock: Arc<dyn Clock>,
    config: ServiceConfig,
}

impl<S> StockService<S>
where
    S: StockStore,
{
    pub fn new(store: S, clock: Arc<dyn Clock>, config: ServiceConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Start tracking a product in a warehouse.
    #[instrument(skip(self, cmd), fields(tenant_id = %cmd.tenant_id), err)]
    pub async fn open_record(&self, cmd: OpenRecord) -> Result<InventoryRecord, StockError> {
        // Surfaces bad quantities before any read.
        InventoryRecord::open(
            InventoryItemId::new(),
            cmd.tenant_id,
            cmd.key,
            cmd.quantity,
            cmd.reserved_quantity,
            cmd.reorder_point,
            self.clock.now(),
        )?;

        let cmd = &cmd;
        self.bounded("open_record", move || self.try_open(cmd))
            .await
    }

    /// Set a record's on-hand quantity to an absolute value.
    ///
    /// The record update and its ADJUSTMENT row are committed together.
    #[instrument(
        skip(self, cmd),
        fields(tenant_id = %cmd.tenant_id, item_id = %cmd.item_id, target = cmd.target_quantity),
        err
    )]
    pub async fn adjust_stock(&self, cmd: AdjustStock) -> Result<StockChange, StockError> {
        cmd.validate()?;

        let cmd = &cmd;
        self.bounded("adjust_stock", move || {
            self.try_change(cmd.tenant_id, cmd.item_id, move |record, now| {
                plan_adjustment(record, cmd, now)
            })
        })
        .await
    }

    /// Record a receipt, shipment, transfer leg, return or damage write-off.
    #[instrument(
        skip(self, cmd),
        fields(tenant_id = %cmd.tenant_id, item_id = %cmd.item_id, movement_type = %cmd.movement_type),
        err
    )]
    pub async fn record_movement(&self, cmd: RecordMovement) -> Result<StockChange, StockError> {
        cmd.validate()?;

        let cmd = &cmd;
        self.bounded("record_movement", move || {
            self.try_change(cmd.tenant_id, cmd.item_id, move |record, now| {
                plan_movement(record, cmd, now)
            })
        })
        .await
    }

    /// Soft-deactivate a record. Its ledger is kept and it stays readable.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, item_id = %item_id), err)]
    pub async fn deactivate(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
    ) -> Result<InventoryRecord, StockError> {
        self.bounded("deactivate", move || self.try_deactivate(tenant_id, item_id))
            .await
    }

    pub async fn get_record(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
    ) -> Result<InventoryRecord, StockError> {
        self.bounded("get_record", move || async move {
            self.store
                .get_record(tenant_id, item_id)
                .await?
                .ok_or(AttemptError::Fatal(StockError::NotFound))
        })
        .await
    }

    pub async fn list_records(
        &self,
        tenant_id: TenantId,
        filter: StockFilter,
        page: Page,
    ) -> Result<PageResult<InventoryRecord>, StockError> {
        let filter = &filter;
        self.bounded("list_records", move || async move {
            Ok(self.store.list_records(tenant_id, filter, page).await?)
        })
        .await
    }

    /// Ledger rows of one record, oldest first.
    pub async fn list_movements(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
        page: Page,
    ) -> Result<PageResult<MovementEntry>, StockError> {
        self.bounded("list_movements", move || async move {
            if self.store.get_record(tenant_id, item_id).await?.is_none() {
                return Err(AttemptError::Fatal(StockError::NotFound));
            }
            Ok(self.store.list_movements(tenant_id, item_id, page).await?)
        })
        .await
    }

    /// Run `attempt` under the operation timeout, re-running it on stale versions.
    async fn bounded<T, F, Fut>(&self, operation: &'static str, attempt: F) -> Result<T, StockError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let retries = async {
            let mut retry = 0u32;
            loop {
                match attempt().await {
                    Ok(value) => return Ok(value),
                    Err(AttemptError::Fatal(err)) => return Err(err),
                    Err(AttemptError::Stale(msg)) if retry < self.config.conflict_retries => {
                        retry += 1;
                        warn!(operation, retry, reason = %msg, "stale record version, retrying");
                        tokio::time::sleep(self.config.retry_backoff * retry).await;
                    }
                    Err(AttemptError::Stale(msg)) => return Err(StockError::Conflict(msg)),
                }
            }
        };

        match tokio::time::timeout(self.config.op_timeout, retries).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, timeout_ms = self.config.op_timeout.as_millis() as u64, "operation timed out");
                Err(StockError::Unavailable(format!(
                    "{operation} did not complete within {} ms",
                    self.config.op_timeout.as_millis()
                )))
            }
        }
    }

    async fn try_open(&self, cmd: &OpenRecord) -> Result<InventoryRecord, AttemptError> {
        if self.store.find_by_key(cmd.tenant_id, &cmd.key).await?.is_some() {
            return Err(StockError::StateConflict(
                "product is already tracked in this warehouse".to_string(),
            )
            .into());
        }

        let (record, movement) = plan_opening(cmd, self.clock.now())?;

        let mut uow = self.store.begin().await?;
        let staged = async {
            uow.save_record(&record, ExpectedVersion::NoRecord).await?;
            if let Some(movement) = &movement {
                uow.append_movement(movement).await?;
            }
            Ok::<_, StoreError>(())
        }
        .await;

        match staged {
            Ok(()) => {
                uow.commit().await?;
                info!(
                    tenant_id = %record.tenant_id(),
                    item_id = %record.id_typed(),
                    quantity = record.quantity(),
                    "inventory record opened"
                );
                Ok(record)
            }
            Err(err) => {
                rollback_quietly(uow).await;
                Err(err.into())
            }
        }
    }

    async fn try_change<P>(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
        plan: P,
    ) -> Result<StockChange, AttemptError>
    where
        P: Fn(&InventoryRecord, DateTime<Utc>) -> DomainResult<StockChange>,
    {
        let mut uow = self.store.begin().await?;
        let staged = stage_change(uow.as_mut(), tenant_id, item_id, &plan, self.clock.as_ref()).await;

        match staged {
            Ok((change, expected)) => {
                uow.commit().await?;
                let m = &change.movement;
                info!(
                    tenant_id = %tenant_id,
                    item_id = %item_id,
                    movement_id = %m.id,
                    movement_type = %m.movement_type,
                    quantity_before = m.quantity_before,
                    quantity_after = m.quantity_after,
                    version = expected + 1,
                    "stock movement committed"
                );
                Ok(change)
            }
            Err(err) => {
                rollback_quietly(uow).await;
                Err(err)
            }
        }
    }

    async fn try_deactivate(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
    ) -> Result<InventoryRecord, AttemptError> {
        let mut uow = self.store.begin().await?;
        let staged = async {
            let current = uow
                .load(tenant_id, item_id)
                .await?
                .ok_or(AttemptError::Fatal(StockError::NotFound))?;
            let next = current.deactivated()?;
            uow.save_record(&next, ExpectedVersion::Exact(current.version()))
                .await?;
            Ok::<_, AttemptError>(next)
        }
        .await;

        match staged {
            Ok(record) => {
                uow.commit().await?;
                info!(tenant_id = %tenant_id, item_id = %item_id, "inventory record deactivated");
                Ok(record)
            }
            Err(err) => {
                rollback_quietly(uow).await;
                Err(err)
            }
        }
    }
}

/// Load, plan and stage one change; returns the change and the version it was planned on.
async fn stage_change<P>(
    uow: &mut dyn UnitOfWork,
    tenant_id: TenantId,
    item_id: InventoryItemId,
    plan: &P,
    clock: &dyn Clock,
) -> Result<(StockChange, u64), AttemptError>
where
    P: Fn(&InventoryRecord, DateTime<Utc>) -> DomainResult<StockChange>,
{
    let current = uow
        .load(tenant_id, item_id)
        .await?
        .ok_or(AttemptError::Fatal(StockError::NotFound))?;
    let expected = current.version();

    let change = plan(&current, clock.now())?;
    uow.save_record(&change.record, ExpectedVersion::Exact(expected))
        .await?;
    uow.append_movement(&change.movement).await?;
    Ok((change, expected))
}

async fn rollback_quietly(uow: Box<dyn UnitOfWork>) {
    if let Err(err) = uow.rollback().await {
        warn!(error = %err, "rollback failed; the unit is discarded on drop");
    }
}
