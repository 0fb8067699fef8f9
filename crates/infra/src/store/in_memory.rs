use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use invista_core::{Entity, ExpectedVersion, InventoryItemId, TenantId};
use invista_inventory::{InventoryRecord, MovementEntry, StockKey};

use super::r#trait::{Page, PageResult, StockFilter, StockStore, StoreError, UnitOfWork};

#[derive(Debug, Default)]
struct State {
    records: HashMap<(TenantId, InventoryItemId), InventoryRecord>,
    keys: HashMap<(TenantId, StockKey), InventoryItemId>,
    /// Insertion-ordered ledger.
    movements: Vec<MovementEntry>,
}

#[derive(Debug, Default)]
struct Faults {
    fail_next_movement_append: AtomicBool,
    commit_delay: RwLock<Option<Duration>>,
}

/// In-memory stock store.
///
/// Intended for tests/dev. Commits take one write lock, re-check every staged
/// record's version, then apply all staged writes.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStockStore {
    state: Arc<RwLock<State>>,
    faults: Arc<Faults>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record as-is, bypassing domain validation.
    ///
    /// Lets tests and fixtures reproduce legacy rows (e.g. over-reserved ones).
    pub fn seed(&self, record: InventoryRecord) -> Result<(), StoreError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        state
            .keys
            .insert((record.tenant_id(), *record.key()), record.id_typed());
        state
            .records
            .insert((record.tenant_id(), record.id_typed()), record);
        Ok(())
    }

    /// Make the next `append_movement` call fail.
    pub fn fail_next_movement_append(&self) {
        self.faults
            .fail_next_movement_append
            .store(true, Ordering::SeqCst);
    }

    /// Delay every commit (simulates a slow database).
    pub fn set_commit_delay(&self, delay: Option<Duration>) {
        if let Ok(mut d) = self.faults.commit_delay.write() {
            *d = delay;
        }
    }

    /// Total ledger rows across all tenants.
    pub fn movement_count(&self) -> usize {
        self.state.read().map(|s| s.movements.len()).unwrap_or(0)
    }

    fn read_state(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

struct StagedRecord {
    record: InventoryRecord,
    expected: ExpectedVersion,
}

/// Unit of work over [`InMemoryStockStore`]: writes are buffered until commit.
struct InMemoryUnitOfWork {
    state: Arc<RwLock<State>>,
    faults: Arc<Faults>,
    records: Vec<StagedRecord>,
    movements: Vec<MovementEntry>,
}

impl InMemoryUnitOfWork {
    fn staged(&self, tenant_id: TenantId, item_id: InventoryItemId) -> Option<&InventoryRecord> {
        self.records
            .iter()
            .rev()
            .map(|s| &s.record)
            .find(|r| r.tenant_id() == tenant_id && r.id_typed() == item_id)
    }

    fn apply(&mut self) -> Result<(), StoreError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;

        // Validate everything before touching anything.
        for staged in &self.records {
            let rec = &staged.record;
            let current = state
                .records
                .get(&(rec.tenant_id(), rec.id_typed()))
                .map(|r| r.version());
            if !staged.expected.matches(current) {
                return Err(StoreError::Concurrency(format!(
                    "record {} expected {:?}, found {:?}",
                    rec.id_typed(),
                    staged.expected,
                    current
                )));
            }
            if current.is_none() {
                if let Some(existing) = state.keys.get(&(rec.tenant_id(), *rec.key())) {
                    if *existing != rec.id_typed() {
                        return Err(StoreError::Duplicate(format!(
                            "record {existing} already tracks this product in this warehouse"
                        )));
                    }
                }
            }
        }

        for staged in self.records.drain(..) {
            let rec = staged.record;
            state
                .keys
                .insert((rec.tenant_id(), *rec.key()), rec.id_typed());
            state.records.insert((rec.tenant_id(), rec.id_typed()), rec);
        }
        state.movements.append(&mut self.movements);
        Ok(())
    }
}

#[async_trait::async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn load(
        &mut self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
    ) -> Result<Option<InventoryRecord>, StoreError> {
        if let Some(rec) = self.staged(tenant_id, item_id) {
            return Ok(Some(rec.clone()));
        }
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(state.records.get(&(tenant_id, item_id)).cloned())
    }

    async fn save_record(
        &mut self,
        record: &InventoryRecord,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        self.records.push(StagedRecord {
            record: record.clone(),
            expected,
        });
        Ok(())
    }

    async fn append_movement(&mut self, movement: &MovementEntry) -> Result<(), StoreError> {
        if self
            .faults
            .fail_next_movement_append
            .swap(false, Ordering::SeqCst)
        {
            return Err(StoreError::Backend("injected movement insert failure".to_string()));
        }
        self.movements.push(movement.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut this = self;
        let delay = this.faults.commit_delay.read().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        this.apply()
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait::async_trait]
impl StockStore for InMemoryStockStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        Ok(Box::new(InMemoryUnitOfWork {
            state: Arc::clone(&self.state),
            faults: Arc::clone(&self.faults),
            records: Vec::new(),
            movements: Vec::new(),
        }))
    }

    async fn get_record(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
    ) -> Result<Option<InventoryRecord>, StoreError> {
        Ok(self.read_state()?.records.get(&(tenant_id, item_id)).cloned())
    }

    async fn find_by_key(
        &self,
        tenant_id: TenantId,
        key: &StockKey,
    ) -> Result<Option<InventoryRecord>, StoreError> {
        let state = self.read_state()?;
        Ok(state
            .keys
            .get(&(tenant_id, *key))
            .and_then(|id| state.records.get(&(tenant_id, *id)))
            .cloned())
    }

    async fn list_records(
        &self,
        tenant_id: TenantId,
        filter: &StockFilter,
        page: Page,
    ) -> Result<PageResult<InventoryRecord>, StoreError> {
        let mut matching: Vec<InventoryRecord> = {
            let state = self.read_state()?;
            state
                .records
                .iter()
                .filter(|((t, _), rec)| *t == tenant_id && filter.matches(rec))
                .map(|(_, rec)| rec.clone())
                .collect()
        };

        // Same ordering as the SQL store: oldest first, id as tie-breaker.
        matching.sort_by_key(|r| (r.created_at(), *r.id_typed().as_uuid()));
        Ok(PageResult::from_ordered(matching, page))
    }

    async fn list_movements(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
        page: Page,
    ) -> Result<PageResult<MovementEntry>, StoreError> {
        let movements: Vec<MovementEntry> = {
            let state = self.read_state()?;
            state
                .movements
                .iter()
                .filter(|m| m.tenant_id == tenant_id && m.inventory_item_id == item_id)
                .cloned()
                .collect()
        };
        Ok(PageResult::from_ordered(movements, page))
    }
}
