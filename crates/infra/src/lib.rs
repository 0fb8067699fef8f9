//! Infrastructure layer: stock persistence and the operations that write to it.

pub mod clock;
pub mod service;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use service::{ServiceConfig, StockError, StockService};
pub use store::{
    InMemoryStockStore, Page, PageResult, PostgresStockStore, StockFilter, StockStore, StoreError,
    UnitOfWork,
};
