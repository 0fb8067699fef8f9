//! Stock persistence: the store boundary plus in-memory and Postgres backends.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryStockStore;
pub use postgres::PostgresStockStore;
pub use r#trait::{Page, PageResult, StockFilter, StockStore, StoreError, UnitOfWork};
