use axum::{
    Router,
    routing::{get, post},
};

pub mod stock;
pub mod system;

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route(
            "/inventory/stock",
            get(stock::list_stock).post(stock::adjust_stock),
        )
        .route("/inventory/stock/records", post(stock::open_record))
        .route(
            "/inventory/stock/:id",
            get(stock::get_record).delete(stock::deactivate_record),
        )
        .route("/inventory/stock/:id/movements", get(stock::list_movements))
        .route("/inventory/movements", post(stock::record_movement))
}
