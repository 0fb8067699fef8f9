//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request/response DTOs and parsing helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use invista_infra::{
    InMemoryStockStore, PostgresStockStore, StockService, StockStore, StoreError, SystemClock,
};

use crate::config::AppConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;

/// The stock service as shared by all handlers.
pub type SharedStockService = Arc<StockService<Arc<dyn StockStore>>>;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
///
/// Uses Postgres when `DATABASE_URL` is configured, the in-memory store otherwise.
pub async fn build_app(config: &AppConfig) -> Result<Router, StoreError> {
    let store: Arc<dyn StockStore> = match &config.database_url {
        Some(url) => {
            let store = PostgresStockStore::connect(
                url,
                config.database_max_connections,
                config.stock.op_timeout,
            )
            .await?;
            store.migrate().await?;
            tracing::info!("using postgres stock store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; stock is kept in memory");
            Arc::new(InMemoryStockStore::new())
        }
    };

    let service = Arc::new(StockService::new(
        store,
        Arc::new(SystemClock),
        config.stock,
    ));

    Ok(router(service, &config.jwt_secret))
}

/// Router over an already-built service (tests inject their own store here).
pub fn router(service: SharedStockService, jwt_secret: &str) -> Router {
    let jwt = Arc::new(middleware::Hs256JwtValidator::new(jwt_secret.as_bytes()));
    let auth_state = middleware::AuthState { jwt };

    // Protected routes: require auth + tenant context.
    let protected = routes::router()
        .layer(ServiceBuilder::new().layer(Extension(service)))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
}
