use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

use invista_api::middleware::JwtClaims;
use invista_core::{ProductId, TenantId, UserId, WarehouseId};
use invista_infra::{InMemoryStockStore, ServiceConfig, StockService, StockStore, SystemClock};

const JWT_SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    store: InMemoryStockStore,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(ServiceConfig {
            retry_backoff: Duration::from_millis(1),
            ..ServiceConfig::default()
        })
        .await
    }

    async fn spawn_with(config: ServiceConfig) -> Self {
        // Same router as prod over an inspectable in-memory store, on an ephemeral port.
        let store = InMemoryStockStore::new();
        let dyn_store: Arc<dyn StockStore> = Arc::new(store.clone());
        let service = Arc::new(StockService::new(dyn_store, Arc::new(SystemClock), config));
        let app = invista_api::app::router(service, JWT_SECRET);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            store,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post(&self, token: &str, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn get(&self, token: &str, path: &str) -> (StatusCode, Value) {
        let res = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    /// Open a record and return its id.
    async fn open(&self, token: &str, quantity: i64, reserved: i64, reorder: Option<i64>) -> String {
        let (status, body) = self
            .post(
                token,
                "/inventory/stock/records",
                json!({
                    "productId": ProductId::new().to_string(),
                    "warehouseId": WarehouseId::new().to_string(),
                    "quantity": quantity,
                    "reservedQuantity": reserved,
                    "reorderPoint": reorder,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "open failed: {body}");
        body["id"].as_str().unwrap().to_string()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(user_id: UserId, tenant_id: TenantId, roles: &[&str]) -> String {
    let now = Utc::now().timestamp();
    let claims = JwtClaims {
        sub: user_id,
        tenant_id,
        roles: roles.iter().map(|r| r.to_string()).collect(),
        iat: now,
        exp: now + 600,
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn admin_token(tenant_id: TenantId) -> String {
    mint_jwt(UserId::new(), tenant_id, &["admin"])
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(srv.url("/inventory/stock")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = srv
        .client
        .get(srv.url("/inventory/stock"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn context_is_derived_from_token() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let user_id = UserId::new();

    let (status, body) = srv
        .get(&mint_jwt(user_id, tenant_id, &["viewer"]), "/whoami")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tenantId"], tenant_id.to_string());
    assert_eq!(body["userId"], user_id.to_string());
}

#[tokio::test]
async fn adjustment_updates_record_and_ledger() {
    let srv = TestServer::spawn().await;
    let user_id = UserId::new();
    let token = mint_jwt(user_id, TenantId::new(), &["admin"]);
    let id = srv.open(&token, 10, 3, None).await;

    let (status, body) = srv
        .post(
            &token,
            "/inventory/stock",
            json!({ "inventoryItemId": id, "newQuantity": 15, "userId": user_id.to_string() }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "adjust failed: {body}");

    let item = &body["updatedItem"];
    assert_eq!(item["quantity"], 15);
    assert_eq!(item["reservedQuantity"], 3);
    assert_eq!(item["availableQuantity"], 12);

    let movement = &body["movement"];
    assert_eq!(movement["type"], "ADJUSTMENT");
    assert_eq!(movement["quantityBefore"], 10);
    assert_eq!(movement["quantityAfter"], 15);
    assert_eq!(movement["quantityDelta"], 5);
    assert_eq!(movement["reason"], "Manual adjustment");
    assert_eq!(movement["actorId"], user_id.to_string());

    // Opening receipt + adjustment, oldest first.
    let (status, ledger) = srv
        .get(&token, &format!("/inventory/stock/{id}/movements"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ledger["pagination"]["total"], 2);
    assert_eq!(ledger["items"][0]["type"], "RECEIPT");
    assert_eq!(ledger["items"][1]["type"], "ADJUSTMENT");
}

#[tokio::test]
async fn missing_fields_and_negative_targets_are_bad_requests() {
    let srv = TestServer::spawn().await;
    let token = admin_token(TenantId::new());
    let id = srv.open(&token, 5, 0, None).await;

    let (status, body) = srv
        .post(&token, "/inventory/stock", json!({ "newQuantity": 3 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");

    let (status, _) = srv
        .post(&token, "/inventory/stock", json!({ "inventoryItemId": id }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = srv
        .post(
            &token,
            "/inventory/stock",
            json!({ "inventoryItemId": id, "newQuantity": -1 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Only the opening receipt exists.
    assert_eq!(srv.store.movement_count(), 1);
}

#[tokio::test]
async fn unknown_item_is_not_found_without_ledger_row() {
    let srv = TestServer::spawn().await;
    let token = admin_token(TenantId::new());

    let (status, body) = srv
        .post(
            &token,
            "/inventory/stock",
            json!({ "inventoryItemId": invista_core::InventoryItemId::new().to_string(), "newQuantity": 3 }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
    assert_eq!(srv.store.movement_count(), 0);
}

#[tokio::test]
async fn body_user_id_must_match_token_subject() {
    let srv = TestServer::spawn().await;
    let token = admin_token(TenantId::new());
    let id = srv.open(&token, 5, 0, None).await;

    let (status, _) = srv
        .post(
            &token,
            "/inventory/stock",
            json!({ "inventoryItemId": id, "newQuantity": 6, "userId": UserId::new().to_string() }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn viewer_can_read_but_not_adjust() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let id = srv.open(&admin_token(tenant_id), 5, 0, None).await;
    let viewer = mint_jwt(UserId::new(), tenant_id, &["viewer"]);

    let (status, _) = srv.get(&viewer, &format!("/inventory/stock/{id}")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = srv
        .post(
            &viewer,
            "/inventory/stock",
            json!({ "inventoryItemId": id, "newQuantity": 6 }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test]
async fn tenant_isolation_blocks_cross_tenant_reads_and_writes() {
    let srv = TestServer::spawn().await;
    let token1 = admin_token(TenantId::new());
    let token2 = admin_token(TenantId::new());
    let id = srv.open(&token1, 5, 0, None).await;

    let (status, _) = srv.get(&token2, &format!("/inventory/stock/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = srv
        .post(
            &token2,
            "/inventory/stock",
            json!({ "inventoryItemId": id, "newQuantity": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, listed) = srv.get(&token2, "/inventory/stock").await;
    assert_eq!(listed["pagination"]["total"], 0);
}

#[tokio::test]
async fn list_filters_alerts_and_paginates() {
    let srv = TestServer::spawn().await;
    let token = admin_token(TenantId::new());
    let healthy = srv.open(&token, 50, 0, Some(10)).await;
    let low = srv.open(&token, 8, 0, Some(10)).await;
    let empty = srv.open(&token, 0, 0, None).await;

    let (status, all) = srv.get(&token, "/inventory/stock").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all["pagination"]["total"], 3);

    let (_, alerts) = srv.get(&token, "/inventory/stock?alertsOnly=true").await;
    let ids: Vec<&str> = alerts["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&low.as_str()));
    assert!(ids.contains(&empty.as_str()));
    assert!(!ids.contains(&healthy.as_str()));

    let (_, out) = srv.get(&token, "/inventory/stock?status=OUT_OF_STOCK").await;
    assert_eq!(out["items"][0]["id"], empty);
    assert_eq!(out["items"][0]["status"], "OUT_OF_STOCK");

    let (_, paged) = srv.get(&token, "/inventory/stock?page=2&limit=2").await;
    assert_eq!(paged["items"].as_array().unwrap().len(), 1);
    assert_eq!(paged["pagination"]["totalPages"], 2);

    let (status, _) = srv.get(&token, "/inventory/stock?status=plenty").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_record_is_a_conflict() {
    let srv = TestServer::spawn().await;
    let token = admin_token(TenantId::new());
    let body = json!({
        "productId": ProductId::new().to_string(),
        "warehouseId": WarehouseId::new().to_string(),
        "quantity": 1,
    });

    let (status, _) = srv.post(&token, "/inventory/stock/records", body.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, res) = srv.post(&token, "/inventory/stock/records", body).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(res["error"], "state_conflict");
}

#[tokio::test]
async fn classified_movements_follow_polarity() {
    let srv = TestServer::spawn().await;
    let token = admin_token(TenantId::new());
    let id = srv.open(&token, 4, 0, None).await;

    let (status, body) = srv
        .post(
            &token,
            "/inventory/movements",
            json!({ "inventoryItemId": id, "type": "receipt", "quantity": 6 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "receipt failed: {body}");
    assert_eq!(body["updatedItem"]["quantity"], 10);

    let (status, _) = srv
        .post(
            &token,
            "/inventory/movements",
            json!({ "inventoryItemId": id, "type": "SHIPMENT", "quantity": 11 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = srv
        .post(
            &token,
            "/inventory/movements",
            json!({ "inventoryItemId": id, "type": "ADJUSTMENT", "quantity": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = srv
        .post(
            &token,
            "/inventory/movements",
            json!({ "inventoryItemId": id, "type": "DAMAGE", "quantity": 3, "reason": "forklift" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["movement"]["quantityBefore"], 10);
    assert_eq!(body["movement"]["quantityAfter"], 7);
    assert_eq!(body["movement"]["reason"], "forklift");
}

#[tokio::test]
async fn deactivated_record_rejects_adjustments() {
    let srv = TestServer::spawn().await;
    let token = admin_token(TenantId::new());
    let id = srv.open(&token, 4, 0, None).await;

    let res = srv
        .client
        .delete(srv.url(&format!("/inventory/stock/{id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["active"], false);

    let res = srv
        .client
        .delete(srv.url(&format!("/inventory/stock/{id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "state_conflict");

    let (status, _) = srv
        .post(
            &token,
            "/inventory/stock",
            json!({ "inventoryItemId": id, "newQuantity": 9 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Hidden from the default listing, still addressable directly.
    let (_, listed) = srv.get(&token, "/inventory/stock").await;
    assert_eq!(listed["pagination"]["total"], 0);
    let (_, listed) = srv.get(&token, "/inventory/stock?includeInactive=true").await;
    assert_eq!(listed["pagination"]["total"], 1);
}

#[tokio::test]
async fn persistence_failure_is_a_generic_server_error() {
    let srv = TestServer::spawn().await;
    let token = admin_token(TenantId::new());
    let id = srv.open(&token, 10, 3, None).await;

    srv.store.fail_next_movement_append();
    let (status, body) = srv
        .post(
            &token,
            "/inventory/stock",
            json!({ "inventoryItemId": id, "newQuantity": 15 }),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "internal server error");

    let (_, item) = srv.get(&token, &format!("/inventory/stock/{id}")).await;
    assert_eq!(item["quantity"], 10);
    assert_eq!(item["version"], 1);
}

#[tokio::test]
async fn slow_store_is_reported_unavailable() {
    let srv = TestServer::spawn_with(ServiceConfig {
        op_timeout: Duration::from_millis(50),
        ..ServiceConfig::default()
    })
    .await;
    let token = admin_token(TenantId::new());
    let id = srv.open(&token, 10, 0, None).await;

    srv.store.set_commit_delay(Some(Duration::from_secs(2)));
    let res = srv
        .client
        .post(srv.url("/inventory/stock"))
        .bearer_auth(&token)
        .json(&json!({ "inventoryItemId": id, "newQuantity": 11 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(res.headers().contains_key("retry-after"));
    assert_eq!(srv.store.movement_count(), 1);
}
