use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use crate::context::{PrincipalContext, TenantContext};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "tenantId": tenant.tenant_id().to_string(),
        "userId": principal.user_id().to_string(),
        "roles": principal.roles(),
    }))
}
